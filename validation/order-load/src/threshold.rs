//! Pass/fail threshold rules evaluated once over the outcomes of a run.
//!
//! A rule is an assertion that must hold at the end of the run, written the
//! way k6 spells its `http_reqs` thresholds:
//!
//! ```text
//! status:500 count>1
//! status:5xx count<=10
//! status:transport_error count==0
//! http_reqs{status:503} count>1
//! ```

use crate::error::{DriverError, DriverResult};
use crate::metrics::{RequestOutcome, ResponseStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which responses a rule counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// One literal status code, e.g. `500`.
    Exact(u16),
    /// A whole family keyed by its leading digit, e.g. `5xx` is `Family(5)`.
    Family(u16),
    /// Requests that never produced an HTTP response.
    TransportError,
}

impl StatusClass {
    pub fn matches(&self, status: ResponseStatus) -> bool {
        match (*self, status) {
            (StatusClass::Exact(code), ResponseStatus::Http(s)) => code == s,
            (StatusClass::Family(digit), ResponseStatus::Http(s)) => s / 100 == digit,
            (StatusClass::TransportError, ResponseStatus::TransportError) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusClass::Exact(code) => write!(f, "{}", code),
            StatusClass::Family(digit) => write!(f, "{}xx", digit),
            StatusClass::TransportError => f.write_str(ResponseStatus::TRANSPORT_ERROR_KEY),
        }
    }
}

impl FromStr for StatusClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(ResponseStatus::TRANSPORT_ERROR_KEY)
            || s.eq_ignore_ascii_case("transport-error")
        {
            return Ok(StatusClass::TransportError);
        }

        let lower = s.to_ascii_lowercase();
        if let Some(digit) = lower.strip_suffix("xx") {
            return match digit.parse::<u16>() {
                Ok(d) if (1..=5).contains(&d) => Ok(StatusClass::Family(d)),
                _ => Err(format!("'{}' is not a status family (1xx..5xx)", s)),
            };
        }

        match s.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => Ok(StatusClass::Exact(code)),
            _ => Err(format!("'{}' is not an HTTP status code", s)),
        }
    }
}

/// Comparison between the observed count and the rule's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
        }
    }

    pub fn holds(&self, observed: u64, limit: u64) -> bool {
        match self {
            Comparison::Greater => observed > limit,
            Comparison::GreaterOrEqual => observed >= limit,
            Comparison::Less => observed < limit,
            Comparison::LessOrEqual => observed <= limit,
            Comparison::Equal => observed == limit,
            Comparison::NotEqual => observed != limit,
        }
    }

    /// Split a leading operator off `s`. Two-character operators win.
    fn split_prefix(s: &str) -> Option<(Self, &str)> {
        const OPERATORS: [(&str, Comparison); 7] = [
            (">=", Comparison::GreaterOrEqual),
            ("<=", Comparison::LessOrEqual),
            ("==", Comparison::Equal),
            ("!=", Comparison::NotEqual),
            (">", Comparison::Greater),
            ("<", Comparison::Less),
            ("=", Comparison::Equal),
        ];
        OPERATORS
            .iter()
            .find_map(|(sym, op)| s.strip_prefix(sym).map(|rest| (*op, rest)))
    }
}

/// A single threshold: `count(status in class) <op> limit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThresholdRule {
    pub status: StatusClass,
    pub comparison: Comparison,
    pub count: u64,
}

impl ThresholdRule {
    pub fn new(status: StatusClass, comparison: Comparison, count: u64) -> Self {
        Self {
            status,
            comparison,
            count,
        }
    }

    /// Parse the textual form, e.g. `status:500 count>1`.
    pub fn parse(rule: &str) -> DriverResult<Self> {
        rule.parse()
    }

    pub fn count_matching(&self, outcomes: &[RequestOutcome]) -> u64 {
        outcomes
            .iter()
            .filter(|o| self.status.matches(o.status))
            .count() as u64
    }

    pub fn evaluate(&self, outcomes: &[RequestOutcome]) -> ThresholdResult {
        let observed = self.count_matching(outcomes);
        ThresholdResult {
            rule: self.clone(),
            observed,
            passed: self.comparison.holds(observed, self.count),
        }
    }
}

impl fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status:{} count{}{}",
            self.status,
            self.comparison.symbol(),
            self.count
        )
    }
}

impl FromStr for ThresholdRule {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |msg: &str| DriverError::invalid_threshold(s, msg);

        let mut parts = s.split_whitespace();
        let (selector, condition) = match (parts.next(), parts.next(), parts.next()) {
            (Some(sel), Some(cond), None) => (sel, cond),
            _ => return Err(invalid("expected '<selector> count<op><n>'")),
        };

        // Accept both `status:500` and k6's `http_reqs{status:500}:`
        let selector = selector.trim_end_matches(':');
        let selector = selector
            .strip_prefix("http_reqs{")
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(selector);
        let class = selector
            .strip_prefix("status:")
            .ok_or_else(|| invalid("selector must start with 'status:'"))?;
        let status: StatusClass = class.parse().map_err(|e: String| invalid(&e))?;

        let condition = condition
            .strip_prefix("count")
            .ok_or_else(|| invalid("condition must start with 'count'"))?;
        let (comparison, limit) = Comparison::split_prefix(condition)
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let count = limit
            .parse::<u64>()
            .map_err(|_| invalid("limit must be a non-negative integer"))?;

        Ok(Self::new(status, comparison, count))
    }
}

impl TryFrom<String> for ThresholdRule {
    type Error = DriverError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ThresholdRule> for String {
    fn from(rule: ThresholdRule) -> Self {
        rule.to_string()
    }
}

/// Outcome of one rule after the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub rule: ThresholdRule,
    pub observed: u64,
    pub passed: bool,
}

/// Evaluate every rule against the full outcome set.
pub fn evaluate(rules: &[ThresholdRule], outcomes: &[RequestOutcome]) -> Vec<ThresholdResult> {
    rules.iter().map(|rule| rule.evaluate(outcomes)).collect()
}

/// The run passes only when every rule holds.
pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcomes_with(statuses: &[ResponseStatus]) -> Vec<RequestOutcome> {
        statuses
            .iter()
            .map(|s| RequestOutcome::new(0, *s, Duration::from_millis(5)))
            .collect()
    }

    #[test]
    fn test_parse_exact_rule() {
        let rule = ThresholdRule::parse("status:500 count>1").unwrap();
        assert_eq!(rule.status, StatusClass::Exact(500));
        assert_eq!(rule.comparison, Comparison::Greater);
        assert_eq!(rule.count, 1);
        assert_eq!(rule.to_string(), "status:500 count>1");
    }

    #[test]
    fn test_parse_k6_selector() {
        let rule = ThresholdRule::parse("http_reqs{status:503}: count>=2").unwrap();
        assert_eq!(rule.status, StatusClass::Exact(503));
        assert_eq!(rule.comparison, Comparison::GreaterOrEqual);
        assert_eq!(rule.count, 2);
    }

    #[test]
    fn test_parse_family_and_transport() {
        let family = ThresholdRule::parse("status:5xx count<=10").unwrap();
        assert_eq!(family.status, StatusClass::Family(5));
        assert_eq!(family.comparison, Comparison::LessOrEqual);

        let transport = ThresholdRule::parse("status:transport_error count==0").unwrap();
        assert_eq!(transport.status, StatusClass::TransportError);
        assert_eq!(transport.comparison, Comparison::Equal);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ThresholdRule::parse("status:500").is_err());
        assert!(ThresholdRule::parse("latency:500 count>1").is_err());
        assert!(ThresholdRule::parse("status:999 count>1").is_err());
        assert!(ThresholdRule::parse("status:6xx count>1").is_err());
        assert!(ThresholdRule::parse("status:500 count~1").is_err());
        assert!(ThresholdRule::parse("status:500 count>-1").is_err());
        assert!(ThresholdRule::parse("status:500 rate>1").is_err());
    }

    #[test]
    fn test_greater_than_one_needs_two_matches() {
        let rule = ThresholdRule::parse("status:500 count>1").unwrap();

        let none = outcomes_with(&[ResponseStatus::Http(200), ResponseStatus::Http(200)]);
        assert!(!rule.evaluate(&none).passed);

        let one = outcomes_with(&[ResponseStatus::Http(200), ResponseStatus::Http(500)]);
        let result = rule.evaluate(&one);
        assert_eq!(result.observed, 1);
        assert!(!result.passed);

        let two = outcomes_with(&[
            ResponseStatus::Http(500),
            ResponseStatus::Http(200),
            ResponseStatus::Http(500),
        ]);
        let result = rule.evaluate(&two);
        assert_eq!(result.observed, 2);
        assert!(result.passed);
    }

    #[test]
    fn test_family_matching() {
        let class = StatusClass::Family(5);
        assert!(class.matches(ResponseStatus::Http(502)));
        assert!(!class.matches(ResponseStatus::Http(404)));
        assert!(!class.matches(ResponseStatus::TransportError));
        assert!(StatusClass::TransportError.matches(ResponseStatus::TransportError));
    }

    #[test]
    fn test_all_passed() {
        let outcomes = outcomes_with(&[ResponseStatus::Http(200); 3]);
        let rules = vec![
            ThresholdRule::parse("status:500 count<1").unwrap(),
            ThresholdRule::parse("status:200 count==3").unwrap(),
        ];
        let results = evaluate(&rules, &outcomes);
        assert!(all_passed(&results));

        let rules = vec![ThresholdRule::parse("status:200 count!=3").unwrap()];
        assert!(!all_passed(&evaluate(&rules, &outcomes)));
    }

    #[test]
    fn test_serde_uses_text_form() {
        let rules: Vec<ThresholdRule> =
            serde_yaml::from_str("- status:500 count>1\n- status:4xx count<5\n").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].status, StatusClass::Family(4));

        let json = serde_json::to_string(&rules[0]).unwrap();
        assert_eq!(json, "\"status:500 count>1\"");
    }
}
