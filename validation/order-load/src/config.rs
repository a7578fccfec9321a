//! Scenario configuration: loading, built-ins, overrides and validation.

use crate::error::{DriverError, DriverResult};
use crate::scenario::{OrderTemplate, RequestTemplate};
use crate::threshold::ThresholdRule;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Built-in scenario selectors.
pub const CREATE_ORDERS: &str = "create-orders";
pub const GET_ORDERS: &str = "get-orders";

const DEFAULT_BASE_URL: &str = "http://localhost:9080";
const FIXED_ORDER_ID: &str = "6441fde0ff591b2f1c9693b3";

/// Longest run a scenario may ask for (one week).
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// A complete, immutable description of one load run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub workers: u32,
    pub duration_secs: u64,
    #[serde(default)]
    pub think_time_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long in-flight requests may finish after the run is stopped.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Status every response is checked against (diagnostic only).
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    pub request: RequestTemplate,
    #[serde(default)]
    pub thresholds: Vec<ThresholdRule>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_expected_status() -> u16 {
    200
}

/// Values supplied on the command line that replace scenario settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<u32>,
    pub duration_secs: Option<u64>,
    pub think_time_ms: Option<u64>,
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub thresholds: Option<Vec<ThresholdRule>>,
}

impl ScenarioConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> DriverResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> DriverResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Names accepted by [`ScenarioConfig::builtin`].
    pub fn builtin_names() -> &'static [&'static str] {
        &[CREATE_ORDERS, GET_ORDERS]
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            CREATE_ORDERS => Some(Self::create_orders()),
            GET_ORDERS => Some(Self::get_orders()),
            _ => None,
        }
    }

    /// Resolve a selector: a built-in name first, then a YAML file path.
    pub fn resolve(selector: &str) -> DriverResult<Self> {
        if let Some(config) = Self::builtin(selector) {
            return Ok(config);
        }
        let path = Path::new(selector);
        if path.is_file() {
            return Self::from_file(path);
        }
        Err(DriverError::UnknownScenario(selector.to_string()))
    }

    /// 10 workers posting one order per second each for five minutes.
    pub fn create_orders() -> Self {
        Self {
            name: CREATE_ORDERS.to_string(),
            description: "POST /orders with a generated order and x-request-id".to_string(),
            base_url: default_base_url(),
            workers: 10,
            duration_secs: 300,
            think_time_ms: 1_000,
            request_timeout_ms: default_request_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
            expected_status: default_expected_status(),
            request: RequestTemplate::create_order(OrderTemplate::default()),
            thresholds: server_error_tripwires(),
        }
    }

    /// 20 workers fetching one fixed order every 100ms for five minutes.
    pub fn get_orders() -> Self {
        Self {
            name: GET_ORDERS.to_string(),
            description: "GET /orders/{id} for a fixed order".to_string(),
            base_url: default_base_url(),
            workers: 20,
            duration_secs: 300,
            think_time_ms: 100,
            request_timeout_ms: default_request_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
            expected_status: default_expected_status(),
            request: RequestTemplate::get_order(FIXED_ORDER_ID),
            thresholds: server_error_tripwires(),
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(duration) = overrides.duration_secs {
            self.duration_secs = duration;
        }
        if let Some(think) = overrides.think_time_ms {
            self.think_time_ms = think;
        }
        if let Some(url) = overrides.base_url {
            self.base_url = url;
        }
        if let Some(timeout) = overrides.request_timeout_ms {
            self.request_timeout_ms = timeout;
        }
        if let Some(thresholds) = overrides.thresholds {
            self.thresholds = thresholds;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> DriverResult<()> {
        if self.workers == 0 {
            return Err(DriverError::invalid_config("workers must be > 0"));
        }
        if self.duration_secs == 0 {
            return Err(DriverError::invalid_config("duration_secs must be > 0"));
        }
        if self.duration_secs > MAX_DURATION_SECS
            || std::time::Instant::now().checked_add(self.duration()).is_none()
        {
            return Err(DriverError::invalid_config(format!(
                "duration_secs {} exceeds the maximum of {}",
                self.duration_secs, MAX_DURATION_SECS
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(DriverError::invalid_config("request_timeout_ms must be > 0"));
        }
        if !(100..=599).contains(&self.expected_status) {
            return Err(DriverError::invalid_config(format!(
                "expected_status {} is not an HTTP status code",
                self.expected_status
            )));
        }
        if !self.request.path.starts_with('/') {
            return Err(DriverError::invalid_config(format!(
                "request path '{}' must start with '/'",
                self.request.path
            )));
        }

        let url = reqwest::Url::parse(&self.target_url()).map_err(|e| {
            DriverError::invalid_config(format!("invalid target URL '{}': {}", self.target_url(), e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DriverError::invalid_config(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        for name in self.request.header_names() {
            reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                DriverError::invalid_config(format!("invalid header name '{}'", name))
            })?;
        }
        for value in self.request.headers.values() {
            reqwest::header::HeaderValue::from_str(value).map_err(|_| {
                DriverError::invalid_config(format!("invalid header value '{}'", value))
            })?;
        }

        Ok(())
    }

    /// Full URL every worker hits.
    pub fn target_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.request.path)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// `count > 1` for each gateway/server error, as the k6 scripts declare.
fn server_error_tripwires() -> Vec<ThresholdRule> {
    use crate::threshold::{Comparison, StatusClass};

    [500, 502, 503, 504]
        .into_iter()
        .map(|code| ThresholdRule::new(StatusClass::Exact(code), Comparison::Greater, 1))
        .collect()
}
