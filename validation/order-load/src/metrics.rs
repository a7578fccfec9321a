//! Request outcomes, the shared outcome log, and aggregation into a report.

use crate::config::ScenarioConfig;
use crate::threshold::{self, ThresholdResult};
use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// What a request ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResponseStatus {
    /// An HTTP response arrived with this status code.
    Http(u16),
    /// No response: connection refused, DNS failure, timeout, ...
    TransportError,
}

impl ResponseStatus {
    pub const TRANSPORT_ERROR_KEY: &'static str = "transport_error";

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseStatus::Http(code) if (200..300).contains(code))
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Http(code) => write!(f, "{}", code),
            ResponseStatus::TransportError => f.write_str(Self::TRANSPORT_ERROR_KEY),
        }
    }
}

/// One finished request. Never mutated after it is recorded.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub worker: u32,
    pub status: ResponseStatus,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<Uuid>,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn new(worker: u32, status: ResponseStatus, latency: Duration) -> Self {
        Self {
            worker,
            status,
            latency,
            timestamp: Utc::now(),
            request_id: None,
            error: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_request_id(mut self, request_id: Option<Uuid>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Append-only outcome collection shared by all workers.
///
/// Appends take a short lock that is never held across an await. The
/// running count is kept in an atomic so progress readers never contend
/// with writers.
#[derive(Debug, Default)]
pub struct OutcomeLog {
    entries: Mutex<Vec<RequestOutcome>>,
    recorded: AtomicU64,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: RequestOutcome) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(outcome);
        self.recorded.fetch_add(1, Ordering::Release);
    }

    /// Number of outcomes recorded so far.
    pub fn len(&self) -> u64 {
        self.recorded.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything recorded so far, in append order.
    pub fn snapshot(&self) -> Vec<RequestOutcome> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Latency distribution of responses that arrived (ms).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Result of the per-response status check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSummary {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

impl CheckSummary {
    pub fn pass_rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            0.0
        } else {
            self.passed as f64 / total as f64 * 100.0
        }
    }
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub scenario: String,
    pub method: String,
    pub target: String,
    pub workers: u32,
    pub duration_secs: f64,
    pub total_requests: u64,
    /// Status key (`"200"`, `"503"`, `"transport_error"`) to count.
    pub status_counts: BTreeMap<String, u64>,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
    pub checks: CheckSummary,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

impl RunReport {
    pub fn count_for(&self, status: ResponseStatus) -> u64 {
        self.status_counts
            .get(&status.to_string())
            .copied()
            .unwrap_or(0)
    }

    /// Sum over all status buckets; always equals `total_requests`.
    pub fn counted_requests(&self) -> u64 {
        self.status_counts.values().sum()
    }
}

/// Aggregates outcomes into counts and a latency histogram.
pub struct MetricsCollector {
    histogram: Histogram<u64>,
    status_counts: BTreeMap<ResponseStatus, u64>,
    requests_total: u64,
    expected_status: u16,
    checks_passed: u64,
    checks_failed: u64,
}

impl MetricsCollector {
    pub fn new(expected_status: u16) -> Self {
        Self {
            histogram: Histogram::new(3).expect("Failed to create histogram"),
            status_counts: BTreeMap::new(),
            requests_total: 0,
            expected_status,
            checks_passed: 0,
            checks_failed: 0,
        }
    }

    pub fn from_outcomes(expected_status: u16, outcomes: &[RequestOutcome]) -> Self {
        let mut collector = Self::new(expected_status);
        for outcome in outcomes {
            collector.record(outcome);
        }
        collector
    }

    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.requests_total += 1;
        *self.status_counts.entry(outcome.status).or_insert(0) += 1;

        if outcome.status == ResponseStatus::Http(self.expected_status) {
            self.checks_passed += 1;
        } else {
            self.checks_failed += 1;
        }

        // Transport failures have no response to time.
        if let ResponseStatus::Http(_) = outcome.status {
            let micros = u64::try_from(outcome.latency.as_micros()).unwrap_or(u64::MAX);
            self.histogram.record(micros).ok();
        }
    }

    pub fn total(&self) -> u64 {
        self.requests_total
    }

    fn latency_summary(&self) -> LatencySummary {
        if self.histogram.len() == 0 {
            return LatencySummary::default();
        }
        let ms = |us: u64| us as f64 / 1000.0;
        LatencySummary {
            min_ms: ms(self.histogram.min()),
            avg_ms: self.histogram.mean() / 1000.0,
            p50_ms: ms(self.histogram.value_at_percentile(50.0)),
            p90_ms: ms(self.histogram.value_at_percentile(90.0)),
            p95_ms: ms(self.histogram.value_at_percentile(95.0)),
            p99_ms: ms(self.histogram.value_at_percentile(99.0)),
            max_ms: ms(self.histogram.max()),
        }
    }

    /// Generate the final report.
    pub fn results(
        &self,
        config: &ScenarioConfig,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        thresholds: Vec<ThresholdResult>,
    ) -> RunReport {
        let duration_secs = elapsed.as_secs_f64();
        let rps = if duration_secs > 0.0 {
            self.requests_total as f64 / duration_secs
        } else {
            0.0
        };

        RunReport {
            timestamp: started_at.to_rfc3339(),
            scenario: config.name.clone(),
            method: config.request.method.to_string(),
            target: config.target_url(),
            workers: config.workers,
            duration_secs,
            total_requests: self.requests_total,
            status_counts: self
                .status_counts
                .iter()
                .map(|(status, count)| (status.to_string(), *count))
                .collect(),
            requests_per_second: rps,
            latency: self.latency_summary(),
            checks: CheckSummary {
                name: format!("status was {}", self.expected_status),
                passed: self.checks_passed,
                failed: self.checks_failed,
            },
            passed: threshold::all_passed(&thresholds),
            thresholds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::ThresholdRule;
    use std::sync::Arc;

    fn outcome(status: ResponseStatus, ms: u64) -> RequestOutcome {
        RequestOutcome::new(0, status, Duration::from_millis(ms))
    }

    #[test]
    fn test_status_counts_sum_to_total() {
        let outcomes = vec![
            outcome(ResponseStatus::Http(200), 10),
            outcome(ResponseStatus::Http(200), 12),
            outcome(ResponseStatus::Http(503), 40),
            outcome(ResponseStatus::TransportError, 0),
        ];
        let collector = MetricsCollector::from_outcomes(200, &outcomes);
        let report = collector.results(
            &ScenarioConfig::get_orders(),
            Utc::now(),
            Duration::from_secs(2),
            vec![],
        );

        assert_eq!(report.total_requests, 4);
        assert_eq!(report.counted_requests(), 4);
        assert_eq!(report.count_for(ResponseStatus::Http(200)), 2);
        assert_eq!(report.count_for(ResponseStatus::Http(503)), 1);
        assert_eq!(report.count_for(ResponseStatus::TransportError), 1);
        assert_eq!(report.count_for(ResponseStatus::Http(500)), 0);
        assert_eq!(report.requests_per_second, 2.0);
        assert!(report.passed);
    }

    #[test]
    fn test_checks_follow_expected_status() {
        let outcomes = vec![
            outcome(ResponseStatus::Http(201), 10),
            outcome(ResponseStatus::Http(200), 10),
            outcome(ResponseStatus::TransportError, 0),
        ];
        let collector = MetricsCollector::from_outcomes(201, &outcomes);
        let report = collector.results(
            &ScenarioConfig::create_orders(),
            Utc::now(),
            Duration::from_secs(1),
            vec![],
        );

        assert_eq!(report.checks.name, "status was 201");
        assert_eq!(report.checks.passed, 1);
        assert_eq!(report.checks.failed, 2);
    }

    #[test]
    fn test_latency_ignores_transport_errors() {
        let outcomes = vec![
            outcome(ResponseStatus::Http(200), 10),
            outcome(ResponseStatus::Http(200), 20),
            RequestOutcome::new(0, ResponseStatus::TransportError, Duration::from_secs(30)),
        ];
        let collector = MetricsCollector::from_outcomes(200, &outcomes);
        let summary = collector.latency_summary();

        assert!(summary.max_ms < 25.0);
        assert!(summary.min_ms >= 9.9);
    }

    #[test]
    fn test_empty_run_reports_zeroes() {
        let collector = MetricsCollector::new(200);
        let report = collector.results(
            &ScenarioConfig::get_orders(),
            Utc::now(),
            Duration::ZERO,
            vec![],
        );
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.requests_per_second, 0.0);
        assert_eq!(report.latency.p99_ms, 0.0);
        assert_eq!(report.checks.pass_rate(), 0.0);
    }

    #[test]
    fn test_failed_threshold_fails_report() {
        let outcomes = vec![outcome(ResponseStatus::Http(200), 5)];
        let rules = vec![ThresholdRule::parse("status:500 count>1").unwrap()];
        let results = threshold::evaluate(&rules, &outcomes);

        let report = MetricsCollector::from_outcomes(200, &outcomes).results(
            &ScenarioConfig::get_orders(),
            Utc::now(),
            Duration::from_secs(1),
            results,
        );
        assert!(!report.passed);
        assert_eq!(report.thresholds[0].observed, 0);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let log = Arc::new(OutcomeLog::new());
        let handles: Vec<_> = (0..8u32)
            .map(|worker| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        log.record(
                            RequestOutcome::new(
                                worker,
                                ResponseStatus::Http(200),
                                Duration::from_micros(i),
                            ),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 4000);
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 4000);

        // Per-worker insertion order survives.
        for worker in 0..8u32 {
            let latencies: Vec<_> = snapshot
                .iter()
                .filter(|o| o.worker == worker)
                .map(|o| o.latency)
                .collect();
            assert_eq!(latencies.len(), 500);
            assert!(latencies.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ResponseStatus::Http(404).to_string(), "404");
        assert_eq!(ResponseStatus::TransportError.to_string(), "transport_error");
        assert!(ResponseStatus::Http(204).is_success());
        assert!(!ResponseStatus::Http(500).is_success());
        assert!(!ResponseStatus::TransportError.is_success());
    }
}
