//! Results reporting and formatting.

use crate::error::DriverResult;
use crate::metrics::{RequestOutcome, RunReport};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Formats run reports for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format the report as a console table.
    pub fn format_table(report: &RunReport) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Run Results: {}", report.scenario)]);

        table.add_row(vec![
            "Target:",
            &format!("{} {}", report.method, report.target),
        ]);
        table.add_row(vec!["Workers:", &report.workers.to_string()]);
        table.add_row(vec!["Duration:", &format!("{:.1}s", report.duration_secs)]);
        table.add_row(vec!["Total Requests:", &report.total_requests.to_string()]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", report.requests_per_second),
        ]);
        table.add_row(vec![
            "Checks:",
            &format!(
                "{} {:.1}% ({} / {})",
                report.checks.name,
                report.checks.pass_rate(),
                report.checks.passed,
                report.checks.passed + report.checks.failed
            ),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                report.latency.p50_ms,
                report.latency.p90_ms,
                report.latency.p95_ms,
                report.latency.p99_ms,
                report.latency.max_ms
            ),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Status", "Count"]);
        for (status, count) in &report.status_counts {
            table.add_row(vec![status.as_str(), &count.to_string()]);
        }

        if !report.thresholds.is_empty() {
            table.add_row(vec!["", ""]);
            table.add_row(vec!["Thresholds", ""]);
            for result in &report.thresholds {
                let mark = if result.passed { "✓" } else { "✗" };
                table.add_row(vec![
                    format!("{} {}", mark, result.rule),
                    format!("observed {}", result.observed),
                ]);
            }
        }

        table.add_row(vec!["", ""]);
        table.add_row(vec![
            "Result:",
            if report.passed { "PASSED" } else { "FAILED" },
        ]);

        table.to_string()
    }

    /// Format the report as JSON.
    pub fn format_json(report: &RunReport) -> DriverResult<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Format the report as a CSV row.
    pub fn format_csv(report: &RunReport) -> String {
        let count = |key: &str| report.status_counts.get(key).copied().unwrap_or(0);
        let non_2xx: u64 = report
            .status_counts
            .iter()
            .filter(|(key, _)| !key.starts_with('2'))
            .map(|(_, count)| count)
            .sum();

        format!(
            "{},{},{},{:.1},{},{:.1},{:.1},{:.1},{:.1},{},{},{}",
            report.timestamp,
            report.scenario,
            report.workers,
            report.duration_secs,
            report.total_requests,
            report.requests_per_second,
            report.latency.p50_ms,
            report.latency.p90_ms,
            report.latency.p99_ms,
            non_2xx,
            count("transport_error"),
            report.passed
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,workers,duration,requests,rps,p50,p90,p99,non_2xx,transport_errors,passed"
    }
}

/// One line of the JSONL request log.
#[derive(Debug, Serialize)]
pub struct RequestLog<'a> {
    pub timestamp: String,
    pub worker: u32,
    pub status: String,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> From<&'a RequestOutcome> for RequestLog<'a> {
    fn from(outcome: &'a RequestOutcome) -> Self {
        Self {
            timestamp: outcome.timestamp.to_rfc3339(),
            worker: outcome.worker,
            status: outcome.status.to_string(),
            latency_ms: outcome.latency.as_secs_f64() * 1000.0,
            request_id: outcome.request_id.map(|id| id.to_string()),
            error: outcome.error.as_deref(),
        }
    }
}

/// Write every outcome to `path` as JSON lines.
pub fn write_request_log(path: &Path, outcomes: &[RequestOutcome]) -> DriverResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for outcome in outcomes {
        serde_json::to_writer(&mut writer, &RequestLog::from(outcome))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use crate::metrics::{MetricsCollector, ResponseStatus};
    use crate::threshold::{self, ThresholdRule};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn sample_outcomes() -> Vec<RequestOutcome> {
        vec![
            RequestOutcome::new(0, ResponseStatus::Http(200), Duration::from_millis(12))
                .with_request_id(Some(Uuid::new_v4())),
            RequestOutcome::new(1, ResponseStatus::Http(502), Duration::from_millis(30)),
            RequestOutcome::new(1, ResponseStatus::TransportError, Duration::from_millis(1))
                .with_error("connect: connection refused"),
        ]
    }

    fn sample_report() -> RunReport {
        let outcomes = sample_outcomes();
        let rules = vec![
            ThresholdRule::parse("status:502 count<1").unwrap(),
            ThresholdRule::parse("status:transport_error count<=1").unwrap(),
        ];
        let results = threshold::evaluate(&rules, &outcomes);
        MetricsCollector::from_outcomes(200, &outcomes).results(
            &ScenarioConfig::create_orders(),
            Utc::now(),
            Duration::from_secs(3),
            results,
        )
    }

    #[test]
    fn test_table_lists_statuses_and_thresholds() {
        let table = ResultsReport::format_table(&sample_report());
        assert!(table.contains("Load Run Results: create-orders"));
        assert!(table.contains("transport_error"));
        assert!(table.contains("502"));
        assert!(table.contains("✗ status:502 count<1"));
        assert!(table.contains("✓ status:transport_error count<=1"));
        assert!(table.contains("FAILED"));
    }

    #[test]
    fn test_json_round_trips_report() {
        let report = sample_report();
        let json = ResultsReport::format_json(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["total_requests"], 3);
        assert_eq!(value["status_counts"]["200"], 1);
        assert_eq!(value["status_counts"]["transport_error"], 1);
        assert_eq!(value["thresholds"][0]["rule"], "status:502 count<1");
        assert_eq!(value["passed"], false);
    }

    #[test]
    fn test_csv_matches_header() {
        let row = ResultsReport::format_csv(&sample_report());
        let columns = ResultsReport::csv_header().split(',').count();
        assert_eq!(row.split(',').count(), columns);
        assert!(row.ends_with(",2,1,false"));
    }

    #[test]
    fn test_request_log_is_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");
        let outcomes = sample_outcomes();

        write_request_log(&path, &outcomes).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["status"], "200");
        assert!(lines[0]["request_id"].is_string());
        assert!(lines[1].get("request_id").is_none());
        assert_eq!(lines[2]["status"], "transport_error");
        assert_eq!(lines[2]["error"], "connect: connection refused");
    }
}
