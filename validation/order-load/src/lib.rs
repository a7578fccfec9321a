//! Load driver for the orders API.
//!
//! This crate provides tools to:
//! - Describe a load scenario (built-in or YAML) and validate it up front
//! - Run a fixed pool of virtual workers against the target for a duration
//! - Tally every request outcome by status, including transport failures
//! - Evaluate pass/fail threshold rules and render the run report

pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod threshold;

pub use config::{Overrides, ScenarioConfig};
pub use error::{DriverError, DriverResult};
pub use metrics::{OutcomeLog, RequestOutcome, ResponseStatus, RunReport};
pub use report::ResultsReport;
pub use runner::{LoadDriver, RunningLoad, StopHandle};
pub use scenario::{BodyTemplate, HttpMethod, OrderTemplate, RequestTemplate};
pub use threshold::{Comparison, StatusClass, ThresholdResult, ThresholdRule};
