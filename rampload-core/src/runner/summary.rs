use std::time::Duration;

use rampload_metrics::MetricSummary;

use super::thresholds::ThresholdReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// The timeline ran to its end.
    Completed,
    /// The run's cancellation token fired first.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub stop_reason: StopReason,
    /// Workers aborted mid-request because the graceful stop period expired.
    pub interrupted_vus: u64,
    pub metrics: Vec<MetricSummary>,
    pub thresholds: ThresholdReport,
}

impl RunSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.passed()
    }
}
