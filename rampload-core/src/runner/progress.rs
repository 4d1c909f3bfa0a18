use std::time::Duration;

use super::pool::VuStateCounts;
use super::schedule::StageSnapshot;

pub type StageProgress = StageSnapshot;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: StageProgress,
    pub desired_vus: u64,
    pub live_vus: u64,
    pub max_vus: u64,
    pub vu_states: VuStateCounts,
    /// Requests completed so far.
    pub requests_total: u64,
    /// Requests/sec over the last tick.
    pub rps_now: f64,
    /// Fraction of failed requests so far (0..=1).
    pub error_rate: f64,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
