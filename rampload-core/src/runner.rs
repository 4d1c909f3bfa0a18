mod config;
mod error;
mod executor;
mod metrics;
mod pool;
mod progress;
mod run;
mod schedule;
mod summary;
mod thresholds;
mod vu;

pub use config::{RequestTemplate, RunConfig, Stage, ThinkTime};
pub use error::{Error, Result};
pub use executor::{RequestExecutor, RequestOutcome, Transport, TransportError};
pub use metrics::{RequestMetrics, names};
pub use pool::{Reconciled, ShutdownReport, VuPool, VuStateCounts};
pub use progress::{ProgressFn, ProgressUpdate, StageProgress};
pub use run::{RunContext, run};
pub use schedule::{RunTimeline, StageSnapshot};
pub use summary::{RunSummary, StopReason};
pub use thresholds::{
    ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdOutcome, ThresholdReport, ThresholdSpec,
    evaluate_thresholds, parse_threshold_expr,
};
pub use vu::{VuId, VuState};
