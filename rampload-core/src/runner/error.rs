use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`stages` must be a non-empty list of {{ duration, target }}")]
    EmptyStages,

    #[error("stage {index} has a zero duration")]
    ZeroStageDuration { index: usize },

    #[error("`max_vus` must be a positive integer")]
    InvalidMaxVus,

    #[error("`tick` must be a positive duration")]
    InvalidTick,

    #[error("invalid think time range: min {min:?} is greater than max {max:?}")]
    InvalidThinkTime { min: Duration, max: Duration },

    #[error("invalid threshold for `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("metrics error: {0}")]
    Metrics(#[from] rampload_metrics::Error),

    #[error("http client error: {0}")]
    Http(#[from] rampload_http::Error),
}
