mod error;
pub mod metrics;
pub mod registry;
pub mod sample;
pub mod trend;

pub use error::{Error, Result};
pub use metrics::{
    CounterHandle, GaugeHandle, MetricKind, MetricSummary, MetricValues, RateHandle, TrendHandle,
};
pub use registry::Registry;
pub use sample::{Sample, SampleValue};
pub use trend::TrendSummary;
