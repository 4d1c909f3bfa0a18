mod http;

pub mod runner;

pub use http::HttpTransport;
pub use rampload_http::{HttpClient, HttpClientConfig};
pub use rampload_metrics::{
    MetricKind, MetricSummary, MetricValues, Registry, Sample, SampleValue, TrendSummary,
};
pub use runner::*;
