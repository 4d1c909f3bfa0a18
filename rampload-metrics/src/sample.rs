use std::sync::Arc;
use std::time::Instant;

/// A single observation, moved into the [`Registry`](crate::Registry) when recorded.
///
/// Aggregates are order-insensitive; the timestamp is informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: Arc<str>,
    pub value: SampleValue,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Rate(bool),
    Trend(f64),
    Counter(u64),
    Gauge(f64),
}

impl Sample {
    pub fn new(name: impl Into<Arc<str>>, value: SampleValue) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: Instant::now(),
        }
    }

    pub fn rate(name: impl Into<Arc<str>>, hit: bool) -> Self {
        Self::new(name, SampleValue::Rate(hit))
    }

    pub fn trend(name: impl Into<Arc<str>>, value: f64) -> Self {
        Self::new(name, SampleValue::Trend(value))
    }

    pub fn counter(name: impl Into<Arc<str>>, value: u64) -> Self {
        Self::new(name, SampleValue::Counter(value))
    }

    pub fn gauge(name: impl Into<Arc<str>>, value: f64) -> Self {
        Self::new(name, SampleValue::Gauge(value))
    }
}
