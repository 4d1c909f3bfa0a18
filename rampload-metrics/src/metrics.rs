use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::trend::{Trend, TrendSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

#[derive(Debug, Clone)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub values: MetricValues,
}

#[derive(Debug, Clone)]
pub enum MetricValues {
    Counter { total: u64 },
    Gauge { value: f64, max: f64 },
    Rate { hits: u64, total: u64, rate: f64 },
    Trend(TrendSummary),
}

impl MetricValues {
    /// Whether at least one sample was recorded.
    pub fn has_data(&self) -> bool {
        match self {
            Self::Counter { total } => *total > 0,
            Self::Gauge { .. } => true,
            Self::Rate { total, .. } => *total > 0,
            Self::Trend(t) => t.has_data(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Rate {
    hits: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    #[inline]
    pub fn record(&self, hit: bool) {
        // `total` is bumped before `hits` so a reader that loads `hits` first never
        // observes `hits > total`.
        self.total.fetch_add(1, Ordering::Release);
        if hit {
            self.hits.fetch_add(1, Ordering::Release);
        }
    }

    /// Returns `(hits, total)`.
    pub fn load(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Acquire);
        (hits, total)
    }

    /// Fraction of true samples; `0.0` when nothing was recorded.
    pub fn rate(&self) -> f64 {
        let (hits, total) = self.load();
        ratio(hits, total)
    }
}

pub(crate) fn ratio(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    total: AtomicU64,
}

impl Counter {
    #[inline]
    pub fn add(&self, value: u64) {
        self.total.fetch_add(value, Ordering::Relaxed);
    }

    pub fn load(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Last-value gauge that also remembers the largest value it has seen.
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
    max: AtomicU64,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            value: AtomicU64::new(0f64.to_bits()),
            max: AtomicU64::new(0f64.to_bits()),
        }
    }
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
        let _ = self
            .max
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                (value > f64::from_bits(cur)).then_some(value.to_bits())
            });
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }

    pub fn max(&self) -> f64 {
        f64::from_bits(self.max.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum MetricStorage {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::default()),
            MetricKind::Gauge => Self::Gauge(Arc::default()),
            MetricKind::Rate => Self::Rate(Arc::default()),
            MetricKind::Trend => Self::Trend(Arc::default()),
        }
    }

    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    pub(crate) fn values(&self) -> MetricValues {
        match self {
            Self::Counter(c) => MetricValues::Counter { total: c.load() },
            Self::Gauge(g) => MetricValues::Gauge {
                value: g.load(),
                max: g.max(),
            },
            Self::Rate(r) => {
                let (hits, total) = r.load();
                MetricValues::Rate {
                    hits,
                    total,
                    rate: ratio(hits, total),
                }
            }
            Self::Trend(t) => MetricValues::Trend(t.summary()),
        }
    }
}

// Typed write handles. Obtain once from the registry, then record without name lookups.

#[derive(Debug, Clone)]
pub struct RateHandle(pub(crate) Arc<Rate>);

impl RateHandle {
    #[inline]
    pub fn record(&self, hit: bool) {
        self.0.record(hit);
    }

    pub fn rate(&self) -> f64 {
        self.0.rate()
    }

    /// Returns `(hits, total)`.
    pub fn load(&self) -> (u64, u64) {
        self.0.load()
    }
}

#[derive(Debug, Clone)]
pub struct TrendHandle(pub(crate) Arc<Trend>);

impl TrendHandle {
    #[inline]
    pub fn record(&self, value: f64) {
        self.0.record(value);
    }

    pub fn summary(&self) -> TrendSummary {
        self.0.summary()
    }
}

#[derive(Debug, Clone)]
pub struct CounterHandle(pub(crate) Arc<Counter>);

impl CounterHandle {
    #[inline]
    pub fn add(&self, value: u64) {
        self.0.add(value);
    }

    pub fn load(&self) -> u64 {
        self.0.load()
    }
}

#[derive(Debug, Clone)]
pub struct GaugeHandle(pub(crate) Arc<Gauge>);

impl GaugeHandle {
    #[inline]
    pub fn set(&self, value: f64) {
        self.0.set(value);
    }

    pub fn load(&self) -> f64 {
        self.0.load()
    }

    pub fn max(&self) -> f64 {
        self.0.max()
    }
}
