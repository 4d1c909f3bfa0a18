use std::sync::Arc;

use dashmap::DashMap;

use crate::metrics::{
    CounterHandle, GaugeHandle, MetricKind, MetricStorage, MetricSummary, RateHandle, TrendHandle,
};
use crate::sample::{Sample, SampleValue};
use crate::{Error, Result};

/// Per-run set of named collectors.
///
/// The name map is sharded and each collector synchronizes on its own, so concurrent
/// writers to different metrics never contend and writers to the same rate/counter/gauge
/// only touch atomics.
#[derive(Debug, Default)]
pub struct Registry {
    storage: DashMap<Arc<str>, MetricStorage>,
}

impl Registry {
    fn register(&self, name: &str, kind: MetricKind) -> Result<MetricStorage> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        let storage = match self.storage.get(name) {
            Some(existing) => existing.value().clone(),
            None => self
                .storage
                .entry(Arc::from(name))
                .or_insert_with(|| MetricStorage::new(kind))
                .value()
                .clone(),
        };

        if storage.kind() != kind {
            return Err(Error::KindMismatch {
                name: name.to_string(),
                registered: storage.kind(),
                requested: kind,
            });
        }

        Ok(storage)
    }

    pub fn rate(&self, name: &str) -> Result<RateHandle> {
        match self.register(name, MetricKind::Rate)? {
            MetricStorage::Rate(r) => Ok(RateHandle(r)),
            other => Err(mismatch(name, &other, MetricKind::Rate)),
        }
    }

    pub fn trend(&self, name: &str) -> Result<TrendHandle> {
        match self.register(name, MetricKind::Trend)? {
            MetricStorage::Trend(t) => Ok(TrendHandle(t)),
            other => Err(mismatch(name, &other, MetricKind::Trend)),
        }
    }

    pub fn counter(&self, name: &str) -> Result<CounterHandle> {
        match self.register(name, MetricKind::Counter)? {
            MetricStorage::Counter(c) => Ok(CounterHandle(c)),
            other => Err(mismatch(name, &other, MetricKind::Counter)),
        }
    }

    pub fn gauge(&self, name: &str) -> Result<GaugeHandle> {
        match self.register(name, MetricKind::Gauge)? {
            MetricStorage::Gauge(g) => Ok(GaugeHandle(g)),
            other => Err(mismatch(name, &other, MetricKind::Gauge)),
        }
    }

    pub fn record_rate(&self, name: &str, hit: bool) -> Result<()> {
        self.rate(name)?.record(hit);
        Ok(())
    }

    pub fn record_trend(&self, name: &str, value: f64) -> Result<()> {
        self.trend(name)?.record(value);
        Ok(())
    }

    pub fn add_counter(&self, name: &str, value: u64) -> Result<()> {
        self.counter(name)?.add(value);
        Ok(())
    }

    pub fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.gauge(name)?.set(value);
        Ok(())
    }

    pub fn record(&self, sample: Sample) -> Result<()> {
        match sample.value {
            SampleValue::Rate(hit) => self.record_rate(&sample.name, hit),
            SampleValue::Trend(v) => self.record_trend(&sample.name, v),
            SampleValue::Counter(v) => self.add_counter(&sample.name, v),
            SampleValue::Gauge(v) => self.set_gauge(&sample.name, v),
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.storage.get(name).map(|s| s.value().kind())
    }

    pub fn snapshot(&self, name: &str) -> Option<MetricSummary> {
        let storage = self.storage.get(name)?.value().clone();
        Some(MetricSummary {
            name: name.to_string(),
            kind: storage.kind(),
            values: storage.values(),
        })
    }

    /// Summaries of every registered metric, sorted by name.
    pub fn summarize(&self) -> Vec<MetricSummary> {
        // Clone the handles out first so no shard lock is held while trends are locked.
        let entries: Vec<(Arc<str>, MetricStorage)> = self
            .storage
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut out: Vec<MetricSummary> = entries
            .into_iter()
            .map(|(name, storage)| MetricSummary {
                name: name.to_string(),
                kind: storage.kind(),
                values: storage.values(),
            })
            .collect();

        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

fn mismatch(name: &str, storage: &MetricStorage, requested: MetricKind) -> Error {
    Error::KindMismatch {
        name: name.to_string(),
        registered: storage.kind(),
        requested,
    }
}
