//! Bounded-memory distribution sketch used for trend metrics.
//!
//! Values are recorded in milliseconds (`f64`) and stored in an HDR histogram with
//! microsecond resolution and 3 significant digits, so memory use is fixed regardless of
//! how many samples a run produces. `count`, `min`, `max` and `mean` are tracked exactly
//! alongside. The first few samples are also kept verbatim, so small trends report exact
//! nearest-rank percentiles; larger ones report the upper edge of the bucket holding the
//! rank (within 0.1% relative error, never below the true value).

use hdrhistogram::Histogram;
use parking_lot::Mutex;

/// Sub-millisecond resolution: one histogram unit is one microsecond.
const UNITS_PER_MS: f64 = 1_000.0;

/// Upper bound: 1 hour in microseconds. Larger values saturate.
const MAX_UNITS: u64 = 3_600_000_000;

const SIGNIFICANT_DIGITS: u8 = 3;

/// Trends up to this many samples keep every value for exact percentiles.
const EXACT_SAMPLES: u64 = 1024;

pub(crate) fn new_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, MAX_UNITS, SIGNIFICANT_DIGITS) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

#[derive(Debug)]
pub struct Trend {
    inner: Mutex<TrendState>,
}

#[derive(Debug, Clone)]
struct TrendState {
    hist: Histogram<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    dropped: u64,
    exact: Vec<f64>,
}

impl Default for Trend {
    fn default() -> Self {
        Self {
            inner: Mutex::new(TrendState {
                hist: new_histogram(),
                count: 0,
                sum: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
                dropped: 0,
                exact: Vec::new(),
            }),
        }
    }
}

impl Trend {
    pub fn record(&self, value: f64) {
        let mut s = self.inner.lock();

        // NaN, infinities and negative values cannot be placed in the sketch.
        if !value.is_finite() || value < 0.0 {
            s.dropped = s.dropped.saturating_add(1);
            return;
        }

        let units = (value * UNITS_PER_MS).round() as u64;
        s.hist.saturating_record(units);
        s.count = s.count.saturating_add(1);
        s.sum += value;
        s.min = s.min.min(value);
        s.max = s.max.max(value);

        if s.count <= EXACT_SAMPLES {
            s.exact.push(value);
        } else if !s.exact.is_empty() {
            s.exact = Vec::new();
        }
    }

    pub fn summary(&self) -> TrendSummary {
        let s = self.inner.lock().clone();
        let exact = (s.count <= EXACT_SAMPLES).then(|| {
            let mut v = s.exact;
            v.sort_by(f64::total_cmp);
            v
        });
        TrendSummary {
            hist: s.hist,
            count: s.count,
            sum: s.sum,
            min: s.min,
            max: s.max,
            dropped: s.dropped,
            exact,
        }
    }
}

/// Point-in-time view of a trend.
///
/// An empty trend reports `has_data() == false` and returns `0.0` from every statistic.
#[derive(Debug, Clone)]
pub struct TrendSummary {
    hist: Histogram<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    dropped: u64,
    /// Sorted samples while the trend is small enough to keep them.
    exact: Option<Vec<f64>>,
}

impl TrendSummary {
    pub fn has_data(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Samples rejected because they were negative or not finite.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn min(&self) -> f64 {
        if self.has_data() { self.min } else { 0.0 }
    }

    pub fn max(&self) -> f64 {
        if self.has_data() { self.max } else { 0.0 }
    }

    pub fn mean(&self) -> f64 {
        if self.has_data() {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn med(&self) -> f64 {
        self.percentile(50.0)
    }

    pub fn p90(&self) -> f64 {
        self.percentile(90.0)
    }

    pub fn p95(&self) -> f64 {
        self.percentile(95.0)
    }

    pub fn p99(&self) -> f64 {
        self.percentile(99.0)
    }

    /// Value at percentile `p` (0..=100, clamped).
    ///
    /// Nearest-rank over the retained samples for small trends. Otherwise the highest value
    /// of the histogram bucket holding the rank, clamped into `[min, max]`, so the result
    /// is never lower than the recorded value at that rank.
    pub fn percentile(&self, p: f64) -> f64 {
        if !self.has_data() {
            return 0.0;
        }
        if p <= 0.0 {
            return self.min;
        }
        if p >= 100.0 {
            return self.max;
        }

        if let Some(values) = &self.exact {
            let rank = ((p / 100.0) * values.len() as f64).ceil() as usize;
            let idx = rank.clamp(1, values.len()) - 1;
            return values[idx];
        }

        let v = self.hist.value_at_quantile(p / 100.0) as f64 / UNITS_PER_MS;
        v.clamp(self.min, self.max)
    }
}
