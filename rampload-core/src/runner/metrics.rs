use rampload_metrics::{CounterHandle, GaugeHandle, RateHandle, Registry, TrendHandle};

use super::error::Result;
use super::executor::RequestOutcome;

/// Built-in metric names.
pub mod names {
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const HTTP_REQS: &str = "http_reqs";
    pub const ITERATIONS: &str = "iterations";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";
    pub const ERRORS: &str = "errors";
    pub const RESPONSE_TIME: &str = "response_time";
    pub const CHECKS: &str = "checks";
}

/// Write handles for every built-in metric a virtual user touches.
///
/// Resolved once per run so the request loop never looks names up.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    http_req_duration: TrendHandle,
    http_req_failed: RateHandle,
    http_reqs: CounterHandle,
    iterations: CounterHandle,
    errors: RateHandle,
    response_time: TrendHandle,
    checks: RateHandle,
    vus: GaugeHandle,
    vus_max: GaugeHandle,
}

impl RequestMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        Ok(Self {
            http_req_duration: registry.trend(names::HTTP_REQ_DURATION)?,
            http_req_failed: registry.rate(names::HTTP_REQ_FAILED)?,
            http_reqs: registry.counter(names::HTTP_REQS)?,
            iterations: registry.counter(names::ITERATIONS)?,
            errors: registry.rate(names::ERRORS)?,
            response_time: registry.trend(names::RESPONSE_TIME)?,
            checks: registry.rate(names::CHECKS)?,
            vus: registry.gauge(names::VUS)?,
            vus_max: registry.gauge(names::VUS_MAX)?,
        })
    }

    /// Records one completed request loop iteration.
    pub fn record(&self, outcome: &RequestOutcome) {
        let ms = outcome.duration_ms();
        let failed = outcome.is_error();

        self.http_reqs.add(1);
        self.http_req_duration.record(ms);
        self.response_time.record(ms);
        self.http_req_failed.record(failed);
        self.errors.record(failed);

        // "status is 200" and "status is not 5xx".
        self.checks.record(outcome.status == 200);
        self.checks
            .record(outcome.error.is_none() && !outcome.is_server_error());

        self.iterations.add(1);
    }

    pub(crate) fn set_vus(&self, live: u64, max_vus: u64) {
        self.vus.set(live as f64);
        self.vus_max.set(max_vus as f64);
    }

    pub fn requests_total(&self) -> u64 {
        self.http_reqs.load()
    }

    pub fn error_rate(&self) -> f64 {
        self.errors.rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::executor::TransportError;
    use rampload_metrics::MetricValues;
    use std::time::Duration;

    fn outcome(status: u16, error: Option<TransportError>, ms: u64) -> RequestOutcome {
        RequestOutcome {
            status,
            duration: Duration::from_millis(ms),
            error,
        }
    }

    fn rate(reg: &Registry, name: &str) -> (u64, u64) {
        match reg.snapshot(name).map(|m| m.values) {
            Some(MetricValues::Rate { hits, total, .. }) => (hits, total),
            other => panic!("unexpected {name}: {other:?}"),
        }
    }

    #[test]
    fn outcomes_feed_builtin_metrics() {
        let reg = Registry::default();
        let m = RequestMetrics::register(&reg).unwrap_or_else(|e| panic!("{e}"));

        m.record(&outcome(200, None, 10));
        m.record(&outcome(404, None, 20));
        m.record(&outcome(503, None, 30));
        m.record(&outcome(0, Some(TransportError::timeout(Duration::from_secs(1))), 40));

        assert_eq!(m.requests_total(), 4);
        assert_eq!(rate(&reg, names::ERRORS), (3, 4));
        assert_eq!(rate(&reg, names::HTTP_REQ_FAILED), (3, 4));
        // 200: both pass; 404: second passes; 503 and transport error: neither.
        assert_eq!(rate(&reg, names::CHECKS), (3, 8));
        assert_eq!(m.error_rate(), 0.75);

        match reg.snapshot(names::HTTP_REQ_DURATION).map(|m| m.values) {
            Some(MetricValues::Trend(t)) => {
                assert_eq!(t.count(), 4);
                assert_eq!(t.min(), 10.0);
                assert_eq!(t.max(), 40.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match reg.snapshot(names::ITERATIONS).map(|m| m.values) {
            Some(MetricValues::Counter { total }) => assert_eq!(total, 4),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn kind_conflict_surfaces_at_registration() {
        let reg = Registry::default();
        reg.add_counter(names::ERRORS, 1)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(RequestMetrics::register(&reg).is_err());
    }
}
