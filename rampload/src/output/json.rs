use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use rampload_core::{MetricValues, ProgressUpdate, RunSummary};

use super::OutputFormatter;
use crate::run::RunPlan;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan: &RunPlan) {}

    fn progress(&self) -> Option<rampload_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_secs: f64,
    pub stage: usize,
    pub stages: usize,
    pub target_vus: u64,
    pub vus: u64,
    pub max_vus: u64,
    pub retiring_vus: u64,
    pub total_requests: u64,
    pub requests_per_sec: f64,
    pub error_rate: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),
        stage: u.stage.stage,
        stages: u.stage.stages,
        target_vus: u.desired_vus,
        vus: u.live_vus,
        max_vus: u.max_vus,
        retiring_vus: u.vu_states.retiring,
        total_requests: u.requests_total,
        requests_per_sec: u.rps_now,
        error_rate: u.error_rate,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub stop_reason: String,
    pub elapsed_secs: f64,
    pub interrupted_vus: u64,
    pub metrics: Vec<JsonMetric>,
    pub thresholds_passed: bool,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMetric {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub values: JsonMetricValues,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum JsonMetricValues {
    Counter {
        count: u64,
    },
    Gauge {
        value: f64,
        max: f64,
    },
    Rate {
        rate: f64,
        passes: u64,
        fails: u64,
    },
    Trend {
        count: u64,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

fn json_values(values: &MetricValues) -> JsonMetricValues {
    match values {
        MetricValues::Counter { total } => JsonMetricValues::Counter { count: *total },
        MetricValues::Gauge { value, max } => JsonMetricValues::Gauge {
            value: *value,
            max: *max,
        },
        MetricValues::Rate { hits, total, rate } => JsonMetricValues::Rate {
            rate: *rate,
            passes: *hits,
            fails: total.saturating_sub(*hits),
        },
        MetricValues::Trend(t) => {
            let v = |f: fn(&rampload_core::TrendSummary) -> f64| t.has_data().then(|| f(t));
            JsonMetricValues::Trend {
                count: t.count(),
                avg: v(|t| t.mean()),
                min: v(|t| t.min()),
                med: v(|t| t.med()),
                max: v(|t| t.max()),
                p90: v(|t| t.p90()),
                p95: v(|t| t.p95()),
                p99: v(|t| t.p99()),
            }
        }
    }
}

pub(crate) fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        stop_reason: summary.stop_reason.to_string(),
        elapsed_secs: summary.elapsed.as_secs_f64(),
        interrupted_vus: summary.interrupted_vus,
        metrics: summary
            .metrics
            .iter()
            .map(|m| JsonMetric {
                name: m.name.clone(),
                kind: m.kind.to_string(),
                values: json_values(&m.values),
            })
            .collect(),
        thresholds_passed: summary.thresholds.passed(),
        thresholds: summary
            .thresholds
            .outcomes
            .iter()
            .map(|o| JsonThreshold {
                metric: o.spec.metric.clone(),
                expression: o.spec.expression.clone(),
                observed: o.observed,
                passed: o.passed,
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
