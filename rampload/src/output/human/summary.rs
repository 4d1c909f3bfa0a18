use std::fmt::Write as _;

use rampload_core::{MetricSummary, MetricValues, RunSummary, ThresholdReport};

use super::format::*;

const NAME_WIDTH: usize = 22;

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  stopped: {} after {}",
        summary.stop_reason,
        format_duration(summary.elapsed)
    )
    .ok();
    if summary.interrupted_vus > 0 {
        writeln!(
            &mut out,
            "  interrupted_vus: {} (graceful stop expired)",
            summary.interrupted_vus
        )
        .ok();
    }

    out.push_str("\nmetrics\n");
    let secs = summary.elapsed.as_secs_f64().max(1e-9);
    for m in &summary.metrics {
        render_metric(m, secs, &mut out);
    }

    render_thresholds(&summary.thresholds, &mut out);
    out
}

fn render_metric(m: &MetricSummary, secs: f64, out: &mut String) {
    let name = dotted(&m.name, NAME_WIDTH);
    match &m.values {
        MetricValues::Counter { total } => {
            writeln!(
                out,
                "  {name} {total} ({}/s)",
                format_rate(*total as f64 / secs)
            )
            .ok();
        }
        MetricValues::Gauge { value, max } => {
            writeln!(out, "  {name} value={value} max={max}").ok();
        }
        MetricValues::Rate { hits, total, rate } => {
            writeln!(out, "  {name} {} ({hits}/{total})", format_percent(*rate)).ok();
        }
        MetricValues::Trend(t) if t.has_data() => {
            writeln!(
                out,
                "  {name} avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} (n={})",
                format_ms(t.mean()),
                format_ms(t.min()),
                format_ms(t.med()),
                format_ms(t.max()),
                format_ms(t.p90()),
                format_ms(t.p95()),
                format_ms(t.p99()),
                t.count()
            )
            .ok();
        }
        MetricValues::Trend(_) => {
            writeln!(out, "  {name} n/a").ok();
        }
    }
}

fn render_thresholds(report: &ThresholdReport, out: &mut String) {
    if report.outcomes.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for o in &report.outcomes {
        let mark = if o.passed { "pass" } else { "FAIL" };
        let observed = o
            .observed
            .map_or_else(|| "no data".to_string(), |v| format!("{v:.4}"));
        writeln!(
            out,
            "  [{mark}] {}: {} (observed {observed})",
            o.spec.metric, o.spec.expression
        )
        .ok();
    }
}
