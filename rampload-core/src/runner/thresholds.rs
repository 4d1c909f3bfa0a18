use rampload_metrics::{MetricSummary, MetricValues};

use super::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    /// Percentile in `[0, 100]`.
    P(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// A pass/fail condition on one metric, e.g. `http_req_duration: p(95)<5000`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: String,
    /// The expression as written by the user.
    pub expression: String,
    pub expr: ThresholdExpr,
}

impl ThresholdSpec {
    pub fn parse(metric: impl Into<String>, expression: impl Into<String>) -> Result<Self> {
        let metric = metric.into();
        let expression = expression.into();
        if metric.trim().is_empty() {
            return Err(Error::InvalidThreshold {
                metric,
                error: "empty metric name".to_string(),
            });
        }
        let expr = parse_threshold_expr(&expression).map_err(|error| Error::InvalidThreshold {
            metric: metric.clone(),
            error,
        })?;
        Ok(Self {
            metric,
            expression: expression.trim().to_string(),
            expr,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdOutcome {
    pub spec: ThresholdSpec,
    /// Aggregated value the expression was checked against; `None` when the metric is
    /// missing, empty, or the aggregation does not apply to its kind.
    pub observed: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdReport {
    pub outcomes: Vec<ThresholdOutcome>,
}

impl ThresholdReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}` in threshold: {raw}"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(format!("percentile out of range in threshold: {raw}"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value in threshold: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

pub fn evaluate_thresholds(specs: &[ThresholdSpec], metrics: &[MetricSummary]) -> ThresholdReport {
    let outcomes = specs
        .iter()
        .map(|spec| {
            let observed = metrics
                .iter()
                .find(|m| m.name == spec.metric)
                .and_then(|m| observed_value(&m.values, spec.expr.agg));
            let passed = observed
                .map(|v| compare(v, spec.expr.op, spec.expr.value))
                .unwrap_or(false);
            ThresholdOutcome {
                spec: spec.clone(),
                observed,
                passed,
            }
        })
        .collect();
    ThresholdReport { outcomes }
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
        ThresholdOp::Eq => left == right,
        ThresholdOp::Ne => left != right,
    }
}

fn observed_value(values: &MetricValues, agg: ThresholdAgg) -> Option<f64> {
    if !values.has_data() {
        return None;
    }

    match (values, agg) {
        (MetricValues::Trend(t), ThresholdAgg::Avg) => Some(t.mean()),
        (MetricValues::Trend(t), ThresholdAgg::Min) => Some(t.min()),
        (MetricValues::Trend(t), ThresholdAgg::Max) => Some(t.max()),
        (MetricValues::Trend(t), ThresholdAgg::Med) => Some(t.med()),
        (MetricValues::Trend(t), ThresholdAgg::Count) => Some(t.count() as f64),
        (MetricValues::Trend(t), ThresholdAgg::P(p)) => Some(t.percentile(p)),

        (MetricValues::Rate { rate, .. }, ThresholdAgg::Rate) => Some(*rate),
        (MetricValues::Rate { total, .. }, ThresholdAgg::Count) => Some(*total as f64),

        (MetricValues::Counter { total }, ThresholdAgg::Count | ThresholdAgg::Value) => {
            Some(*total as f64)
        }

        (MetricValues::Gauge { value, .. }, ThresholdAgg::Value) => Some(*value),
        (MetricValues::Gauge { max, .. }, ThresholdAgg::Max) => Some(*max),

        (_, _) => None,
    }
}
