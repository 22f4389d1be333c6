use std::fmt;
use std::time::Duration;

use stampede_metrics::{MetricKind, Registry, Selector};

use crate::config::ThresholdSetOptions;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Lte,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Gte,
    #[strum(to_string = "==")]
    Eq,
    #[strum(to_string = "===")]
    StrictEq,
    #[strum(to_string = "!=")]
    NotEq,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, expected: f64) -> bool {
        match self {
            ThresholdOp::Lt => observed < expected,
            ThresholdOp::Lte => observed <= expected,
            ThresholdOp::Gt => observed > expected,
            ThresholdOp::Gte => observed >= expected,
            ThresholdOp::Eq | ThresholdOp::StrictEq => observed == expected,
            ThresholdOp::NotEq => observed != expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Count,
    Rate,
    Value,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `(0, 100]`.
    P(f64),
}

impl ThresholdAgg {
    pub fn valid_for(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
            MetricKind::Gauge => matches!(self, Self::Value | Self::Min | Self::Max),
            MetricKind::Rate => matches!(self, Self::Rate),
            MetricKind::Trend => matches!(
                self,
                Self::Avg | Self::Min | Self::Max | Self::Med | Self::P(_)
            ),
        }
    }
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Value => f.write_str("value"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl ThresholdExpr {
    pub fn passes(&self, observed: f64) -> bool {
        self.op.compare(observed, self.value)
    }
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Longer tokens first so `<=` is not read as `<`.
    let ops = [
        ("===", ThresholdOp::StrictEq),
        ("!=", ThresholdOp::NotEq),
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| "missing operator".to_string())?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err("expected `<aggregation> <operator> <number>`".to_string());
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        other => {
            let Some(inner) = other.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) else {
                return Err(format!("unknown aggregation `{left}`"));
            };
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}`"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile `{inner}` out of range (0, 100]"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value `{right}`"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value `{right}`"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

#[derive(Debug, Clone)]
pub struct Threshold {
    /// Expression as written by the user; used as the result key.
    pub source: String,
    pub expr: ThresholdExpr,
    pub abort_on_fail: bool,
    pub delay_abort_eval: Duration,
}

/// Thresholds sharing a selector. The set passes when every threshold passes.
#[derive(Debug, Clone)]
pub struct ThresholdSet {
    pub selector: Selector,
    pub thresholds: Vec<Threshold>,
}

/// Parse every selector and expression. Sets whose selectors normalise to the same
/// submetric are merged.
pub fn parse_threshold_sets(options: &[ThresholdSetOptions]) -> Result<Vec<ThresholdSet>> {
    let mut out: Vec<ThresholdSet> = Vec::with_capacity(options.len());

    for opt in options {
        let selector = Selector::parse(&opt.selector).map_err(|e| Error::InvalidThreshold {
            selector: opt.selector.clone(),
            expression: String::new(),
            reason: e.to_string(),
        })?;

        let mut thresholds = Vec::with_capacity(opt.thresholds.len());
        for t in &opt.thresholds {
            let expr =
                parse_threshold_expr(&t.expression).map_err(|reason| Error::InvalidThreshold {
                    selector: opt.selector.clone(),
                    expression: t.expression.clone(),
                    reason,
                })?;
            thresholds.push(Threshold {
                source: t.expression.trim().to_string(),
                expr,
                abort_on_fail: t.abort_on_fail,
                delay_abort_eval: t.delay_abort_eval.unwrap_or(Duration::ZERO),
            });
        }

        match out.iter_mut().find(|s| s.selector == selector) {
            Some(existing) => existing.thresholds.extend(thresholds),
            None => out.push(ThresholdSet {
                selector,
                thresholds,
            }),
        }
    }

    Ok(out)
}

/// Reject aggregations that cannot apply to metrics already registered. Metrics that
/// appear later are checked at evaluation time and simply fail.
pub fn validate_threshold_kinds(sets: &[ThresholdSet], registry: &Registry) -> Result<()> {
    for set in sets {
        let Some((_, kind)) = registry.lookup(&set.selector.metric) else {
            continue;
        };
        for t in &set.thresholds {
            if !t.expr.agg.valid_for(kind) {
                return Err(Error::InvalidThreshold {
                    selector: set.selector.to_string(),
                    expression: t.source.clone(),
                    reason: format!("`{}` is not available on {kind} metrics", t.expr.agg),
                });
            }
        }
    }
    Ok(())
}
