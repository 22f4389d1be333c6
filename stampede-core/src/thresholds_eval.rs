use std::time::Duration;

use serde::Serialize;
use stampede_metrics::Sink;

use crate::thresholds::{ThresholdAgg, ThresholdSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub expression: String,
    pub ok: bool,
    /// `None` when the metric was never registered or the aggregation does not apply.
    pub observed: Option<f64>,
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSetResult {
    pub selector: String,
    pub ok: bool,
    pub thresholds: Vec<ThresholdResult>,
}

/// Read one statistic from a sink. Empty sinks report 0.
pub fn observed_value(sink: &Sink, agg: ThresholdAgg, run_elapsed: Duration) -> Option<f64> {
    match (sink, agg) {
        (Sink::Counter(s), ThresholdAgg::Count) => Some(s.sum),
        (Sink::Counter(s), ThresholdAgg::Rate) => Some(s.rate(run_elapsed)),

        (Sink::Gauge(s), ThresholdAgg::Value) => Some(s.last),
        (Sink::Gauge(s), ThresholdAgg::Min) => Some(s.min),
        (Sink::Gauge(s), ThresholdAgg::Max) => Some(s.max),

        (Sink::Rate(s), ThresholdAgg::Rate) => Some(s.rate()),

        (Sink::Trend(s), ThresholdAgg::Avg) => Some(s.avg()),
        (Sink::Trend(s), ThresholdAgg::Min) => Some(s.min()),
        (Sink::Trend(s), ThresholdAgg::Max) => Some(s.max()),
        (Sink::Trend(s), ThresholdAgg::Med) => Some(s.med()),
        (Sink::Trend(s), ThresholdAgg::P(p)) => Some(s.percentile(p)),

        _ => None,
    }
}

/// Evaluate every expression of `set`. `sink` is `None` when the metric does not exist,
/// which fails every expression.
pub fn evaluate_set(
    set: &ThresholdSet,
    sink: Option<&Sink>,
    run_elapsed: Duration,
) -> ThresholdSetResult {
    let thresholds: Vec<ThresholdResult> = set
        .thresholds
        .iter()
        .map(|t| {
            let observed = sink.and_then(|s| observed_value(s, t.expr.agg, run_elapsed));
            ThresholdResult {
                expression: t.source.clone(),
                ok: observed.is_some_and(|v| t.expr.passes(v)),
                observed,
                abort_on_fail: t.abort_on_fail,
            }
        })
        .collect();

    ThresholdSetResult {
        selector: set.selector.to_string(),
        ok: thresholds.iter().all(|t| t.ok),
        thresholds,
    }
}

/// The first failing `abortOnFail` threshold whose grace period has passed.
pub fn abort_trigger<'a>(
    sets: &'a [ThresholdSet],
    results: &'a [ThresholdSetResult],
    run_elapsed: Duration,
) -> Option<(&'a str, &'a str)> {
    for (set, result) in sets.iter().zip(results) {
        for (t, r) in set.thresholds.iter().zip(&result.thresholds) {
            if t.abort_on_fail && !r.ok && run_elapsed >= t.delay_abort_eval {
                return Some((result.selector.as_str(), r.expression.as_str()));
            }
        }
    }
    None
}
