/// Metric type; decides how a sink folds samples.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MetricKind {
    /// Cumulative sum.
    Counter,
    /// Last observed value.
    Gauge,
    /// Share of non-zero samples.
    Rate,
    /// Full distribution (min/max/avg/percentiles).
    Trend,
}
