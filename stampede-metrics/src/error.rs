use crate::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid metric name `{0}` (1-128 chars of [A-Za-z0-9_.-], not starting with a digit)")]
    InvalidMetricName(String),

    #[error("metric `{name}` is already registered as {existing}, cannot re-register as {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("invalid metric selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("sample bus closed")]
    BusClosed,
}
