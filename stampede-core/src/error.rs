pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Metrics(#[from] stampede_metrics::Error),

    #[error("invalid scenario name `{0}` (expected [0-9A-Za-z_-]+)")]
    InvalidScenarioName(String),

    #[error("duplicate scenario `{0}`")]
    DuplicateScenario(String),

    #[error(
        "scenario `{scenario}`: unknown executor `{executor}` (expected `per-vu-iterations`, `shared-iterations`, `constant-vus`, `ramping-vus`, `constant-arrival-rate`, `ramping-arrival-rate`, or `externally-controlled`)"
    )]
    UnknownExecutor { scenario: String, executor: String },

    #[error("scenario `{scenario}`: {reason}")]
    InvalidScenario { scenario: String, reason: String },

    #[error("invalid threshold `{expression}` on `{selector}`: {reason}")]
    InvalidThreshold {
        selector: String,
        expression: String,
        reason: String,
    },

    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),

    #[error("scenario `{0}` is not externally controlled")]
    NotExternallyControlled(String),

    #[error("external update for scenario `{scenario}` rejected: {reason}")]
    InvalidExternalUpdate { scenario: String, reason: String },

    #[error("scenario `{scenario}`: failed to initialize VU {vu}: {message}")]
    VuInit {
        scenario: String,
        vu: u64,
        message: String,
    },

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn scenario(scenario: &str, reason: impl Into<String>) -> Self {
        Self::InvalidScenario {
            scenario: scenario.to_string(),
            reason: reason.into(),
        }
    }

    /// Invalid scenario or threshold input, detected before any executor starts.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Metrics(_)
                | Self::InvalidScenarioName(_)
                | Self::DuplicateScenario(_)
                | Self::UnknownExecutor { .. }
                | Self::InvalidScenario { .. }
                | Self::InvalidThreshold { .. }
        )
    }
}
