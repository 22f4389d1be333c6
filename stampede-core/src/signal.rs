use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why a run was stopped before its executors finished on their own.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
pub enum StopReason {
    #[strum(to_string = "threshold `{selector}: {expression}` failed with abortOnFail")]
    ThresholdAbort {
        selector: String,
        expression: String,
    },

    #[strum(to_string = "scenario `{scenario}` aborted: {message}")]
    ScriptAbort { scenario: String, message: String },

    #[strum(to_string = "stopped externally")]
    External,
}

/// Run-scoped stop signal. The first reason recorded wins; later ones are ignored.
#[derive(Debug, Clone, Default)]
pub struct RunSignals {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self, reason: StopReason) {
        if self.reason.set(reason.clone()).is_ok() {
            tracing::info!(%reason, "run stopping");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<&StopReason> {
        self.reason.get()
    }

    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Token cancelled with the run; scenarios derive their own tokens from it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
