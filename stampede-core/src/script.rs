//! The contract between the engine and whatever actually runs user logic.
//!
//! Call order is fixed: [`Script::register_metrics`] once, [`Script::init_vu`] for every
//! pre-allocated VU, [`Script::setup`] once, [`ScriptVu::iteration`] once per dispatched
//! iteration, and [`Script::teardown`] once after every executor finished.

use std::future::Future;
use std::sync::Arc;

use stampede_metrics::Registry;

use crate::vu::{IterationContext, LifecycleContext};

/// Value returned by `setup`, shared read-only with every iteration and with `teardown`.
pub type SetupData = Arc<serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
    abort: bool,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            abort: false,
        }
    }

    /// Error that also requests the whole run to stop.
    pub fn abort(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            abort: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_abort(&self) -> bool {
        self.abort
    }
}

/// Identity of a VU being created.
#[derive(Debug, Clone)]
pub struct VuInit {
    /// Run-wide id, starting at 1.
    pub id: u64,
    /// 1-based index inside the scenario.
    pub scenario_vu: u64,
    pub scenario: Arc<str>,
    pub exec: Arc<str>,
}

pub trait Script: Send + Sync + 'static {
    type Vu: ScriptVu;

    /// Declare custom metrics before thresholds are validated.
    fn register_metrics(&self, _registry: &Registry) -> stampede_metrics::Result<()> {
        Ok(())
    }

    fn setup(
        &self,
        _ctx: &LifecycleContext,
    ) -> impl Future<Output = Result<serde_json::Value, ScriptError>> + Send {
        async { Ok(serde_json::Value::Null) }
    }

    /// Create a VU. Expensive one-time work belongs here; it survives across iterations.
    fn init_vu(&self, vu: VuInit) -> impl Future<Output = Result<Self::Vu, ScriptError>> + Send;

    fn teardown(
        &self,
        _ctx: &LifecycleContext,
        _data: SetupData,
    ) -> impl Future<Output = Result<(), ScriptError>> + Send {
        async { Ok(()) }
    }
}

pub trait ScriptVu: Send + 'static {
    fn iteration(
        &mut self,
        ctx: &IterationContext,
    ) -> impl Future<Output = Result<(), ScriptError>> + Send;

    /// Drop per-iteration state before the VU goes back to the pool.
    fn reset(&mut self) {}
}
