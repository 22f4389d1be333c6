use std::sync::Arc;

use stampede_metrics::{MetricId, MetricKind, Registry};
use tokio_util::sync::CancellationToken;

use crate::metrics_context::MetricsContext;
use crate::script::SetupData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VuState {
    Idle,
    Active,
    /// The last iteration was cut short; cleared when the VU is returned to its pool.
    Interrupted,
}

/// A reusable execution slot. Owned by exactly one place at a time: the pool while idle,
/// the iteration task while active.
#[derive(Debug)]
pub struct Vu<V> {
    pub(crate) id: u64,
    pub(crate) scenario_vu: u64,
    pub(crate) state: VuState,
    /// Iterations dispatched to this VU so far.
    pub(crate) iterations: u64,
    pub(crate) inner: V,
}

impl<V> Vu<V> {
    pub fn new(id: u64, scenario_vu: u64, inner: V) -> Self {
        Self {
            id,
            scenario_vu,
            state: VuState::Idle,
            iterations: 0,
            inner,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scenario_vu(&self) -> u64 {
        self.scenario_vu
    }

    pub fn state(&self) -> VuState {
        self.state
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }
}

/// What an iteration can see and do.
#[derive(Debug, Clone)]
pub struct IterationContext {
    pub(crate) metrics: MetricsContext,
    pub(crate) scenario: Arc<str>,
    pub(crate) exec: Arc<str>,
    pub(crate) vu_id: u64,
    pub(crate) scenario_vu: u64,
    pub(crate) iteration: u64,
    pub(crate) scenario_iteration: u64,
    pub(crate) setup_data: SetupData,
    pub(crate) interrupt: CancellationToken,
}

impl IterationContext {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn exec(&self) -> &str {
        &self.exec
    }

    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    pub fn scenario_vu(&self) -> u64 {
        self.scenario_vu
    }

    /// 0-based iteration index on this VU.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// 0-based iteration index across the scenario.
    pub fn scenario_iteration(&self) -> u64 {
        self.scenario_iteration
    }

    pub fn setup_data(&self) -> &serde_json::Value {
        &self.setup_data
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.metrics.registry()
    }

    pub async fn emit(
        &self,
        metric: MetricId,
        value: f64,
        tags: &[(&str, &str)],
    ) -> stampede_metrics::Result<()> {
        self.metrics.emit(metric, value, tags).await
    }

    pub async fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        tags: &[(&str, &str)],
    ) -> stampede_metrics::Result<()> {
        self.metrics.record(name, kind, value, tags).await
    }

    /// Forward script output with provenance; formatting and routing belong to the
    /// subscriber.
    pub fn log(&self, message: &str) {
        tracing::info!(
            target: "stampede::script",
            scenario = %self.scenario,
            vu = self.vu_id,
            iteration = self.iteration,
            "{message}"
        );
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Resolves when the engine interrupts this iteration.
    pub async fn interrupted(&self) {
        self.interrupt.cancelled().await;
    }
}

/// Context for `setup` and `teardown`, which run outside any scenario.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    pub(crate) metrics: MetricsContext,
    pub(crate) stage: &'static str,
}

impl LifecycleContext {
    pub(crate) fn new(metrics: MetricsContext, stage: &'static str) -> Self {
        Self { metrics, stage }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.metrics.registry()
    }

    pub async fn emit(
        &self,
        metric: MetricId,
        value: f64,
        tags: &[(&str, &str)],
    ) -> stampede_metrics::Result<()> {
        self.metrics.emit(metric, value, tags).await
    }

    pub async fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        tags: &[(&str, &str)],
    ) -> stampede_metrics::Result<()> {
        self.metrics.record(name, kind, value, tags).await
    }

    pub fn log(&self, message: &str) {
        tracing::info!(target: "stampede::script", stage = self.stage, "{message}");
    }
}
