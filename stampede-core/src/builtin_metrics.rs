use stampede_metrics::{MetricId, MetricKind, Registry};

use crate::iteration::IterationOutcome;
use crate::metrics_context::MetricsContext;

pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATION_ERRORS: &str = "iteration_errors";
pub const INTERRUPTED_ITERATIONS: &str = "interrupted_iterations";
pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

#[derive(Debug, Clone, Copy)]
pub struct BuiltinMetrics {
    pub iterations: MetricId,
    /// Milliseconds.
    pub iteration_duration: MetricId,
    pub iteration_errors: MetricId,
    pub interrupted_iterations: MetricId,
    pub dropped_iterations: MetricId,
    pub vus: MetricId,
    pub vus_max: MetricId,
}

impl BuiltinMetrics {
    pub fn register(registry: &Registry) -> stampede_metrics::Result<Self> {
        Ok(Self {
            iterations: registry.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: registry.register(ITERATION_DURATION, MetricKind::Trend)?,
            iteration_errors: registry.register(ITERATION_ERRORS, MetricKind::Counter)?,
            interrupted_iterations: registry
                .register(INTERRUPTED_ITERATIONS, MetricKind::Counter)?,
            dropped_iterations: registry.register(DROPPED_ITERATIONS, MetricKind::Counter)?,
            vus: registry.register(VUS, MetricKind::Gauge)?,
            vus_max: registry.register(VUS_MAX, MetricKind::Gauge)?,
        })
    }

    /// Emit the samples describing how one iteration ended.
    pub async fn record_outcome(
        &self,
        metrics: &MetricsContext,
        outcome: &IterationOutcome,
        duration: std::time::Duration,
    ) -> stampede_metrics::Result<()> {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        match outcome {
            IterationOutcome::Completed => {
                metrics.emit(self.iteration_duration, duration_ms, &[]).await?;
                metrics.emit(self.iterations, 1.0, &[]).await
            }
            IterationOutcome::Failed(err) => {
                metrics
                    .emit(self.iteration_errors, 1.0, &[("error", err.message())])
                    .await?;
                metrics.emit(self.iteration_duration, duration_ms, &[]).await?;
                metrics.emit(self.iterations, 1.0, &[]).await
            }
            IterationOutcome::Interrupted(cause) => {
                metrics
                    .emit(self.interrupted_iterations, 1.0, &[("cause", cause.into())])
                    .await
            }
        }
    }
}
