use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::builtin_metrics::BuiltinMetrics;
use crate::script::{ScriptError, ScriptVu};
use crate::vu::{IterationContext, Vu, VuState};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum InterruptCause {
    /// The iteration exceeded the scenario's iteration timeout.
    Timeout,
    /// Still running when the graceful-stop window closed.
    GracefulStop,
    /// Still running when the graceful ramp-down window closed.
    RampDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed,
    Failed(ScriptError),
    Interrupted(InterruptCause),
}

impl IterationOutcome {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

/// Executor-side handle used to cut one iteration short.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    token: CancellationToken,
    cause: Arc<OnceLock<InterruptCause>>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// First cause wins.
    pub fn interrupt(&self, cause: InterruptCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn cause(&self) -> InterruptCause {
        self.cause
            .get()
            .copied()
            .unwrap_or(InterruptCause::GracefulStop)
    }
}

#[derive(Debug)]
pub struct IterationReport<V> {
    pub vu: Vu<V>,
    pub outcome: IterationOutcome,
    pub duration: Duration,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one iteration on `vu` and emit its outcome samples.
///
/// The VU always comes back, whatever happened: completion, script error, panic, timeout or
/// interrupt.
pub async fn run_iteration<V: ScriptVu>(
    mut vu: Vu<V>,
    ctx: IterationContext,
    interrupt: InterruptHandle,
    timeout: Option<Duration>,
    builtin: BuiltinMetrics,
) -> IterationReport<V> {
    let started = Instant::now();

    let outcome = {
        let run = AssertUnwindSafe(vu.inner.iteration(&ctx)).catch_unwind();
        let timeout_sleep = async {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = interrupt.token().cancelled() => IterationOutcome::Interrupted(interrupt.cause()),
            _ = timeout_sleep => {
                interrupt.interrupt(InterruptCause::Timeout);
                IterationOutcome::Interrupted(InterruptCause::Timeout)
            }
            res = run => match res {
                Ok(Ok(())) => IterationOutcome::Completed,
                Ok(Err(err)) => IterationOutcome::Failed(err),
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    tracing::warn!(scenario = ctx.scenario(), vu = ctx.vu_id(), panic = %msg, "iteration panicked");
                    IterationOutcome::Failed(ScriptError::new(format!("panic: {msg}")))
                }
            },
        }
    };

    let duration = started.elapsed();
    if outcome.is_interrupted() {
        vu.state = VuState::Interrupted;
    }

    match &outcome {
        IterationOutcome::Failed(err) => {
            tracing::debug!(scenario = ctx.scenario(), vu = ctx.vu_id(), error = %err, "iteration failed");
        }
        IterationOutcome::Interrupted(cause) => {
            tracing::debug!(scenario = ctx.scenario(), vu = ctx.vu_id(), %cause, "iteration interrupted");
        }
        IterationOutcome::Completed => {}
    }

    if let Err(err) = builtin
        .record_outcome(&ctx.metrics, &outcome, duration)
        .await
    {
        tracing::debug!(error = %err, "dropping iteration samples");
    }

    IterationReport {
        vu,
        outcome,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics_context::MetricsContext;
    use stampede_metrics::{Registry, SampleReceiver, sample_bus};

    struct SleepyVu {
        sleep: Duration,
        fail: bool,
    }

    impl ScriptVu for SleepyVu {
        async fn iteration(&mut self, _ctx: &IterationContext) -> Result<(), ScriptError> {
            tokio::time::sleep(self.sleep).await;
            if self.fail {
                return Err(ScriptError::new("boom"));
            }
            Ok(())
        }
    }

    struct PanickyVu;

    impl ScriptVu for PanickyVu {
        async fn iteration(&mut self, _ctx: &IterationContext) -> Result<(), ScriptError> {
            panic!("script bug");
        }
    }

    fn context(interrupt: &InterruptHandle) -> (IterationContext, BuiltinMetrics, SampleReceiver) {
        let registry = Arc::new(Registry::default());
        let builtin = BuiltinMetrics::register(&registry).unwrap_or_else(|e| panic!("{e}"));
        let (tx, rx) = sample_bus(64);
        let ctx = IterationContext {
            metrics: MetricsContext::for_scenario(registry.clone(), tx, Arc::from("sc"), &[]),
            scenario: Arc::from("sc"),
            exec: Arc::from("default"),
            vu_id: 1,
            scenario_vu: 1,
            iteration: 0,
            scenario_iteration: 0,
            setup_data: Arc::new(serde_json::Value::Null),
            interrupt: interrupt.token().clone(),
        };
        (ctx, builtin, rx)
    }

    #[tokio::test]
    async fn completed_and_failed_outcomes() {
        let handle = InterruptHandle::new();
        let (ctx, builtin, _rx) = context(&handle);
        let vu = Vu::new(1, 1, SleepyVu { sleep: Duration::ZERO, fail: false });
        let report = run_iteration(vu, ctx.clone(), handle, None, builtin).await;
        assert_eq!(report.outcome, IterationOutcome::Completed);

        let handle = InterruptHandle::new();
        let vu = Vu::new(1, 1, SleepyVu { sleep: Duration::ZERO, fail: true });
        let report = run_iteration(vu, ctx, handle, None, builtin).await;
        assert_eq!(report.outcome, IterationOutcome::Failed(ScriptError::new("boom")));
        assert_eq!(report.vu.state(), VuState::Idle);
    }

    #[tokio::test]
    async fn timeout_interrupts_and_returns_vu() {
        let handle = InterruptHandle::new();
        let (ctx, builtin, _rx) = context(&handle);
        let vu = Vu::new(1, 1, SleepyVu { sleep: Duration::from_secs(10), fail: false });

        let report = run_iteration(
            vu,
            ctx,
            handle,
            Some(Duration::from_millis(20)),
            builtin,
        )
        .await;
        assert_eq!(
            report.outcome,
            IterationOutcome::Interrupted(InterruptCause::Timeout)
        );
        assert_eq!(report.vu.state(), VuState::Interrupted);
        assert!(report.duration < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn interrupt_carries_cause() {
        let handle = InterruptHandle::new();
        let (ctx, builtin, _rx) = context(&handle);
        let vu = Vu::new(1, 1, SleepyVu { sleep: Duration::from_secs(10), fail: false });

        let task = tokio::spawn(run_iteration(vu, ctx, handle.clone(), None, builtin));
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.interrupt(InterruptCause::RampDown);

        let report = task.await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            report.outcome,
            IterationOutcome::Interrupted(InterruptCause::RampDown)
        );
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let handle = InterruptHandle::new();
        let (ctx, builtin, _rx) = context(&handle);
        let report = run_iteration(Vu::new(1, 1, PanickyVu), ctx, handle, None, builtin).await;
        match report.outcome {
            IterationOutcome::Failed(err) => assert!(err.message().contains("script bug")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
