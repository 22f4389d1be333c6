//! Scenario executors.
//!
//! Every executor is one control loop that owns its scenario's [`VuPool`]. The loop decides
//! when an idle VU starts an iteration; iterations run as separate tasks and hand the VU
//! back through a `JoinSet`. Cancellation of the scenario token moves the loop into
//! graceful stop, which waits for in-flight iterations up to `graceful_stop` and then
//! interrupts the rest.

mod arrival_rate;
mod constant_vus;
mod dispatch;
mod external;
mod iterations;
mod ramping_vus;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::builtin_metrics::BuiltinMetrics;
use crate::clock::RunClock;
use crate::metrics_context::MetricsContext;
use crate::plan::{ExecutorConfig, ScenarioConfig};
use crate::pool::VuPool;
use crate::schedule::{ArrivalSchedule, RampingSchedule};
use crate::script::{Script, SetupData};
use crate::signal::RunSignals;

pub(crate) use dispatch::{Dispatcher, warm_pool};
pub use external::{ExternalParams, ExternalUpdate};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display, strum::FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutorState {
    #[default]
    NotStarted,
    /// Waiting for `start_time`.
    Starting,
    Running,
    GracefulStop,
    Stopped,
}

/// Live counters of one executor, shared with the controller handle.
#[derive(Debug, Default)]
pub struct ExecutorProgress {
    state: AtomicU8,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    interrupted: AtomicU64,
    dropped: AtomicU64,
    active: AtomicU64,
    allocated: AtomicU64,
}

impl ExecutorProgress {
    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_repr(self.state.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub(crate) fn set_state(&self, state: ExecutorState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub(crate) fn set_allocated(&self, n: u64) {
        self.allocated.store(n, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ScenarioProgress {
        ScenarioProgress {
            state: self.state(),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            active: self.active(),
            allocated: self.allocated(),
        }
    }
}

/// Point-in-time view of [`ExecutorProgress`]; also the final outcome of an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScenarioProgress {
    pub state: ExecutorState,
    /// Iterations dispatched.
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub interrupted: u64,
    /// Arrival-rate iterations that found no idle VU.
    pub dropped: u64,
    /// VUs currently running an iteration.
    pub active: u64,
    /// VUs initialised and held by the pool.
    pub allocated: u64,
}

impl ScenarioProgress {
    /// Iterations that ran to an end, successfully or not.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Shared state handed to one executor loop.
pub(crate) struct ExecutorContext<S: Script> {
    pub scenario: Arc<ScenarioConfig>,
    pub script: Arc<S>,
    pub clock: RunClock,
    /// Scenario-scoped token, a child of the run token.
    pub stop: CancellationToken,
    pub signals: RunSignals,
    pub metrics: MetricsContext,
    pub builtin: BuiltinMetrics,
    pub setup_data: SetupData,
    pub progress: Arc<ExecutorProgress>,
    /// Run-wide VU id source.
    pub vu_ids: Arc<AtomicU64>,
}

/// Run the scenario's control loop to completion, including graceful stop.
pub(crate) async fn run_executor<S: Script>(
    ctx: ExecutorContext<S>,
    pool: VuPool<S::Vu>,
    external: Option<watch::Receiver<ExternalParams>>,
) -> ScenarioProgress {
    let executor = ctx.scenario.executor.clone();
    let name = ctx.scenario.name.clone();
    let mut d = Dispatcher::new(ctx, pool);
    d.set_state(ExecutorState::Running);
    tracing::debug!(scenario = %name, executor = %executor.kind(), "executor running");

    match executor {
        ExecutorConfig::PerVuIterations {
            iterations,
            max_duration,
            ..
        } => iterations::run_per_vu(&mut d, iterations, max_duration).await,
        ExecutorConfig::SharedIterations {
            iterations,
            max_duration,
            ..
        } => iterations::run_shared(&mut d, iterations, max_duration).await,
        ExecutorConfig::ConstantVus { duration, .. } => {
            constant_vus::run(&mut d, duration).await;
        }
        ExecutorConfig::RampingVus {
            start_vus,
            stages,
            graceful_ramp_down,
        } => {
            let schedule = RampingSchedule::new(start_vus, stages);
            ramping_vus::run(&mut d, &schedule, graceful_ramp_down).await;
        }
        ExecutorConfig::ConstantArrivalRate {
            rate,
            time_unit,
            duration,
            ..
        } => {
            let schedule = ArrivalSchedule::constant(rate, time_unit, duration);
            arrival_rate::run(&mut d, &schedule).await;
        }
        ExecutorConfig::RampingArrivalRate {
            start_rate,
            time_unit,
            stages,
            ..
        } => {
            let schedule = ArrivalSchedule::ramping(start_rate, time_unit, stages);
            arrival_rate::run(&mut d, &schedule).await;
        }
        ExecutorConfig::ExternallyControlled {
            vus,
            max_vus,
            duration,
        } => {
            let rx = match external {
                Some(rx) => rx,
                None => watch::channel(ExternalParams {
                    vus,
                    max_vus,
                    duration,
                })
                .1,
            };
            external::run(&mut d, rx).await;
        }
    }

    d.graceful_stop().await;
    let progress = d.finish().await;
    tracing::debug!(
        scenario = %name,
        started = progress.started,
        completed = progress.completed,
        failed = progress.failed,
        interrupted = progress.interrupted,
        dropped = progress.dropped,
        "executor stopped"
    );
    progress
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_atomic() {
        let progress = ExecutorProgress::default();
        assert_eq!(progress.state(), ExecutorState::NotStarted);
        progress.set_state(ExecutorState::GracefulStop);
        assert_eq!(progress.state(), ExecutorState::GracefulStop);
        assert_eq!(progress.snapshot().state.to_string(), "graceful_stop");
    }
}
