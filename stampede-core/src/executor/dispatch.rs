use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use tokio::task::{JoinError, JoinSet};

use super::{ExecutorContext, ExecutorState, ScenarioProgress};
use crate::clock::RunClock;
use crate::error::{Error, Result};
use crate::iteration::{
    InterruptCause, InterruptHandle, IterationOutcome, IterationReport, run_iteration,
};
use crate::plan::ScenarioConfig;
use crate::pool::VuPool;
use crate::script::{Script, ScriptError, VuInit};
use crate::signal::StopReason;
use crate::vu::{IterationContext, Vu};

type InitResult<V> = (u64, u64, std::result::Result<V, ScriptError>);

pub(crate) enum Event<V> {
    Finished(IterationReport<V>),
    Initialized(InitResult<V>),
}

/// Initialise the VUs a scenario starts with. Any failure fails the whole warm-up.
pub(crate) async fn warm_pool<S: Script>(
    script: &Arc<S>,
    scenario: &ScenarioConfig,
    vu_ids: &AtomicU64,
) -> Result<VuPool<S::Vu>> {
    let mut pool = VuPool::new(scenario.executor.max_vus());

    let inits = (1..=scenario.executor.initial_vus()).map(|scenario_vu| {
        let id = vu_ids.fetch_add(1, Ordering::Relaxed);
        let init = VuInit {
            id,
            scenario_vu,
            scenario: scenario.name.clone(),
            exec: scenario.exec.clone(),
        };
        async move { (id, scenario_vu, script.init_vu(init).await) }
    });

    for (id, scenario_vu, res) in futures::future::join_all(inits).await {
        let inner = res.map_err(|err| Error::VuInit {
            scenario: scenario.name.to_string(),
            vu: id,
            message: err.message().to_string(),
        })?;
        pool.add(Vu::new(id, scenario_vu, inner));
    }

    tracing::debug!(scenario = %scenario.name, vus = pool.allocated(), "vu pool ready");
    Ok(pool)
}

struct Inflight {
    scenario_vu: u64,
    task: tokio::task::Id,
    interrupt: InterruptHandle,
}

/// The part of an executor that is the same for every kind: borrowing VUs, spawning
/// iterations, reclaiming VUs, growing the pool and graceful stop. Executor loops only
/// decide *when* to dispatch.
pub(crate) struct Dispatcher<S: Script> {
    ctx: ExecutorContext<S>,
    pool: VuPool<S::Vu>,
    inflight: JoinSet<IterationReport<S::Vu>>,
    running: AHashMap<u64, Inflight>,
    inits: JoinSet<InitResult<S::Vu>>,
    next_scenario_vu: u64,
    next_iteration: u64,
    unsent_dropped: u64,
    warned_capacity: bool,
}

impl<S: Script> Dispatcher<S> {
    pub(crate) fn new(ctx: ExecutorContext<S>, pool: VuPool<S::Vu>) -> Self {
        ctx.progress.set_allocated(pool.allocated());
        Self {
            next_scenario_vu: pool.allocated() + 1,
            ctx,
            pool,
            inflight: JoinSet::new(),
            running: AHashMap::new(),
            inits: JoinSet::new(),
            next_iteration: 0,
            unsent_dropped: 0,
            warned_capacity: false,
        }
    }

    pub(crate) fn clock(&self) -> &RunClock {
        &self.ctx.clock
    }

    pub(crate) fn stop_token(&self) -> &tokio_util::sync::CancellationToken {
        &self.ctx.stop
    }

    pub(crate) fn scenario_name(&self) -> &str {
        &self.ctx.scenario.name
    }

    pub(crate) fn set_state(&self, state: ExecutorState) {
        self.ctx.progress.set_state(state);
    }

    pub(crate) fn pool(&self) -> &VuPool<S::Vu> {
        &self.pool
    }

    pub(crate) fn set_max_vus(&mut self, max: u64) {
        self.pool.set_max(max);
    }

    pub(crate) fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// `(vu id, scenario vu)` of every VU currently running an iteration.
    pub(crate) fn inflight_vus(&self) -> Vec<(u64, u64)> {
        self.running
            .iter()
            .map(|(id, r)| (*id, r.scenario_vu))
            .collect()
    }

    pub(crate) fn borrow(&mut self) -> Option<Vu<S::Vu>> {
        self.pool.try_borrow()
    }

    pub(crate) fn borrow_where(&mut self, pred: impl Fn(&Vu<S::Vu>) -> bool) -> Option<Vu<S::Vu>> {
        self.pool.try_borrow_where(pred)
    }

    /// Start one iteration on `vu`.
    pub(crate) fn dispatch(&mut self, mut vu: Vu<S::Vu>) {
        let iteration = vu.iterations;
        vu.iterations += 1;
        let scenario_iteration = self.next_iteration;
        self.next_iteration += 1;

        let interrupt = InterruptHandle::new();
        let scenario = &self.ctx.scenario;
        let ctx = IterationContext {
            metrics: self.ctx.metrics.clone(),
            scenario: scenario.name.clone(),
            exec: scenario.exec.clone(),
            vu_id: vu.id,
            scenario_vu: vu.scenario_vu,
            iteration,
            scenario_iteration,
            setup_data: self.ctx.setup_data.clone(),
            interrupt: interrupt.token().clone(),
        };

        let vu_id = vu.id;
        let scenario_vu = vu.scenario_vu;
        let abort = self.inflight.spawn(run_iteration(
            vu,
            ctx,
            interrupt.clone(),
            scenario.iteration_timeout,
            self.ctx.builtin,
        ));
        self.running.insert(
            vu_id,
            Inflight {
                scenario_vu,
                task: abort.id(),
                interrupt,
            },
        );

        let progress = &self.ctx.progress;
        progress.started.fetch_add(1, Ordering::Relaxed);
        progress.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Next finished iteration. `None` once nothing is in flight.
    pub(crate) async fn join_next(&mut self) -> Option<IterationReport<S::Vu>> {
        loop {
            match self.inflight.join_next().await? {
                Ok(report) => return Some(report),
                Err(err) => self.lose(err),
            }
        }
    }

    /// An iteration task died outside the script (the script's own panics are caught).
    /// Its VU is gone; free the slot so the pool can grow again.
    fn lose(&mut self, err: JoinError) {
        tracing::error!(scenario = %self.ctx.scenario.name, error = %err, "iteration task lost");
        let id = err.id();
        self.running.retain(|_, r| r.task != id);
        self.pool.forget();
        self.ctx.progress.active.fetch_sub(1, Ordering::Relaxed);
        self.ctx.progress.set_allocated(self.pool.allocated());
    }

    /// Account for a finished iteration and return its VU to the pool.
    pub(crate) fn reclaim(&mut self, report: IterationReport<S::Vu>) {
        self.running.remove(&report.vu.id);
        let progress = &self.ctx.progress;
        progress.active.fetch_sub(1, Ordering::Relaxed);

        match &report.outcome {
            IterationOutcome::Completed => {
                progress.completed.fetch_add(1, Ordering::Relaxed);
            }
            IterationOutcome::Failed(err) => {
                progress.failed.fetch_add(1, Ordering::Relaxed);
                if err.is_abort() || self.ctx.scenario.abort_on_error {
                    self.ctx.signals.stop(StopReason::ScriptAbort {
                        scenario: self.ctx.scenario.name.to_string(),
                        message: err.message().to_string(),
                    });
                }
            }
            IterationOutcome::Interrupted(_) => {
                progress.interrupted.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.pool.give_back(report.vu);
    }

    pub(crate) fn interrupt_vu(&self, vu_id: u64, cause: InterruptCause) {
        if let Some(r) = self.running.get(&vu_id) {
            r.interrupt.interrupt(cause);
        }
    }

    pub(crate) fn interrupt_all(&self, cause: InterruptCause) {
        for r in self.running.values() {
            r.interrupt.interrupt(cause);
        }
    }

    /// Start initialising one more VU in the background. `false` when the pool is at its
    /// maximum (counting VUs still initialising).
    pub(crate) fn spawn_vu_init(&mut self) -> bool {
        if !self.pool.reserve() {
            return false;
        }

        let id = self.ctx.vu_ids.fetch_add(1, Ordering::Relaxed);
        let scenario_vu = self.next_scenario_vu;
        self.next_scenario_vu += 1;
        let init = VuInit {
            id,
            scenario_vu,
            scenario: self.ctx.scenario.name.clone(),
            exec: self.ctx.scenario.exec.clone(),
        };
        let script = self.ctx.script.clone();
        self.inits
            .spawn(async move { (id, scenario_vu, script.init_vu(init).await) });
        true
    }

    pub(crate) fn initializing(&self) -> usize {
        self.inits.len()
    }

    /// Next finished iteration or VU initialisation, iterations first. `None` once
    /// neither is pending.
    pub(crate) async fn next_event(&mut self) -> Option<Event<S::Vu>> {
        loop {
            tokio::select! {
                biased;
                Some(res) = self.inflight.join_next(), if !self.inflight.is_empty() => match res {
                    Ok(report) => return Some(Event::Finished(report)),
                    Err(err) => self.lose(err),
                },
                Some(res) = self.inits.join_next(), if !self.inits.is_empty() => match res {
                    Ok(init) => return Some(Event::Initialized(init)),
                    Err(err) => {
                        tracing::warn!(scenario = %self.ctx.scenario.name, error = %err, "vu init task lost");
                        self.pool.settle(None);
                    }
                },
                else => return None,
            }
        }
    }

    pub(crate) fn handle(&mut self, event: Event<S::Vu>) {
        match event {
            Event::Finished(report) => self.reclaim(report),
            Event::Initialized(init) => self.settle_init(init),
        }
    }

    fn settle_init(&mut self, (id, scenario_vu, res): InitResult<S::Vu>) {
        match res {
            Ok(inner) => {
                self.pool.settle(Some(Vu::new(id, scenario_vu, inner)));
                tracing::debug!(scenario = %self.ctx.scenario.name, vu = id, "vu added");
            }
            Err(err) => {
                self.pool.settle(None);
                tracing::warn!(scenario = %self.ctx.scenario.name, vu = id, error = %err, "vu init failed");
            }
        }
        self.ctx.progress.set_allocated(self.pool.allocated());
    }

    /// An iteration was due but no VU was idle.
    pub(crate) fn record_dropped(&mut self) {
        self.ctx.progress.dropped.fetch_add(1, Ordering::Relaxed);
        if !self.warned_capacity {
            self.warned_capacity = true;
            tracing::warn!(
                scenario = %self.ctx.scenario.name,
                max_vus = self.pool.max(),
                "insufficient VUs, dropping iterations"
            );
        }

        // The control loop must not wait on the bus; park what does not fit.
        self.unsent_dropped += 1;
        while self.unsent_dropped > 0
            && self
                .ctx
                .metrics
                .try_emit(self.ctx.builtin.dropped_iterations, 1.0, &[])
        {
            self.unsent_dropped -= 1;
        }
    }

    /// Graceful stop: wait for in-flight iterations up to `graceful_stop`, then interrupt
    /// the rest and wait for their VUs.
    ///
    /// The window is wall-clock time: a stop issued while the run is paused still
    /// interrupts on time.
    pub(crate) async fn graceful_stop(&mut self) {
        self.set_state(ExecutorState::GracefulStop);
        if self.inflight() == 0 {
            return;
        }

        let window = self.ctx.scenario.graceful_stop;
        tracing::debug!(
            scenario = %self.ctx.scenario.name,
            inflight = self.inflight(),
            ?window,
            "graceful stop"
        );

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                report = self.join_next() => match report {
                    Some(report) => self.reclaim(report),
                    None => return,
                },
                _ = &mut deadline => break,
            }
        }

        self.interrupt_all(InterruptCause::GracefulStop);
        while let Some(report) = self.join_next().await {
            self.reclaim(report);
        }
    }

    /// Release the pool and report the final counters.
    pub(crate) async fn finish(&mut self) -> ScenarioProgress {
        self.inits.shutdown().await;

        let metrics = self.ctx.metrics.clone();
        let dropped = self.ctx.builtin.dropped_iterations;
        for _ in 0..std::mem::take(&mut self.unsent_dropped) {
            if metrics.emit(dropped, 1.0, &[]).await.is_err() {
                break;
            }
        }

        self.pool.drain();
        let progress = &self.ctx.progress;
        progress.set_allocated(0);
        progress.set_state(ExecutorState::Stopped);
        progress.snapshot()
    }
}
