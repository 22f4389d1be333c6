use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use serde::Serialize;
use stampede_metrics::{Registry, SampleSender, sample_bus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::builtin_metrics::BuiltinMetrics;
use crate::clock::RunClock;
use crate::engine::{LiveThresholds, MetricsEngine};
use crate::error::{Error, Result};
use crate::executor::{
    ExecutorContext, ExecutorProgress, ExecutorState, ExternalParams, ExternalUpdate,
    ScenarioProgress, run_executor, warm_pool,
};
use crate::metrics_context::MetricsContext;
use crate::plan::{ExecutorConfig, ExecutorKind, RunPlan};
use crate::pool::VuPool;
use crate::script::{Script, SetupData};
use crate::signal::{RunSignals, StopReason};
use crate::summary::{RunReport, RunStatus, ScenarioReport};
use crate::thresholds::validate_threshold_kinds;
use crate::thresholds_eval::ThresholdSetResult;
use crate::vu::LifecycleContext;

struct ScenarioHandle {
    name: Arc<str>,
    kind: ExecutorKind,
    progress: Arc<ExecutorProgress>,
    external: Option<watch::Sender<ExternalParams>>,
}

struct HandleInner {
    clock: RunClock,
    signals: RunSignals,
    scenarios: Vec<ScenarioHandle>,
    live: LiveThresholds,
}

/// Cheap, cloneable control surface of a run: pause, resume, stop, external updates and
/// progress. Usable from any task while [`RunController::run`] is in progress.
#[derive(Clone)]
pub struct RunHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioStatus {
    pub name: String,
    pub executor: ExecutorKind,
    #[serde(flatten)]
    pub progress: ScenarioProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunProgress {
    #[serde(with = "crate::summary::duration_ms")]
    pub elapsed: Duration,
    pub paused: bool,
    pub stopping: bool,
    pub vus: u64,
    pub vus_max: u64,
    pub scenarios: Vec<ScenarioStatus>,
    /// Results of the latest threshold evaluation.
    pub thresholds: Vec<ThresholdSetResult>,
}

impl RunHandle {
    /// Stop dispatching new iterations. In-flight iterations keep running and schedules
    /// stand still. Returns `false` when already paused.
    pub fn pause(&self) -> bool {
        let changed = self.inner.clock.pause();
        if changed {
            tracing::info!("run paused");
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let changed = self.inner.clock.resume();
        if changed {
            tracing::info!("run resumed");
        }
        changed
    }

    pub fn is_paused(&self) -> bool {
        self.inner.clock.is_paused()
    }

    /// Stop the run gracefully: executors enter graceful stop, teardown still runs.
    pub fn stop(&self) {
        self.inner.signals.stop(StopReason::External);
    }

    pub fn update_external(&self, scenario: &str, update: ExternalUpdate) -> Result<ExternalParams> {
        let handle = self
            .inner
            .scenarios
            .iter()
            .find(|s| &*s.name == scenario)
            .ok_or_else(|| Error::UnknownScenario(scenario.to_string()))?;
        let tx = handle
            .external
            .as_ref()
            .ok_or_else(|| Error::NotExternallyControlled(scenario.to_string()))?;

        let mut result = Err(String::new());
        tx.send_if_modified(|current| match current.apply(update) {
            Ok(next) => {
                let changed = next != *current;
                *current = next;
                result = Ok(next);
                changed
            }
            Err(reason) => {
                result = Err(reason);
                false
            }
        });

        result.map_err(|reason| Error::InvalidExternalUpdate {
            scenario: scenario.to_string(),
            reason,
        })
    }

    pub fn progress(&self) -> RunProgress {
        let scenarios: Vec<ScenarioStatus> = self
            .inner
            .scenarios
            .iter()
            .map(|s| ScenarioStatus {
                name: s.name.to_string(),
                executor: s.kind,
                progress: s.progress.snapshot(),
            })
            .collect();

        RunProgress {
            elapsed: self.inner.clock.elapsed(),
            paused: self.inner.clock.is_paused(),
            stopping: self.inner.signals.is_stopped(),
            vus: scenarios.iter().map(|s| s.progress.active).sum(),
            vus_max: scenarios.iter().map(|s| s.progress.allocated).sum(),
            scenarios,
            thresholds: self.inner.live.lock().clone(),
        }
    }
}

/// Owns one run from VU warm-up to the final report.
pub struct RunController<S: Script> {
    plan: RunPlan,
    script: Arc<S>,
    registry: Arc<Registry>,
    builtin: BuiltinMetrics,
    handle: RunHandle,
    external: Vec<Option<watch::Receiver<ExternalParams>>>,
}

impl<S: Script> RunController<S> {
    /// Register built-in and script metrics and check thresholds against them. Nothing
    /// runs yet.
    pub fn new(plan: RunPlan, script: S) -> Result<Self> {
        let registry = Arc::new(Registry::default());
        let builtin = BuiltinMetrics::register(&registry)?;
        script.register_metrics(&registry)?;
        validate_threshold_kinds(&plan.thresholds, &registry)?;

        let mut scenarios = Vec::with_capacity(plan.scenarios.len());
        let mut external = Vec::with_capacity(plan.scenarios.len());
        for s in &plan.scenarios {
            let (tx, rx) = match s.executor {
                ExecutorConfig::ExternallyControlled {
                    vus,
                    max_vus,
                    duration,
                } => {
                    let (tx, rx) = watch::channel(ExternalParams {
                        vus,
                        max_vus,
                        duration,
                    });
                    (Some(tx), Some(rx))
                }
                _ => (None, None),
            };
            scenarios.push(ScenarioHandle {
                name: s.name.clone(),
                kind: s.executor.kind(),
                progress: Arc::new(ExecutorProgress::default()),
                external: tx,
            });
            external.push(rx);
        }

        let handle = RunHandle {
            inner: Arc::new(HandleInner {
                clock: RunClock::new(),
                signals: RunSignals::new(),
                scenarios,
                live: LiveThresholds::default(),
            }),
        };

        Ok(Self {
            plan,
            script: Arc::new(script),
            registry,
            builtin,
            handle,
            external,
        })
    }

    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn run(self) -> Result<RunReport> {
        let Self {
            plan,
            script,
            registry,
            builtin,
            handle,
            external,
        } = self;
        let clock = handle.inner.clock.clone();
        let signals = handle.inner.signals.clone();

        let (samples, rx) = sample_bus(plan.bus_capacity);
        let engine = MetricsEngine::new(
            registry.clone(),
            rx,
            plan.thresholds.clone(),
            clock.clone(),
            signals.clone(),
            plan.threshold_interval,
        )
        .with_live_thresholds(handle.inner.live.clone())
        .spawn();

        tracing::info!(scenarios = plan.scenarios.len(), "run starting");

        let vu_ids = Arc::new(AtomicU64::new(1));
        let mut pools: Vec<VuPool<S::Vu>> = Vec::with_capacity(plan.scenarios.len());
        let mut failure: Option<String> = None;
        for scenario in &plan.scenarios {
            match warm_pool(&script, scenario, &vu_ids).await {
                Ok(pool) => pools.push(pool),
                Err(err) => {
                    failure = Some(err.to_string());
                    break;
                }
            }
        }

        let setup_data = match failure {
            Some(_) => None,
            None => match run_setup(&*script, &registry, &samples, plan.setup_timeout).await {
                Ok(data) => Some(data),
                Err(reason) => {
                    failure = Some(reason);
                    None
                }
            },
        };

        let mut scenarios = Vec::with_capacity(plan.scenarios.len());
        if let Some(setup_data) = setup_data {
            clock.start();
            let sampler = spawn_vus_sampler(
                &handle,
                MetricsContext::unscoped(registry.clone(), samples.clone(), &[]),
                builtin,
                plan.vus_sample_interval,
            );

            let mut tasks: Vec<JoinHandle<ScenarioProgress>> = Vec::new();
            for ((scenario, pool), (slot, external)) in plan
                .scenarios
                .iter()
                .zip(pools)
                .zip(handle.inner.scenarios.iter().zip(external))
            {
                let ctx = ExecutorContext {
                    scenario: Arc::new(scenario.clone()),
                    script: script.clone(),
                    clock: clock.clone(),
                    stop: signals.token().child_token(),
                    signals: signals.clone(),
                    metrics: MetricsContext::for_scenario(
                        registry.clone(),
                        samples.clone(),
                        scenario.name.clone(),
                        &scenario.tags,
                    ),
                    builtin,
                    setup_data: setup_data.clone(),
                    progress: slot.progress.clone(),
                    vu_ids: vu_ids.clone(),
                };
                tasks.push(tokio::spawn(start_scenario(ctx, pool, external)));
            }

            for (task, scenario) in tasks.into_iter().zip(&plan.scenarios) {
                let progress = task.await?;
                scenarios.push(ScenarioReport {
                    name: scenario.name.to_string(),
                    executor: scenario.executor.kind(),
                    progress,
                });
            }

            sampler.stop().await;
            run_teardown(&*script, &registry, &samples, setup_data, plan.teardown_timeout).await;
        }

        let duration = clock.elapsed();
        drop(samples);
        let metrics = engine.finish().await?;

        let (status, reason) = match (&failure, signals.reason()) {
            (Some(reason), _) => (RunStatus::SetupFailed, Some(reason.clone())),
            (None, Some(stop)) => {
                let status = match stop {
                    StopReason::ThresholdAbort { .. } => RunStatus::ThresholdsAborted,
                    StopReason::ScriptAbort { .. } => RunStatus::ScriptAborted,
                    StopReason::External => RunStatus::Stopped,
                };
                (status, Some(stop.to_string()))
            }
            (None, None) if metrics.thresholds.iter().all(|t| t.ok) => (RunStatus::Passed, None),
            (None, None) => {
                let failed: Vec<&str> = metrics
                    .thresholds
                    .iter()
                    .filter(|t| !t.ok)
                    .map(|t| t.selector.as_str())
                    .collect();
                (
                    RunStatus::ThresholdsFailed,
                    Some(format!("thresholds failed: {}", failed.join(", "))),
                )
            }
        };

        tracing::info!(%status, ?duration, "run finished");
        Ok(RunReport {
            status,
            reason,
            duration,
            scenarios,
            thresholds: metrics.thresholds,
            summary: metrics.summary,
        })
    }
}

/// Wait for `start_time`, then run the executor. A stop before the start skips the
/// scenario.
async fn start_scenario<S: Script>(
    ctx: ExecutorContext<S>,
    pool: VuPool<S::Vu>,
    external: Option<watch::Receiver<ExternalParams>>,
) -> ScenarioProgress {
    let start_time = ctx.scenario.start_time;
    if !start_time.is_zero() {
        ctx.progress.set_state(ExecutorState::Starting);
        let clock = ctx.clock.clone();
        tokio::select! {
            _ = ctx.stop.cancelled() => {
                tracing::debug!(scenario = %ctx.scenario.name, "stopped before start");
                ctx.progress.set_state(ExecutorState::Stopped);
                return ctx.progress.snapshot();
            }
            _ = clock.sleep_until(start_time) => {}
        }
    }
    run_executor(ctx, pool, external).await
}

async fn run_setup<S: Script>(
    script: &S,
    registry: &Arc<Registry>,
    samples: &SampleSender,
    timeout: Duration,
) -> std::result::Result<SetupData, String> {
    let ctx = LifecycleContext::new(
        MetricsContext::unscoped(registry.clone(), samples.clone(), &[("group", "::setup")]),
        "setup",
    );
    match tokio::time::timeout(timeout, script.setup(&ctx)).await {
        Ok(Ok(data)) => Ok(Arc::new(data)),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "setup failed");
            Err(format!("setup failed: {err}"))
        }
        Err(_) => {
            tracing::error!(?timeout, "setup timed out");
            Err(format!("setup timed out after {timeout:?}"))
        }
    }
}

async fn run_teardown<S: Script>(
    script: &S,
    registry: &Arc<Registry>,
    samples: &SampleSender,
    data: SetupData,
    timeout: Duration,
) {
    let ctx = LifecycleContext::new(
        MetricsContext::unscoped(registry.clone(), samples.clone(), &[("group", "::teardown")]),
        "teardown",
    );
    match tokio::time::timeout(timeout, script.teardown(&ctx, data)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "teardown failed"),
        Err(_) => tracing::warn!(?timeout, "teardown timed out"),
    }
}

struct VusSampler {
    task: JoinHandle<()>,
    stop: CancellationToken,
}

impl VusSampler {
    async fn stop(self) {
        self.stop.cancel();
        if let Err(err) = self.task.await {
            tracing::debug!(error = %err, "vus sampler ended abnormally");
        }
    }
}

/// Emit `vus`/`vus_max` on a fixed interval, plus a last sample when stopped.
fn spawn_vus_sampler(
    handle: &RunHandle,
    metrics: MetricsContext,
    builtin: BuiltinMetrics,
    interval: Duration,
) -> VusSampler {
    let stop = CancellationToken::new();
    let handle = handle.clone();
    let token = stop.clone();

    let task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let stopping = tokio::select! {
                _ = token.cancelled() => true,
                _ = tick.tick() => false,
            };

            let (vus, vus_max) = handle
                .inner
                .scenarios
                .iter()
                .fold((0u64, 0u64), |(a, m), s| {
                    (a + s.progress.active(), m + s.progress.allocated())
                });
            let sent = metrics.emit(builtin.vus, vus as f64, &[]).await.is_ok()
                && metrics
                    .emit(builtin.vus_max, vus_max as f64, &[])
                    .await
                    .is_ok();
            if stopping || !sent {
                return;
            }
        }
    });

    VusSampler { task, stop }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("elapsed", &self.inner.clock.elapsed())
            .field("paused", &self.inner.clock.is_paused())
            .field("stopping", &self.inner.signals.is_stopped())
            .finish()
    }
}
