#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stampede_core::metrics::Registry;
use stampede_core::{
    IterationContext, LifecycleContext, MetricKind, RunConfig, RunOptions, RunPlan,
    ScenarioOptions, Script, ScriptError, ScriptVu, SetupData, VuInit,
};

/// Configurable script used across the integration tests.
#[derive(Debug, Clone, Default)]
pub struct TestScript {
    /// Time each iteration takes.
    pub sleep: Duration,
    /// Every n-th iteration on a VU fails (1-based); `0` never fails.
    pub fail_every: u64,
    /// Failures request a run abort.
    pub abort_on_failure: bool,
    /// Counter emitted once per iteration.
    pub counter: Option<&'static str>,
    /// Emit `setup_counter` from setup and `teardown_counter` from teardown.
    pub lifecycle_counters: bool,
    pub fail_setup: bool,
    pub fail_init: bool,
    pub stats: Arc<ScriptStats>,
}

#[derive(Debug, Default)]
pub struct ScriptStats {
    pub inits: AtomicU64,
    pub iterations: AtomicU64,
    pub setups: AtomicU64,
    pub teardowns: AtomicU64,
}

impl ScriptStats {
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn inits(&self) -> u64 {
        self.inits.load(Ordering::Relaxed)
    }
}

pub struct TestVu {
    script: TestScript,
    count: u64,
}

impl Script for TestScript {
    type Vu = TestVu;

    fn register_metrics(&self, registry: &Registry) -> stampede_core::metrics::Result<()> {
        registry.register("unused_counter", MetricKind::Counter)?;
        registry.register("empty_trend", MetricKind::Trend)?;
        Ok(())
    }

    async fn setup(&self, ctx: &LifecycleContext) -> Result<serde_json::Value, ScriptError> {
        self.stats.setups.fetch_add(1, Ordering::Relaxed);
        if self.fail_setup {
            return Err(ScriptError::new("setup exploded"));
        }
        if self.lifecycle_counters {
            ctx.record("setup_counter", MetricKind::Counter, 1.0, &[])
                .await
                .map_err(|e| ScriptError::new(e.to_string()))?;
        }
        Ok(serde_json::json!({ "token": "abc" }))
    }

    async fn init_vu(&self, _vu: VuInit) -> Result<TestVu, ScriptError> {
        self.stats.inits.fetch_add(1, Ordering::Relaxed);
        if self.fail_init {
            return Err(ScriptError::new("init exploded"));
        }
        Ok(TestVu {
            script: self.clone(),
            count: 0,
        })
    }

    async fn teardown(&self, ctx: &LifecycleContext, _data: SetupData) -> Result<(), ScriptError> {
        self.stats.teardowns.fetch_add(1, Ordering::Relaxed);
        if self.lifecycle_counters {
            ctx.record("teardown_counter", MetricKind::Counter, 1.0, &[])
                .await
                .map_err(|e| ScriptError::new(e.to_string()))?;
        }
        Ok(())
    }
}

impl ScriptVu for TestVu {
    async fn iteration(&mut self, ctx: &IterationContext) -> Result<(), ScriptError> {
        self.count += 1;
        self.script.stats.iterations.fetch_add(1, Ordering::Relaxed);

        if ctx.setup_data()["token"] != "abc" {
            return Err(ScriptError::new("setup data missing"));
        }
        if let Some(name) = self.script.counter {
            ctx.record(name, MetricKind::Counter, 1.0, &[])
                .await
                .map_err(|e| ScriptError::new(e.to_string()))?;
        }
        if !self.script.sleep.is_zero() {
            tokio::time::sleep(self.script.sleep).await;
        }

        let every = self.script.fail_every;
        if every > 0 && self.count % every == 0 {
            return Err(if self.script.abort_on_failure {
                ScriptError::abort("fatal failure")
            } else {
                ScriptError::new("expected failure")
            });
        }
        Ok(())
    }
}

pub fn scenario(name: &str, executor: &str) -> ScenarioOptions {
    ScenarioOptions {
        name: name.to_string(),
        executor: Some(executor.to_string()),
        ..ScenarioOptions::default()
    }
}

pub fn plan(opts: RunOptions) -> RunPlan {
    RunPlan::from_options(
        &RunOptions {
            threshold_interval: opts.threshold_interval.or(Some(Duration::from_millis(50))),
            vus_sample_interval: opts.vus_sample_interval.or(Some(Duration::from_millis(50))),
            ..opts
        },
        &RunConfig::default(),
    )
    .unwrap_or_else(|e| panic!("invalid plan: {e}"))
}
