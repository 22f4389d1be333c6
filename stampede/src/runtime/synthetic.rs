use std::sync::Arc;

use stampede_core::metrics::Registry;
use stampede_core::{
    IterationContext, LifecycleContext, MetricKind, Script, ScriptError, ScriptVu, SetupData,
    VuInit,
};

use super::{Lifecycle, Program, Workload};

/// Script runtime driven by the declarative `exec` workloads of the config file.
#[derive(Debug, Clone)]
pub(crate) struct SyntheticScript {
    program: Arc<Program>,
    metrics: Vec<(String, MetricKind)>,
}

impl SyntheticScript {
    pub(crate) fn new(program: Program) -> anyhow::Result<Self> {
        let metrics = program
            .metric_kinds()?
            .into_iter()
            .map(|(name, kind)| (name.to_string(), kind))
            .collect();
        Ok(Self {
            program: Arc::new(program),
            metrics,
        })
    }
}

async fn run_lifecycle(stage: &str, lifecycle: &Lifecycle) -> Result<(), ScriptError> {
    if !lifecycle.sleep.is_zero() {
        tokio::time::sleep(lifecycle.sleep).await;
    }
    if lifecycle.fail {
        return Err(ScriptError::new(format!("{stage} configured to fail")));
    }
    Ok(())
}

impl Script for SyntheticScript {
    type Vu = SyntheticVu;

    fn register_metrics(&self, registry: &Registry) -> stampede_core::metrics::Result<()> {
        for (name, kind) in &self.metrics {
            registry.register(name, *kind)?;
        }
        Ok(())
    }

    async fn setup(&self, ctx: &LifecycleContext) -> Result<serde_json::Value, ScriptError> {
        run_lifecycle("setup", &self.program.setup).await?;
        ctx.log("setup finished");
        let execs: Vec<&str> = self.program.exec.keys().map(String::as_str).collect();
        Ok(serde_json::json!({ "execs": execs }))
    }

    async fn init_vu(&self, vu: VuInit) -> Result<SyntheticVu, ScriptError> {
        let workload = self.program.workload(&vu.exec).ok_or_else(|| {
            ScriptError::new(format!("exec `{}` is not defined", vu.exec))
        })?;
        Ok(SyntheticVu {
            workload,
            iterations: 0,
        })
    }

    async fn teardown(&self, ctx: &LifecycleContext, _data: SetupData) -> Result<(), ScriptError> {
        run_lifecycle("teardown", &self.program.teardown).await?;
        ctx.log("teardown finished");
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct SyntheticVu {
    workload: Arc<Workload>,
    iterations: u64,
}

impl ScriptVu for SyntheticVu {
    async fn iteration(&mut self, ctx: &IterationContext) -> Result<(), ScriptError> {
        self.iterations += 1;
        let w = self.workload.clone();

        if let Some(message) = &w.log {
            ctx.log(message);
        }
        if !w.sleep.is_zero() {
            tokio::time::sleep(w.sleep).await;
        }

        for m in &w.metrics {
            let tags: Vec<(&str, &str)> = m
                .tags
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            ctx.record(&m.name, m.kind, m.value, &tags)
                .await
                .map_err(|e| ScriptError::new(e.to_string()))?;
        }

        if w.fail_every > 0 && self.iterations % w.fail_every == 0 {
            let message = format!("iteration {} failed", ctx.iteration());
            return Err(if w.abort_on_failure {
                ScriptError::abort(message)
            } else {
                ScriptError::new(message)
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MetricEmit;

    fn vu_init(exec: &str) -> VuInit {
        VuInit {
            id: 1,
            scenario_vu: 1,
            scenario: Arc::from("main"),
            exec: Arc::from(exec),
        }
    }

    #[test]
    fn registers_declared_metrics() {
        let mut program = Program::default();
        program.exec.insert(
            "login".to_string(),
            Arc::new(Workload {
                metrics: vec![MetricEmit {
                    name: "login_time".to_string(),
                    kind: MetricKind::Trend,
                    value: 12.0,
                    tags: Vec::new(),
                }],
                ..Workload::default()
            }),
        );
        let script = SyntheticScript::new(program).unwrap_or_else(|e| panic!("{e:#}"));

        let registry = Registry::default();
        script
            .register_metrics(&registry)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            registry.lookup("login_time").map(|(_, k)| k),
            Some(MetricKind::Trend)
        );
    }

    #[tokio::test]
    async fn unknown_exec_fails_vu_init() {
        let script = SyntheticScript::new(Program::default()).unwrap_or_else(|e| panic!("{e:#}"));

        assert!(script.init_vu(vu_init("default")).await.is_ok());
        let err = match script.init_vu(vu_init("checkout")).await {
            Ok(_) => panic!("expected init to fail"),
            Err(e) => e,
        };
        assert!(err.message().contains("checkout"));
    }
}
