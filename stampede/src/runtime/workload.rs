use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use stampede_core::{DEFAULT_EXEC, MetricKind, ScenarioConfig};

/// What one iteration of an exec does.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Workload {
    /// Simulated work per iteration.
    pub sleep: Duration,
    /// Every n-th iteration of a VU fails; `0` never fails.
    pub fail_every: u64,
    /// Failures ask the engine to abort the run.
    pub abort_on_failure: bool,
    pub metrics: Vec<MetricEmit>,
    /// Forwarded through the iteration log on every iteration.
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MetricEmit {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub tags: Vec<(String, String)>,
}

/// Setup or teardown behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Lifecycle {
    pub sleep: Duration,
    pub fail: bool,
}

/// Everything the synthetic runtime needs, loaded from the config file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    pub exec: BTreeMap<String, Arc<Workload>>,
    pub setup: Lifecycle,
    pub teardown: Lifecycle,
}

impl Program {
    /// The `default` exec exists even when the config does not define it: it does nothing.
    pub(crate) fn workload(&self, exec: &str) -> Option<Arc<Workload>> {
        match self.exec.get(exec) {
            Some(w) => Some(w.clone()),
            None if exec == DEFAULT_EXEC => Some(Arc::new(Workload::default())),
            None => None,
        }
    }

    /// Every scenario must name a defined exec.
    pub(crate) fn check_execs(&self, scenarios: &[ScenarioConfig]) -> anyhow::Result<()> {
        for s in scenarios {
            if self.workload(&s.exec).is_none() {
                anyhow::bail!(
                    "scenario `{}`: exec `{}` is not defined under `exec`",
                    s.name,
                    s.exec
                );
            }
        }
        Ok(())
    }

    /// Custom metrics with their kinds; conflicting kinds for one name are rejected.
    pub(crate) fn metric_kinds(&self) -> anyhow::Result<BTreeMap<&str, MetricKind>> {
        let mut out: BTreeMap<&str, MetricKind> = BTreeMap::new();
        for (exec, workload) in &self.exec {
            for m in &workload.metrics {
                match out.get(m.name.as_str()) {
                    Some(kind) if *kind != m.kind => anyhow::bail!(
                        "exec `{exec}`: metric `{}` declared as {} and {kind}",
                        m.name,
                        m.kind
                    ),
                    Some(_) => {}
                    None => {
                        out.insert(m.name.as_str(), m.kind);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(name: &str, kind: MetricKind) -> MetricEmit {
        MetricEmit {
            name: name.to_string(),
            kind,
            value: 1.0,
            tags: Vec::new(),
        }
    }

    #[test]
    fn default_exec_is_always_available() {
        let program = Program::default();
        assert_eq!(program.workload(DEFAULT_EXEC).as_deref(), Some(&Workload::default()));
        assert!(program.workload("login").is_none());
    }

    #[test]
    fn metric_kinds_must_agree_across_execs() {
        let mut program = Program::default();
        program.exec.insert(
            "a".to_string(),
            Arc::new(Workload {
                metrics: vec![metric("logins", MetricKind::Counter)],
                ..Workload::default()
            }),
        );
        program.exec.insert(
            "b".to_string(),
            Arc::new(Workload {
                metrics: vec![metric("logins", MetricKind::Trend)],
                ..Workload::default()
            }),
        );

        let err = match program.metric_kinds() {
            Ok(_) => panic!("expected a kind conflict"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("logins"), "{err}");
    }
}
