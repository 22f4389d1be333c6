use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use stampede_core::{
    MetricKind, RunOptions, ScenarioOptions, Stage, ThresholdOptions, ThresholdSetOptions,
};

use crate::runtime::{Lifecycle, MetricEmit, Program, Workload};

/// A config file: run options, thresholds and the synthetic workloads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ConfigDoc {
    // Shortcuts, used when `scenarios` is empty.
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    #[serde(default)]
    pub duration: Option<YamlDuration>,
    #[serde(default)]
    pub stages: Vec<StageYaml>,

    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioYaml>,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdListYaml>,

    #[serde(default)]
    pub setup_timeout: Option<YamlDuration>,
    #[serde(default)]
    pub teardown_timeout: Option<YamlDuration>,
    pub sample_bus_capacity: Option<usize>,
    #[serde(default)]
    pub threshold_interval: Option<YamlDuration>,
    #[serde(default)]
    pub vus_sample_interval: Option<YamlDuration>,

    /// Workloads keyed by exec name.
    #[serde(default)]
    pub exec: BTreeMap<String, WorkloadYaml>,
    #[serde(default)]
    pub setup: Option<LifecycleYaml>,
    #[serde(default)]
    pub teardown: Option<LifecycleYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    /// Executor kind: per-vu-iterations | shared-iterations | constant-vus | ramping-vus |
    /// constant-arrival-rate | ramping-arrival-rate | externally-controlled
    pub executor: Option<String>,

    /// Workload name under `exec`.
    pub exec: Option<String>,

    /// Scenario-level tags.
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub start_time: Option<YamlDuration>,
    #[serde(default)]
    pub graceful_stop: Option<YamlDuration>,
    #[serde(default)]
    pub iteration_timeout: Option<YamlDuration>,
    #[serde(default)]
    pub abort_on_error: bool,

    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    #[serde(default)]
    pub duration: Option<YamlDuration>,
    #[serde(default)]
    pub max_duration: Option<YamlDuration>,

    // ramping-vus
    #[serde(rename = "startVUs")]
    pub start_vus: Option<u64>,
    #[serde(default)]
    pub graceful_ramp_down: Option<YamlDuration>,
    #[serde(default)]
    pub stages: Vec<StageYaml>,

    // arrival-rate
    pub rate: Option<u64>,
    pub start_rate: Option<u64>,
    #[serde(default)]
    pub time_unit: Option<YamlDuration>,
    #[serde(rename = "preAllocatedVUs")]
    pub pre_allocated_vus: Option<u64>,
    #[serde(rename = "maxVUs")]
    pub max_vus: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: u64,

    #[serde(default)]
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration cannot be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// `selector: expr`, `selector: [expr, ...]` or objects with `abortOnFail`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdListYaml {
    Many(Vec<ThresholdYaml>),
    One(ThresholdYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdYaml {
    Expr(String),
    Full(ThresholdObjectYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ThresholdObjectYaml {
    pub threshold: String,
    #[serde(default)]
    pub abort_on_fail: bool,
    #[serde(default)]
    pub delay_abort_eval: Option<YamlDuration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct WorkloadYaml {
    #[serde(default)]
    pub sleep: Option<YamlDuration>,
    pub fail_every: Option<u64>,
    #[serde(default)]
    pub abort_on_failure: bool,
    #[serde(default)]
    pub metrics: Vec<MetricYaml>,
    pub log: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct MetricYaml {
    pub name: String,
    /// counter | gauge | rate | trend
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_metric_value")]
    pub value: f64,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeMap<String, String>,
}

fn default_metric_value() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct LifecycleYaml {
    #[serde(default)]
    pub sleep: Option<YamlDuration>,
    #[serde(default)]
    pub fail: bool,
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => continue,
        };
        out.insert(k, s);
    }

    Ok(out)
}

/// Engine options plus the workload program of one config file.
#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    pub options: RunOptions,
    pub program: Program,
}

pub(crate) async fn load_config(path: &Path) -> anyhow::Result<LoadedConfig> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read config: {}", path.display()))?;

    let doc: ConfigDoc = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    doc.into_config()
}

impl ConfigDoc {
    pub(crate) fn into_config(self) -> anyhow::Result<LoadedConfig> {
        let ConfigDoc {
            vus,
            iterations,
            duration,
            stages,
            scenarios,
            thresholds,
            setup_timeout,
            teardown_timeout,
            sample_bus_capacity,
            threshold_interval,
            vus_sample_interval,
            exec,
            setup,
            teardown,
        } = self;

        let options = RunOptions {
            vus,
            iterations,
            duration: duration.map(YamlDuration::into_inner),
            stages: stages.into_iter().map(stage).collect(),
            scenarios: scenarios
                .into_iter()
                .map(|(name, s)| scenario_yaml_into_options(name, s))
                .collect(),
            thresholds: parse_thresholds_map(thresholds)?,
            setup_timeout: setup_timeout.map(YamlDuration::into_inner),
            teardown_timeout: teardown_timeout.map(YamlDuration::into_inner),
            sample_bus_capacity,
            threshold_interval: threshold_interval.map(YamlDuration::into_inner),
            vus_sample_interval: vus_sample_interval.map(YamlDuration::into_inner),
        };

        let mut program = Program {
            setup: lifecycle(setup),
            teardown: lifecycle(teardown),
            ..Program::default()
        };
        for (name, w) in exec {
            let workload = workload_yaml_into_workload(&name, w)?;
            program.exec.insert(name, Arc::new(workload));
        }

        Ok(LoadedConfig { options, program })
    }
}

fn stage(s: StageYaml) -> Stage {
    Stage::new(s.duration.into_inner(), s.target)
}

fn lifecycle(raw: Option<LifecycleYaml>) -> Lifecycle {
    let raw = raw.unwrap_or_default();
    Lifecycle {
        sleep: raw.sleep.map(YamlDuration::into_inner).unwrap_or_default(),
        fail: raw.fail,
    }
}

fn scenario_yaml_into_options(name: String, scenario: ScenarioYaml) -> ScenarioOptions {
    let ScenarioYaml {
        executor,
        exec,
        tags,
        start_time,
        graceful_stop,
        iteration_timeout,
        abort_on_error,
        vus,
        iterations,
        duration,
        max_duration,
        start_vus,
        graceful_ramp_down,
        stages,
        rate,
        start_rate,
        time_unit,
        pre_allocated_vus,
        max_vus,
    } = scenario;

    ScenarioOptions {
        name,
        executor,
        exec,
        tags: tags.into_iter().collect(),
        start_time: start_time.map(YamlDuration::into_inner),
        graceful_stop: graceful_stop.map(YamlDuration::into_inner),
        iteration_timeout: iteration_timeout.map(YamlDuration::into_inner),
        abort_on_error,

        vus,
        iterations,
        duration: duration.map(YamlDuration::into_inner),
        max_duration: max_duration.map(YamlDuration::into_inner),

        start_vus,
        graceful_ramp_down: graceful_ramp_down.map(YamlDuration::into_inner),
        stages: stages.into_iter().map(stage).collect(),

        rate,
        start_rate,
        time_unit: time_unit.map(YamlDuration::into_inner),
        pre_allocated_vus,
        max_vus,
    }
}

fn workload_yaml_into_workload(exec: &str, raw: WorkloadYaml) -> anyhow::Result<Workload> {
    let metrics = raw
        .metrics
        .into_iter()
        .map(|m| {
            let kind: MetricKind = m.kind.parse().map_err(|_| {
                anyhow::anyhow!(
                    "exec `{exec}`: metric `{}` has unknown type `{}` (expected counter, gauge, rate or trend)",
                    m.name,
                    m.kind
                )
            })?;
            if !m.value.is_finite() {
                anyhow::bail!("exec `{exec}`: metric `{}` value must be finite", m.name);
            }
            Ok(MetricEmit {
                name: m.name,
                kind,
                value: m.value,
                tags: m.tags.into_iter().collect(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Workload {
        sleep: raw.sleep.map(YamlDuration::into_inner).unwrap_or_default(),
        fail_every: raw.fail_every.unwrap_or(0),
        abort_on_failure: raw.abort_on_failure,
        metrics,
        log: raw.log,
    })
}

fn parse_thresholds_map(
    raw: BTreeMap<String, ThresholdListYaml>,
) -> anyhow::Result<Vec<ThresholdSetOptions>> {
    let mut out = Vec::with_capacity(raw.len());

    for (selector, v) in raw {
        let entries = match v {
            ThresholdListYaml::One(t) => vec![t],
            ThresholdListYaml::Many(v) => v,
        };

        if entries.is_empty() {
            anyhow::bail!("invalid thresholds for `{selector}`: empty list");
        }

        let thresholds = entries
            .into_iter()
            .map(|t| match t {
                ThresholdYaml::Expr(expr) => ThresholdOptions::new(expr),
                ThresholdYaml::Full(o) => {
                    let t = ThresholdOptions::new(o.threshold);
                    if o.abort_on_fail {
                        t.abort_on_fail(o.delay_abort_eval.map(YamlDuration::into_inner))
                    } else {
                        t
                    }
                }
            })
            .collect();

        out.push(ThresholdSetOptions {
            selector,
            thresholds,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("scenario_yaml")
            .join(name)
    }

    fn parse(yaml: &str) -> anyhow::Result<LoadedConfig> {
        let doc: ConfigDoc = serde_yaml::from_str(yaml)?;
        doc.into_config()
    }

    #[test]
    fn tags_deserialize_simple_scalars_as_strings() {
        let doc: ScenarioYaml = serde_yaml::from_str(
            r#"
executor: constant-vus
tags:
  a: true
  b: 123
  c: x
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(doc.tags.get("a").map(String::as_str), Some("true"));
        assert_eq!(doc.tags.get("b").map(String::as_str), Some("123"));
        assert_eq!(doc.tags.get("c").map(String::as_str), Some("x"));
    }

    #[test]
    fn durations_accept_strings_and_numbers() {
        let cfg = parse(
            r#"
duration: 1m 30s
setupTimeout: 5
teardownTimeout: 0.5
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(cfg.options.duration, Some(Duration::from_secs(90)));
        assert_eq!(cfg.options.setup_timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.options.teardown_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(parse("duration: -3").is_err());
    }

    #[test]
    fn thresholds_accept_strings_lists_and_objects() {
        let cfg = parse(
            r#"
thresholds:
  iterations: count>10
  "iteration_duration{scenario:api}":
    - p(95)<500
    - threshold: avg<200
      abortOnFail: true
      delayAbortEval: 10s
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let sets = &cfg.options.thresholds;
        assert_eq!(sets.len(), 2);
        let duration = sets
            .iter()
            .find(|s| s.selector == "iteration_duration{scenario:api}")
            .unwrap_or_else(|| panic!("missing set"));
        assert_eq!(duration.thresholds.len(), 2);
        assert!(!duration.thresholds[0].abort_on_fail);
        assert!(duration.thresholds[1].abort_on_fail);
        assert_eq!(
            duration.thresholds[1].delay_abort_eval,
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn empty_threshold_list_is_rejected() {
        let err = match parse("thresholds:\n  iterations: []\n") {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("empty list"), "{err:#}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse("scenarios:\n  a:\n    executor: constant-vus\n    vu: 3\n").is_err());
    }

    #[test]
    fn unknown_metric_type_is_rejected() {
        let err = match parse(
            r#"
exec:
  default:
    metrics:
      - name: hits
        type: histogram
"#,
        ) {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("histogram"), "{err:#}");
    }

    #[tokio::test]
    async fn loads_full_config() {
        let cfg = load_config(&fixture_path("full.yaml"))
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        let names: Vec<&str> = cfg
            .options
            .scenarios
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["browse", "checkout", "spike"]);

        let spike = &cfg.options.scenarios[2];
        assert_eq!(spike.executor.as_deref(), Some("ramping-arrival-rate"));
        assert_eq!(spike.time_unit, Some(Duration::from_secs(1)));
        assert_eq!(spike.pre_allocated_vus, Some(2));
        assert_eq!(spike.max_vus, Some(10));
        assert_eq!(spike.stages.len(), 2);
        assert_eq!(spike.start_time, Some(Duration::from_millis(200)));

        let checkout = &cfg.options.scenarios[1];
        assert_eq!(checkout.exec.as_deref(), Some("checkout"));
        assert_eq!(
            checkout.tags,
            vec![("flow".to_string(), "purchase".to_string())]
        );

        assert_eq!(cfg.options.thresholds.len(), 2);

        let workload = cfg
            .program
            .workload("checkout")
            .unwrap_or_else(|| panic!("checkout workload"));
        assert_eq!(workload.sleep, Duration::from_millis(20));
        assert_eq!(workload.fail_every, 5);
        assert_eq!(workload.metrics.len(), 2);
        assert_eq!(workload.metrics[1].kind, MetricKind::Trend);
    }

    #[tokio::test]
    async fn loads_shortcut_config() {
        let cfg = load_config(&fixture_path("shortcuts.yaml"))
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        assert!(cfg.options.scenarios.is_empty());
        assert_eq!(cfg.options.vus, Some(2));
        assert_eq!(cfg.options.iterations, Some(6));
        assert!(cfg.program.exec.is_empty());
    }
}
