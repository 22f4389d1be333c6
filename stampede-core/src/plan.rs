use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stampede_metrics::sample::DEFAULT_BUS_CAPACITY;

use crate::config::{
    DEFAULT_GRACEFUL_RAMP_DOWN, DEFAULT_GRACEFUL_STOP, DEFAULT_MAX_DURATION,
    DEFAULT_SETUP_TIMEOUT, DEFAULT_TEARDOWN_TIMEOUT, DEFAULT_THRESHOLD_INTERVAL,
    DEFAULT_TIME_UNIT, DEFAULT_VUS_SAMPLE_INTERVAL, RunConfig, RunOptions, ScenarioOptions, Stage,
};
use crate::error::{Error, Result};
use crate::thresholds::{ThresholdSet, parse_threshold_sets};

pub const DEFAULT_SCENARIO: &str = "default";
pub const DEFAULT_EXEC: &str = "default";

/// Executor kind (the string form used in configuration files).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::EnumString, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExecutorKind {
    PerVuIterations,
    SharedIterations,
    ConstantVus,
    RampingVus,
    ConstantArrivalRate,
    RampingArrivalRate,
    ExternallyControlled,
}

impl ExecutorKind {
    #[must_use]
    pub fn is_arrival_rate(self) -> bool {
        matches!(self, Self::ConstantArrivalRate | Self::RampingArrivalRate)
    }
}

/// Validated executor parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorConfig {
    PerVuIterations {
        vus: u64,
        iterations: u64,
        max_duration: Duration,
    },
    SharedIterations {
        vus: u64,
        iterations: u64,
        max_duration: Duration,
    },
    ConstantVus {
        vus: u64,
        duration: Duration,
    },
    RampingVus {
        start_vus: u64,
        stages: Vec<Stage>,
        graceful_ramp_down: Duration,
    },
    ConstantArrivalRate {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
    },
    RampingArrivalRate {
        start_rate: u64,
        time_unit: Duration,
        stages: Vec<Stage>,
        pre_allocated_vus: u64,
        max_vus: u64,
    },
    ExternallyControlled {
        vus: u64,
        max_vus: u64,
        /// `None` runs until stopped.
        duration: Option<Duration>,
    },
}

impl ExecutorConfig {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Self::PerVuIterations { .. } => ExecutorKind::PerVuIterations,
            Self::SharedIterations { .. } => ExecutorKind::SharedIterations,
            Self::ConstantVus { .. } => ExecutorKind::ConstantVus,
            Self::RampingVus { .. } => ExecutorKind::RampingVus,
            Self::ConstantArrivalRate { .. } => ExecutorKind::ConstantArrivalRate,
            Self::RampingArrivalRate { .. } => ExecutorKind::RampingArrivalRate,
            Self::ExternallyControlled { .. } => ExecutorKind::ExternallyControlled,
        }
    }

    /// Upper bound on VUs this executor may ever hold.
    pub fn max_vus(&self) -> u64 {
        match self {
            Self::PerVuIterations { vus, .. }
            | Self::SharedIterations { vus, .. }
            | Self::ConstantVus { vus, .. } => *vus,
            Self::RampingVus {
                start_vus, stages, ..
            } => stages
                .iter()
                .map(|s| s.target)
                .max()
                .unwrap_or(0)
                .max(*start_vus),
            Self::ConstantArrivalRate { max_vus, .. }
            | Self::RampingArrivalRate { max_vus, .. }
            | Self::ExternallyControlled { max_vus, .. } => *max_vus,
        }
    }

    /// VUs initialised before the run starts; the rest grow lazily.
    pub fn initial_vus(&self) -> u64 {
        match self {
            Self::ConstantArrivalRate {
                pre_allocated_vus, ..
            }
            | Self::RampingArrivalRate {
                pre_allocated_vus, ..
            } => *pre_allocated_vus,
            Self::ExternallyControlled { vus, .. } => *vus,
            other => other.max_vus(),
        }
    }

    /// Scheduled run time, excluding graceful windows. `None` when unbounded.
    pub fn scheduled_duration(&self) -> Option<Duration> {
        match self {
            Self::PerVuIterations { max_duration, .. }
            | Self::SharedIterations { max_duration, .. } => Some(*max_duration),
            Self::ConstantVus { duration, .. } | Self::ConstantArrivalRate { duration, .. } => {
                Some(*duration)
            }
            Self::RampingVus { stages, .. } | Self::RampingArrivalRate { stages, .. } => {
                Some(total_duration(stages))
            }
            Self::ExternallyControlled { duration, .. } => *duration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: Arc<str>,
    pub exec: Arc<str>,
    pub tags: Vec<(String, String)>,
    pub start_time: Duration,
    pub graceful_stop: Duration,
    pub iteration_timeout: Option<Duration>,
    pub abort_on_error: bool,
    pub executor: ExecutorConfig,
}

/// Everything the controller needs, validated up front.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub scenarios: Vec<ScenarioConfig>,
    pub thresholds: Vec<ThresholdSet>,
    pub bus_capacity: usize,
    pub threshold_interval: Duration,
    pub vus_sample_interval: Duration,
    pub setup_timeout: Duration,
    pub teardown_timeout: Duration,
}

impl RunPlan {
    pub fn from_options(opts: &RunOptions, cfg: &RunConfig) -> Result<Self> {
        let scenarios = scenarios_from_options(opts, cfg)?;
        let thresholds = parse_threshold_sets(&opts.thresholds)?;

        let bus_capacity = opts.sample_bus_capacity.unwrap_or(DEFAULT_BUS_CAPACITY);
        if bus_capacity == 0 {
            return Err(Error::scenario("options", "`sample_bus_capacity` must be positive"));
        }
        let threshold_interval = opts
            .threshold_interval
            .unwrap_or(DEFAULT_THRESHOLD_INTERVAL);
        let vus_sample_interval = opts
            .vus_sample_interval
            .unwrap_or(DEFAULT_VUS_SAMPLE_INTERVAL);
        if threshold_interval.is_zero() || vus_sample_interval.is_zero() {
            return Err(Error::scenario("options", "sampling intervals must be positive"));
        }

        Ok(Self {
            scenarios,
            thresholds,
            bus_capacity,
            threshold_interval,
            vus_sample_interval,
            setup_timeout: opts.setup_timeout.unwrap_or(DEFAULT_SETUP_TIMEOUT),
            teardown_timeout: opts.teardown_timeout.unwrap_or(DEFAULT_TEARDOWN_TIMEOUT),
        })
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| &*s.name == name)
    }
}

fn total_duration(stages: &[Stage]) -> Duration {
    stages
        .iter()
        .fold(Duration::ZERO, |acc, st| acc.saturating_add(st.duration))
}

pub fn is_valid_scenario_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Resolve the configured scenarios, or derive a `default` one from the top-level
/// shortcuts. Command-line overrides always replace configured scenarios.
pub fn scenarios_from_options(opts: &RunOptions, cfg: &RunConfig) -> Result<Vec<ScenarioConfig>> {
    if opts.scenarios.is_empty() || cfg.is_set() {
        let shortcut = scenario_from_shortcuts(opts, cfg)?;
        return Ok(vec![scenario_config(&shortcut)?]);
    }

    let mut out: Vec<ScenarioConfig> = Vec::with_capacity(opts.scenarios.len());
    for s in &opts.scenarios {
        if !is_valid_scenario_name(&s.name) {
            return Err(Error::InvalidScenarioName(s.name.clone()));
        }
        if out.iter().any(|o| *o.name == *s.name) {
            return Err(Error::DuplicateScenario(s.name.clone()));
        }
        out.push(scenario_config(s)?);
    }
    Ok(out)
}

fn scenario_from_shortcuts(opts: &RunOptions, cfg: &RunConfig) -> Result<ScenarioOptions> {
    let vus = cfg.vus.or(opts.vus);
    let iterations = cfg.iterations.or(opts.iterations);
    let duration = cfg.duration.or(opts.duration);

    // Run-shape flags on the command line win over configured stages.
    let cli_shape = cfg.iterations.is_some() || cfg.duration.is_some();
    let stages = if cli_shape {
        Vec::new()
    } else {
        opts.stages.clone()
    };

    if !stages.is_empty() && (iterations.is_some() || duration.is_some()) {
        return Err(Error::scenario(
            DEFAULT_SCENARIO,
            "`stages` cannot be combined with the `iterations` or `duration` shortcuts",
        ));
    }

    let mut s = ScenarioOptions {
        name: DEFAULT_SCENARIO.to_string(),
        vus,
        ..ScenarioOptions::default()
    };

    let kind = if let Some(iterations) = iterations {
        s.iterations = Some(iterations);
        s.max_duration = duration;
        ExecutorKind::SharedIterations
    } else if let Some(duration) = duration {
        s.duration = Some(duration);
        ExecutorKind::ConstantVus
    } else if !stages.is_empty() {
        s.vus = None;
        s.start_vus = vus;
        s.stages = stages;
        ExecutorKind::RampingVus
    } else {
        s.iterations = Some(1);
        ExecutorKind::PerVuIterations
    };
    s.executor = Some(kind.to_string());
    Ok(s)
}

fn scenario_config(s: &ScenarioOptions) -> Result<ScenarioConfig> {
    let name = s.name.as_str();
    let executor_name = s
        .executor
        .as_deref()
        .ok_or_else(|| Error::scenario(name, "`executor` is required"))?;
    let kind: ExecutorKind = executor_name.parse().map_err(|_| Error::UnknownExecutor {
        scenario: name.to_string(),
        executor: executor_name.to_string(),
    })?;

    reject_foreign_fields(s, kind)?;

    let executor = match kind {
        ExecutorKind::PerVuIterations => ExecutorConfig::PerVuIterations {
            vus: positive(name, "vus", s.vus.unwrap_or(1))?,
            iterations: positive(name, "iterations", s.iterations.unwrap_or(1))?,
            max_duration: positive_duration(
                name,
                "max_duration",
                s.max_duration.unwrap_or(DEFAULT_MAX_DURATION),
            )?,
        },
        ExecutorKind::SharedIterations => {
            let vus = positive(name, "vus", s.vus.unwrap_or(1))?;
            let iterations = positive(name, "iterations", s.iterations.unwrap_or(1))?;
            ExecutorConfig::SharedIterations {
                vus: vus.min(iterations),
                iterations,
                max_duration: positive_duration(
                    name,
                    "max_duration",
                    s.max_duration.unwrap_or(DEFAULT_MAX_DURATION),
                )?,
            }
        }
        ExecutorKind::ConstantVus => ExecutorConfig::ConstantVus {
            vus: positive(name, "vus", s.vus.unwrap_or(1))?,
            duration: required_duration(name, "duration", s.duration)?,
        },
        ExecutorKind::RampingVus => {
            let start_vus = s.start_vus.unwrap_or(1);
            validate_stages(name, &s.stages)?;
            if start_vus == 0 && s.stages.iter().all(|st| st.target == 0) {
                return Err(Error::scenario(
                    name,
                    "either `start_vus` or one stage `target` must be positive",
                ));
            }
            ExecutorConfig::RampingVus {
                start_vus,
                stages: s.stages.clone(),
                graceful_ramp_down: s.graceful_ramp_down.unwrap_or(DEFAULT_GRACEFUL_RAMP_DOWN),
            }
        }
        ExecutorKind::ConstantArrivalRate => {
            let (pre_allocated_vus, max_vus) = arrival_vus(s)?;
            ExecutorConfig::ConstantArrivalRate {
                rate: positive(
                    name,
                    "rate",
                    s.rate
                        .ok_or_else(|| Error::scenario(name, "`rate` is required"))?,
                )?,
                time_unit: positive_duration(
                    name,
                    "time_unit",
                    s.time_unit.unwrap_or(DEFAULT_TIME_UNIT),
                )?,
                duration: required_duration(name, "duration", s.duration)?,
                pre_allocated_vus,
                max_vus,
            }
        }
        ExecutorKind::RampingArrivalRate => {
            let (pre_allocated_vus, max_vus) = arrival_vus(s)?;
            validate_stages(name, &s.stages)?;
            ExecutorConfig::RampingArrivalRate {
                start_rate: s.start_rate.unwrap_or(0),
                time_unit: positive_duration(
                    name,
                    "time_unit",
                    s.time_unit.unwrap_or(DEFAULT_TIME_UNIT),
                )?,
                stages: s.stages.clone(),
                pre_allocated_vus,
                max_vus,
            }
        }
        ExecutorKind::ExternallyControlled => {
            let vus = s.vus.unwrap_or(1);
            let max_vus = s.max_vus.unwrap_or(vus);
            if max_vus == 0 {
                return Err(Error::scenario(name, "`max_vus` must be a positive integer"));
            }
            if vus > max_vus {
                return Err(Error::scenario(name, "`vus` must be <= `max_vus`"));
            }
            ExecutorConfig::ExternallyControlled {
                vus,
                max_vus,
                duration: s.duration.filter(|d| !d.is_zero()),
            }
        }
    };

    if s.iteration_timeout.is_some_and(|d| d.is_zero()) {
        return Err(Error::scenario(name, "`iteration_timeout` must be a positive duration"));
    }

    Ok(ScenarioConfig {
        name: Arc::from(name),
        exec: Arc::from(s.exec.as_deref().unwrap_or(DEFAULT_EXEC)),
        tags: s.tags.clone(),
        start_time: s.start_time.unwrap_or(Duration::ZERO),
        graceful_stop: s.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
        iteration_timeout: s.iteration_timeout,
        abort_on_error: s.abort_on_error,
        executor,
    })
}

fn reject_foreign_fields(s: &ScenarioOptions, kind: ExecutorKind) -> Result<()> {
    use ExecutorKind::*;

    let fields: [(&str, bool, &[ExecutorKind]); 11] = [
        (
            "vus",
            s.vus.is_some(),
            &[PerVuIterations, SharedIterations, ConstantVus, ExternallyControlled],
        ),
        (
            "iterations",
            s.iterations.is_some(),
            &[PerVuIterations, SharedIterations],
        ),
        (
            "duration",
            s.duration.is_some(),
            &[ConstantVus, ConstantArrivalRate, ExternallyControlled],
        ),
        (
            "max_duration",
            s.max_duration.is_some(),
            &[PerVuIterations, SharedIterations],
        ),
        ("start_vus", s.start_vus.is_some(), &[RampingVus]),
        ("graceful_ramp_down", s.graceful_ramp_down.is_some(), &[RampingVus]),
        ("stages", !s.stages.is_empty(), &[RampingVus, RampingArrivalRate]),
        ("rate", s.rate.is_some(), &[ConstantArrivalRate]),
        ("start_rate", s.start_rate.is_some(), &[RampingArrivalRate]),
        (
            "pre_allocated_vus",
            s.pre_allocated_vus.is_some(),
            &[ConstantArrivalRate, RampingArrivalRate],
        ),
        (
            "time_unit",
            s.time_unit.is_some(),
            &[ConstantArrivalRate, RampingArrivalRate],
        ),
    ];

    for (field, present, allowed) in fields {
        if present && !allowed.contains(&kind) {
            return Err(Error::scenario(
                &s.name,
                format!("`{field}` is not valid for {kind}"),
            ));
        }
    }
    if s.max_vus.is_some() && !(kind.is_arrival_rate() || kind == ExternallyControlled) {
        return Err(Error::scenario(
            &s.name,
            format!("`max_vus` is not valid for {kind}"),
        ));
    }
    Ok(())
}

fn arrival_vus(s: &ScenarioOptions) -> Result<(u64, u64)> {
    let pre_allocated_vus = positive(&s.name, "pre_allocated_vus", s.pre_allocated_vus.unwrap_or(1))?;
    let max_vus = s.max_vus.unwrap_or(pre_allocated_vus);
    if max_vus < pre_allocated_vus {
        return Err(Error::scenario(&s.name, "`max_vus` must be >= `pre_allocated_vus`"));
    }
    Ok((pre_allocated_vus, max_vus))
}

fn validate_stages(scenario: &str, stages: &[Stage]) -> Result<()> {
    if stages.is_empty() {
        return Err(Error::scenario(
            scenario,
            "`stages` must be a non-empty array of { duration, target }",
        ));
    }
    if total_duration(stages).is_zero() {
        return Err(Error::scenario(scenario, "total `stages` duration must be positive"));
    }
    Ok(())
}

fn positive(scenario: &str, field: &str, v: u64) -> Result<u64> {
    if v == 0 {
        return Err(Error::scenario(
            scenario,
            format!("`{field}` must be a positive integer"),
        ));
    }
    Ok(v)
}

fn positive_duration(scenario: &str, field: &str, d: Duration) -> Result<Duration> {
    if d.is_zero() {
        return Err(Error::scenario(
            scenario,
            format!("`{field}` must be a positive duration"),
        ));
    }
    Ok(d)
}

fn required_duration(scenario: &str, field: &str, d: Option<Duration>) -> Result<Duration> {
    let d = d.ok_or_else(|| Error::scenario(scenario, format!("`{field}` is required")))?;
    positive_duration(scenario, field, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(name: &str, executor: &str) -> ScenarioOptions {
        ScenarioOptions {
            name: name.to_string(),
            executor: Some(executor.to_string()),
            ..ScenarioOptions::default()
        }
    }

    fn resolve(opts: &RunOptions, cfg: &RunConfig) -> Vec<ScenarioConfig> {
        scenarios_from_options(opts, cfg).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn executor_kind_strings() {
        assert_eq!(
            "ramping-arrival-rate".parse::<ExecutorKind>().ok(),
            Some(ExecutorKind::RampingArrivalRate)
        );
        assert_eq!(ExecutorKind::PerVuIterations.to_string(), "per-vu-iterations");
        assert!("constant".parse::<ExecutorKind>().is_err());
    }

    #[test]
    fn no_options_means_one_vu_one_iteration() {
        let out = resolve(&RunOptions::default(), &RunConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(&*out[0].name, DEFAULT_SCENARIO);
        assert_eq!(&*out[0].exec, DEFAULT_EXEC);
        assert_eq!(
            out[0].executor,
            ExecutorConfig::PerVuIterations {
                vus: 1,
                iterations: 1,
                max_duration: DEFAULT_MAX_DURATION,
            }
        );
    }

    #[test]
    fn shortcut_precedence() {
        let opts = RunOptions {
            vus: Some(3),
            iterations: Some(10),
            duration: Some(Duration::from_secs(5)),
            ..RunOptions::default()
        };
        let out = resolve(&opts, &RunConfig::default());
        assert_eq!(
            out[0].executor,
            ExecutorConfig::SharedIterations {
                vus: 3,
                iterations: 10,
                max_duration: Duration::from_secs(5),
            }
        );

        let opts = RunOptions {
            vus: Some(2),
            duration: Some(Duration::from_secs(5)),
            ..RunOptions::default()
        };
        assert_eq!(
            resolve(&opts, &RunConfig::default())[0].executor,
            ExecutorConfig::ConstantVus {
                vus: 2,
                duration: Duration::from_secs(5),
            }
        );

        let opts = RunOptions {
            stages: vec![Stage::new(Duration::from_secs(1), 4)],
            ..RunOptions::default()
        };
        assert_eq!(
            resolve(&opts, &RunConfig::default())[0].executor.kind(),
            ExecutorKind::RampingVus
        );
    }

    #[test]
    fn cli_overrides_replace_scenarios_and_stages() {
        let opts = RunOptions {
            stages: vec![Stage::new(Duration::from_secs(1), 4)],
            scenarios: vec![scenario("a", "constant-vus")],
            ..RunOptions::default()
        };
        let cfg = RunConfig {
            vus: Some(5),
            duration: Some(Duration::from_secs(2)),
            ..RunConfig::default()
        };
        let out = resolve(&opts, &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(&*out[0].name, DEFAULT_SCENARIO);
        assert_eq!(
            out[0].executor,
            ExecutorConfig::ConstantVus {
                vus: 5,
                duration: Duration::from_secs(2),
            }
        );
    }

    #[test]
    fn stages_conflict_with_other_shortcuts() {
        let opts = RunOptions {
            duration: Some(Duration::from_secs(5)),
            stages: vec![Stage::new(Duration::from_secs(1), 4)],
            ..RunOptions::default()
        };
        assert!(scenarios_from_options(&opts, &RunConfig::default()).is_err());
    }

    #[test]
    fn scenario_names_are_validated() {
        for bad in ["", "has space", "dots.not.allowed"] {
            let opts = RunOptions {
                scenarios: vec![scenario(bad, "per-vu-iterations")],
                ..RunOptions::default()
            };
            assert!(
                matches!(
                    scenarios_from_options(&opts, &RunConfig::default()),
                    Err(Error::InvalidScenarioName(_))
                ),
                "{bad:?}"
            );
        }

        let opts = RunOptions {
            scenarios: vec![
                scenario("sc-1", "per-vu-iterations"),
                scenario("sc-1", "per-vu-iterations"),
            ],
            ..RunOptions::default()
        };
        assert!(matches!(
            scenarios_from_options(&opts, &RunConfig::default()),
            Err(Error::DuplicateScenario(_))
        ));
    }

    #[test]
    fn executor_specific_validation() {
        let run = |s: ScenarioOptions| {
            scenarios_from_options(
                &RunOptions {
                    scenarios: vec![s],
                    ..RunOptions::default()
                },
                &RunConfig::default(),
            )
        };

        let mut s = scenario("a", "constant-vus");
        assert!(run(s.clone()).is_err(), "duration is required");
        s.duration = Some(Duration::from_secs(1));
        assert!(run(s.clone()).is_ok());
        s.iterations = Some(3);
        assert!(run(s).is_err(), "iterations is foreign to constant-vus");

        let mut s = scenario("a", "constant-arrival-rate");
        s.rate = Some(10);
        s.duration = Some(Duration::from_secs(1));
        s.pre_allocated_vus = Some(4);
        s.max_vus = Some(2);
        assert!(run(s.clone()).is_err(), "max_vus below pre_allocated_vus");
        s.max_vus = None;
        let out = run(s).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(out[0].executor.max_vus(), 4);

        let mut s = scenario("a", "ramping-vus");
        s.start_vus = Some(0);
        s.stages = vec![Stage::new(Duration::from_secs(1), 0)];
        assert!(run(s).is_err(), "ramping to zero everywhere");

        assert!(matches!(
            run(scenario("a", "warp-speed")),
            Err(Error::UnknownExecutor { .. })
        ));
    }

    #[test]
    fn shared_iterations_clamps_vus() {
        let mut s = scenario("a", "shared-iterations");
        s.vus = Some(10);
        s.iterations = Some(3);
        let out = resolve(
            &RunOptions {
                scenarios: vec![s],
                ..RunOptions::default()
            },
            &RunConfig::default(),
        );
        assert_eq!(out[0].executor.max_vus(), 3);
    }

    #[test]
    fn externally_controlled_zero_duration_is_unbounded() {
        let mut s = scenario("a", "externally-controlled");
        s.vus = Some(2);
        s.max_vus = Some(5);
        s.duration = Some(Duration::ZERO);
        let out = resolve(
            &RunOptions {
                scenarios: vec![s],
                ..RunOptions::default()
            },
            &RunConfig::default(),
        );
        assert_eq!(out[0].executor.scheduled_duration(), None);
        assert_eq!(out[0].executor.initial_vus(), 2);
    }

    #[test]
    fn plan_parses_thresholds() {
        let opts = RunOptions {
            thresholds: vec![crate::config::ThresholdSetOptions {
                selector: "iterations".to_string(),
                thresholds: vec![crate::config::ThresholdOptions::new("count > 0")],
            }],
            ..RunOptions::default()
        };
        let plan = RunPlan::from_options(&opts, &RunConfig::default())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.thresholds.len(), 1);
        assert_eq!(plan.bus_capacity, DEFAULT_BUS_CAPACITY);
        assert!(plan.scenario(DEFAULT_SCENARIO).is_some());
    }
}
