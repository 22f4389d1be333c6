use std::time::Duration;

pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(600);
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_THRESHOLD_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_VUS_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Run-shape overrides from the command line. Any field set replaces the configured
/// scenarios with a single `default` scenario.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub iterations: Option<u64>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
}

impl RunConfig {
    pub fn is_set(&self) -> bool {
        self.iterations.is_some() || self.vus.is_some() || self.duration.is_some()
    }
}

/// Raw scenario definition, as written by the user. Validated into a
/// [`crate::ScenarioConfig`] by [`crate::scenarios_from_options`].
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub name: String,

    /// Executor kind string, e.g. `constant-vus`. Required.
    pub executor: Option<String>,

    /// Script entry point; defaults to `default`.
    pub exec: Option<String>,

    /// Extra tags attached to every sample of this scenario.
    pub tags: Vec<(String, String)>,

    pub start_time: Option<Duration>,
    pub graceful_stop: Option<Duration>,
    pub iteration_timeout: Option<Duration>,
    pub abort_on_error: bool,

    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub max_duration: Option<Duration>,

    // ramping-vus
    pub start_vus: Option<u64>,
    pub graceful_ramp_down: Option<Duration>,
    pub stages: Vec<Stage>,

    // arrival-rate
    pub rate: Option<u64>,
    pub start_rate: Option<u64>,
    pub time_unit: Option<Duration>,
    pub pre_allocated_vus: Option<u64>,
    pub max_vus: Option<u64>,
}

/// One expression attached to a selector.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOptions {
    pub expression: String,
    pub abort_on_fail: bool,
    pub delay_abort_eval: Option<Duration>,
}

impl ThresholdOptions {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            abort_on_fail: false,
            delay_abort_eval: None,
        }
    }

    #[must_use]
    pub fn abort_on_fail(mut self, delay: Option<Duration>) -> Self {
        self.abort_on_fail = true;
        self.delay_abort_eval = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSetOptions {
    /// `metric` or `metric{tag:value,...}`.
    pub selector: String,
    pub thresholds: Vec<ThresholdOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    // Shortcuts, used only when `scenarios` is empty (or CLI overrides are set).
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub stages: Vec<Stage>,

    pub scenarios: Vec<ScenarioOptions>,
    pub thresholds: Vec<ThresholdSetOptions>,

    pub setup_timeout: Option<Duration>,
    pub teardown_timeout: Option<Duration>,

    /// Sample bus capacity; defaults to [`stampede_metrics::sample::DEFAULT_BUS_CAPACITY`].
    pub sample_bus_capacity: Option<usize>,
    pub threshold_interval: Option<Duration>,
    pub vus_sample_interval: Option<Duration>,
}
