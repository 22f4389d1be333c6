mod builtin_metrics;
mod clock;
mod config;
mod controller;
mod engine;
mod error;
mod executor;
mod iteration;
mod metrics_context;
mod plan;
mod pool;
mod schedule;
mod script;
mod signal;
mod summary;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use builtin_metrics::{
    BuiltinMetrics, DROPPED_ITERATIONS, INTERRUPTED_ITERATIONS, ITERATION_DURATION,
    ITERATION_ERRORS, ITERATIONS, VUS, VUS_MAX,
};
pub use clock::RunClock;
pub use config::{
    RunConfig, RunOptions, ScenarioOptions, Stage, ThresholdOptions, ThresholdSetOptions,
};
pub use controller::{RunController, RunHandle, RunProgress, ScenarioStatus};
pub use engine::{EngineHandle, EngineReport, LiveThresholds, MetricsEngine};
pub use error::{Error, Result};
pub use executor::{
    ExecutorProgress, ExecutorState, ExternalParams, ExternalUpdate, ScenarioProgress,
};
pub use iteration::{InterruptCause, IterationOutcome};
pub use metrics_context::MetricsContext;
pub use plan::{
    DEFAULT_EXEC, DEFAULT_SCENARIO, ExecutorConfig, ExecutorKind, RunPlan, ScenarioConfig,
    scenarios_from_options,
};
pub use pool::VuPool;
pub use schedule::{ArrivalSchedule, RampingSchedule};
pub use script::{Script, ScriptError, ScriptVu, SetupData, VuInit};
pub use signal::{RunSignals, StopReason};
pub use summary::{
    MetricSummary, MetricsSummary, RunReport, RunStatus, ScenarioReport, ThresholdSummary,
};
pub use thresholds::{
    ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdSet, parse_threshold_expr,
    parse_threshold_sets,
};
pub use thresholds_eval::{ThresholdResult, ThresholdSetResult};
pub use vu::{IterationContext, LifecycleContext, Vu, VuState};

pub use stampede_metrics as metrics;
pub use stampede_metrics::MetricKind;
