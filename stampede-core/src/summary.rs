use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::executor::ScenarioProgress;
use crate::plan::ExecutorKind;
use crate::thresholds_eval::ThresholdSetResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdSummary {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub values: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, ThresholdSummary>,
}

/// End-of-run view of every metric and submetric, keyed by selector
/// (`iterations`, `iterations{scenario:sc1}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl MetricsSummary {
    pub fn get(&self, selector: &str) -> Option<&MetricSummary> {
        self.metrics.get(selector)
    }

    /// Shorthand for `get(selector).values[stat]`.
    pub fn value(&self, selector: &str, stat: &str) -> Option<f64> {
        self.metrics.get(selector)?.values.get(stat).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Passed,
    ThresholdsFailed,
    ThresholdsAborted,
    ScriptAborted,
    Stopped,
    SetupFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub executor: ExecutorKind,
    #[serde(flatten)]
    pub progress: ScenarioProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    /// Human-readable reason for a non-passing status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub scenarios: Vec<ScenarioReport>,
    pub thresholds: Vec<ThresholdSetResult>,
    #[serde(flatten)]
    pub summary: MetricsSummary,
}

impl RunReport {
    pub fn thresholds_ok(&self) -> bool {
        self.thresholds.iter().all(|t| t.ok)
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

pub(crate) mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }
}
