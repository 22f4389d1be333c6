//! The metrics engine: the only consumer of the sample bus and the only writer of sinks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;
use stampede_metrics::{
    MetricId, MetricKind, Registry, Sample, SampleReceiver, Selector, Sink, TagSet,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::RunClock;
use crate::error::Result;
use crate::signal::{RunSignals, StopReason};
use crate::summary::{MetricSummary, MetricsSummary, ThresholdSummary};
use crate::thresholds::ThresholdSet;
use crate::thresholds_eval::{ThresholdSetResult, abort_trigger, evaluate_set};

/// Samples handled per wake-up before the engine yields to its tick.
const MAX_BATCH: usize = 1024;

/// Sink for a submetric selected by a threshold.
struct Submetric {
    selector: Selector,
    filter: TagSet,
    /// Created with the parent's kind on its first sample.
    sink: Option<Sink>,
}

struct MetricEntry {
    sink: Sink,
    /// Indices into `EngineState::submetrics` whose parent is this metric.
    submetrics: Vec<usize>,
}

/// Where a threshold set reads its values from.
enum Target {
    Metric(String),
    Submetric(usize),
}

struct EngineState {
    registry: Arc<Registry>,
    metrics: AHashMap<MetricId, MetricEntry>,
    submetrics: Vec<Submetric>,
    sets: Vec<ThresholdSet>,
    targets: Vec<Target>,
}

impl EngineState {
    fn new(registry: Arc<Registry>, sets: Vec<ThresholdSet>) -> Self {
        let mut submetrics: Vec<Submetric> = Vec::new();
        let targets = sets
            .iter()
            .map(|set| {
                if !set.selector.is_submetric() {
                    return Target::Metric(set.selector.metric.clone());
                }
                let idx = submetrics.len();
                submetrics.push(Submetric {
                    filter: set.selector.tag_filter(&registry),
                    selector: set.selector.clone(),
                    sink: None,
                });
                Target::Submetric(idx)
            })
            .collect();

        Self {
            registry,
            metrics: AHashMap::new(),
            submetrics,
            sets,
            targets,
        }
    }

    fn ingest(&mut self, sample: Sample) {
        let Self {
            registry,
            metrics,
            submetrics,
            ..
        } = self;

        let entry = match metrics.entry(sample.metric) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let Some(def) = registry.def(sample.metric) else {
                    tracing::debug!(metric = ?sample.metric, "sample for unknown metric");
                    return;
                };
                let mut routes = Vec::new();
                for (idx, sub) in submetrics.iter_mut().enumerate() {
                    if sub.selector.metric == *def.name {
                        sub.sink.get_or_insert_with(|| Sink::new(def.kind));
                        routes.push(idx);
                    }
                }
                e.insert(MetricEntry {
                    sink: Sink::new(def.kind),
                    submetrics: routes,
                })
            }
        };

        entry.sink.add(sample.value);
        for &idx in &entry.submetrics {
            let sub = &mut submetrics[idx];
            if !sample.tags.matches(&sub.filter) {
                continue;
            }
            if let Some(sink) = sub.sink.as_mut() {
                sink.add(sample.value);
            }
        }
    }

    /// Sink a threshold set reads. A registered metric without samples reads as an empty
    /// sink; an unknown metric has none.
    fn sink_for(&self, target: &Target, metric: &str) -> Option<Sink> {
        let (id, kind) = self.registry.lookup(metric)?;
        let sink = match target {
            Target::Metric(_) => self.metrics.get(&id).map(|e| e.sink.clone()),
            Target::Submetric(idx) => self.submetrics[*idx].sink.clone(),
        };
        Some(sink.unwrap_or_else(|| Sink::new(kind)))
    }

    fn evaluate(&self, run_elapsed: Duration) -> Vec<ThresholdSetResult> {
        self.sets
            .iter()
            .zip(&self.targets)
            .map(|(set, target)| {
                let sink = self.sink_for(target, &set.selector.metric);
                evaluate_set(set, sink.as_ref(), run_elapsed)
            })
            .collect()
    }

    fn summary(&self, run_elapsed: Duration, results: &[ThresholdSetResult]) -> MetricsSummary {
        let mut out = MetricsSummary::default();

        for (id, def) in self.registry.defs() {
            let Some(entry) = self.metrics.get(&id) else {
                continue;
            };
            out.metrics.insert(
                def.name.to_string(),
                metric_summary(&entry.sink, run_elapsed),
            );
        }

        for ((set, target), result) in self.sets.iter().zip(&self.targets).zip(results) {
            let key = set.selector.to_string();
            let thresholds: BTreeMap<String, ThresholdSummary> = result
                .thresholds
                .iter()
                .map(|t| (t.expression.clone(), ThresholdSummary { ok: t.ok }))
                .collect();

            out.metrics
                .entry(key)
                .or_insert_with(|| match self.sink_for(target, &set.selector.metric) {
                    Some(sink) => metric_summary(&sink, run_elapsed),
                    // Never registered: only the failed thresholds are reported.
                    None => MetricSummary {
                        kind: "unknown".to_string(),
                        values: BTreeMap::new(),
                        thresholds: BTreeMap::new(),
                    },
                })
                .thresholds
                .extend(thresholds);
        }

        out
    }
}

fn metric_summary(sink: &Sink, run_elapsed: Duration) -> MetricSummary {
    let kind: MetricKind = sink.kind();
    MetricSummary {
        kind: kind.to_string(),
        values: sink
            .values(run_elapsed)
            .entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        thresholds: BTreeMap::new(),
    }
}

#[derive(Debug, Clone)]
pub struct EngineReport {
    pub summary: MetricsSummary,
    pub thresholds: Vec<ThresholdSetResult>,
}

/// Latest threshold results, refreshed on every evaluation tick.
pub type LiveThresholds = Arc<Mutex<Vec<ThresholdSetResult>>>;

pub struct MetricsEngine {
    state: EngineState,
    rx: SampleReceiver,
    clock: RunClock,
    signals: RunSignals,
    interval: Duration,
    live: LiveThresholds,
    drain: CancellationToken,
}

impl MetricsEngine {
    pub fn new(
        registry: Arc<Registry>,
        rx: SampleReceiver,
        thresholds: Vec<ThresholdSet>,
        clock: RunClock,
        signals: RunSignals,
        interval: Duration,
    ) -> Self {
        Self {
            state: EngineState::new(registry, thresholds),
            rx,
            clock,
            signals,
            interval,
            live: Arc::new(Mutex::new(Vec::new())),
            drain: CancellationToken::new(),
        }
    }

    /// Publish every evaluation into `live` as well.
    #[must_use]
    pub fn with_live_thresholds(mut self, live: LiveThresholds) -> Self {
        self.live = live;
        self
    }

    pub fn spawn(self) -> EngineHandle {
        let drain = self.drain.clone();
        let join = tokio::spawn(self.run());
        EngineHandle { join, drain }
    }

    async fn run(mut self) -> EngineReport {
        let mut tick =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let evaluate_live = !self.state.sets.is_empty();
        let mut closing = false;

        loop {
            tokio::select! {
                biased;
                _ = tick.tick(), if evaluate_live => self.evaluate_live(),
                _ = self.drain.cancelled(), if !closing => {
                    // Producers still holding a sender see the bus as closed; what is
                    // already queued is still delivered.
                    closing = true;
                    self.rx.close();
                }
                sample = self.rx.recv() => {
                    let Some(sample) = sample else { break };
                    self.state.ingest(sample);
                    for _ in 1..MAX_BATCH {
                        let Some(sample) = self.rx.try_recv() else { break };
                        self.state.ingest(sample);
                    }
                }
            }
        }

        let elapsed = self.clock.elapsed();
        let thresholds = self.state.evaluate(elapsed);
        *self.live.lock() = thresholds.clone();
        let summary = self.state.summary(elapsed, &thresholds);
        tracing::debug!(metrics = summary.metrics.len(), "metrics engine drained");
        EngineReport {
            summary,
            thresholds,
        }
    }

    fn evaluate_live(&mut self) {
        let elapsed = self.clock.elapsed();
        let results = self.state.evaluate(elapsed);

        let trigger = abort_trigger(&self.state.sets, &results, elapsed);
        if let Some((selector, expression)) = trigger.filter(|_| !self.signals.is_stopped()) {
            tracing::warn!(selector, expression, "threshold crossed, aborting run");
            self.signals.stop(StopReason::ThresholdAbort {
                selector: selector.to_string(),
                expression: expression.to_string(),
            });
        }

        *self.live.lock() = results;
    }
}

pub struct EngineHandle {
    join: JoinHandle<EngineReport>,
    drain: CancellationToken,
}

impl EngineHandle {
    /// Close the bus, consume what is queued, run the final threshold evaluation.
    pub async fn finish(self) -> Result<EngineReport> {
        self.drain.cancel();
        Ok(self.join.await?)
    }
}
