use std::sync::Arc;

use stampede_metrics::{MetricId, MetricKind, Registry, Sample, SampleSender, TagSet};

/// Everything a sample producer needs: the registry for tag interning, the bus, and the
/// base tags (`scenario` plus scenario-level tags) merged into every sample.
#[derive(Debug, Clone)]
pub struct MetricsContext {
    registry: Arc<Registry>,
    samples: SampleSender,
    scenario: Option<Arc<str>>,
    base_tags: TagSet,
}

impl MetricsContext {
    /// Context for a scenario; `scenario=<name>` is always present and cannot be overridden.
    pub fn for_scenario(
        registry: Arc<Registry>,
        samples: SampleSender,
        scenario: Arc<str>,
        scenario_tags: &[(String, String)],
    ) -> Self {
        let mut base_tags = TagSet::from_pairs(
            scenario_tags
                .iter()
                .map(|(k, v)| (registry.resolve_key(k), registry.resolve_key(v))),
        );
        base_tags.insert(registry.resolve_key("scenario"), registry.resolve_key(&scenario));

        Self {
            registry,
            samples,
            scenario: Some(scenario),
            base_tags,
        }
    }

    /// Context outside any scenario (setup, teardown, run-level gauges).
    pub fn unscoped(registry: Arc<Registry>, samples: SampleSender, tags: &[(&str, &str)]) -> Self {
        let base_tags = registry.resolve_tags(tags);
        Self {
            registry,
            samples,
            scenario: None,
            base_tags,
        }
    }

    #[must_use]
    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn base_tags(&self) -> &TagSet {
        &self.base_tags
    }

    /// Base tags plus `extra`. Extra tags win over scenario-level tags but never over
    /// `scenario`.
    pub fn tags_with(&self, extra: &[(&str, &str)]) -> TagSet {
        if extra.is_empty() {
            return self.base_tags.clone();
        }

        let mut tags = self.base_tags.clone();
        for (k, v) in extra {
            if self.scenario.is_some() && *k == "scenario" {
                continue;
            }
            tags.insert(self.registry.resolve_key(k), self.registry.resolve_key(v));
        }
        tags
    }

    /// Send one sample, waiting while the bus is full.
    pub async fn emit(
        &self,
        metric: MetricId,
        value: f64,
        extra: &[(&str, &str)],
    ) -> stampede_metrics::Result<()> {
        self.samples
            .send(Sample::new(metric, self.tags_with(extra), value))
            .await
    }

    /// Like [`Self::emit`], registering `name` on first use.
    pub async fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        extra: &[(&str, &str)],
    ) -> stampede_metrics::Result<()> {
        let metric = match self.registry.lookup(name) {
            Some((id, existing)) if existing == kind => id,
            _ => self.registry.register(name, kind)?,
        };
        self.emit(metric, value, extra).await
    }

    /// Non-waiting variant for control loops; returns `false` if the sample was not queued.
    pub fn try_emit(&self, metric: MetricId, value: f64, extra: &[(&str, &str)]) -> bool {
        self.samples
            .try_send(Sample::new(metric, self.tags_with(extra), value))
            .is_ok()
    }
}
