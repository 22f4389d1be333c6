use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::key::{Interner, KeyId};
use crate::metrics::MetricKind;
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(u32);

impl MetricId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct MetricDef {
    pub name: Arc<str>,
    pub kind: MetricKind,
}

#[derive(Debug, Default)]
struct Defs {
    by_name: HashMap<KeyId, MetricId>,
    defs: Vec<MetricDef>,
}

/// Metric identities plus the string interner shared by every tag set.
///
/// The registry only knows *what* metrics exist; aggregation state lives in the
/// metrics engine's sinks.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Defs>,
}

pub fn is_valid_metric_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 128 {
        return false;
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl Registry {
    /// Register a metric, or return the existing id when `name` is already known with the
    /// same kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        if !is_valid_metric_name(name) {
            return Err(Error::InvalidMetricName(name.to_string()));
        }

        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some(&id) = defs.by_name.get(&name_id) {
            let existing = defs.defs[id.index()].kind;
            if existing != kind {
                return Err(Error::KindMismatch {
                    name: name.to_string(),
                    existing,
                    requested: kind,
                });
            }
            return Ok(id);
        }

        let id = MetricId(defs.defs.len() as u32);
        defs.defs.push(MetricDef {
            name: Arc::from(name),
            kind,
        });
        defs.by_name.insert(name_id, id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.lookup(name)?;
        let defs = self.defs.read();
        let id = *defs.by_name.get(&name_id)?;
        Some((id, defs.defs[id.index()].kind))
    }

    pub fn def(&self, id: MetricId) -> Option<MetricDef> {
        self.defs.read().defs.get(id.index()).cloned()
    }

    pub fn kind(&self, id: MetricId) -> Option<MetricKind> {
        self.defs.read().defs.get(id.index()).map(|d| d.kind)
    }

    pub fn len(&self) -> usize {
        self.defs.read().defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered metrics in registration order.
    pub fn defs(&self) -> Vec<(MetricId, MetricDef)> {
        self.defs
            .read()
            .defs
            .iter()
            .enumerate()
            .map(|(idx, d)| (MetricId(idx as u32), d.clone()))
            .collect()
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_key_id(&self, id: KeyId) -> Option<Arc<str>> {
        self.interner.resolve(id)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    pub fn tags_to_strings(&self, tags: &TagSet) -> Vec<(String, String)> {
        tags.iter()
            .map(|(k, v)| {
                (
                    self.resolve_key_id(k)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    self.resolve_key_id(v)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                )
            })
            .collect()
    }
}
