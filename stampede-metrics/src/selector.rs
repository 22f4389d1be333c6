use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::registry::{Registry, is_valid_metric_name};
use crate::tags::TagSet;

/// `metric` or `metric{tag:value,...}`.
///
/// The filter is kept sorted by key so two spellings of the same submetric compare
/// equal and render identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector {
    pub metric: String,
    pub filter: Vec<(String, String)>,
}

impl Selector {
    pub fn metric(name: impl Into<String>) -> Self {
        Self {
            metric: name.into(),
            filter: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSelector {
            selector: raw.to_string(),
            reason: reason.to_string(),
        };

        let raw_trim = raw.trim();
        let (name, body) = match raw_trim.find('{') {
            None => (raw_trim, None),
            Some(open) => {
                let Some(inner) = raw_trim[open + 1..].strip_suffix('}') else {
                    return Err(invalid("missing closing `}`"));
                };
                (raw_trim[..open].trim(), Some(inner))
            }
        };

        if !is_valid_metric_name(name) {
            return Err(invalid("invalid metric name"));
        }

        let mut filter: Vec<(String, String)> = Vec::new();
        if let Some(body) = body {
            for part in body.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let Some((k, v)) = part.split_once([':', '=']) else {
                    return Err(invalid("tag filter must be `key:value`"));
                };
                let k = unquote(k.trim());
                let v = unquote(v.trim());
                if k.is_empty() {
                    return Err(invalid("empty tag key"));
                }
                match filter.iter_mut().find(|(ek, _)| ek == k) {
                    Some(slot) => slot.1 = v.to_string(),
                    None => filter.push((k.to_string(), v.to_string())),
                }
            }
            if filter.is_empty() {
                return Err(invalid("empty tag filter"));
            }
        }
        filter.sort();

        Ok(Self {
            metric: name.to_string(),
            filter,
        })
    }

    pub fn is_submetric(&self) -> bool {
        !self.filter.is_empty()
    }

    /// Intern the filter once so the engine can match samples without touching strings.
    pub fn tag_filter(&self, registry: &Registry) -> TagSet {
        TagSet::from_pairs(
            self.filter
                .iter()
                .map(|(k, v)| (registry.resolve_key(k), registry.resolve_key(v))),
        )
    }
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.metric)?;
        if self.filter.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (idx, (k, v)) in self.filter.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}:{v}")?;
        }
        f.write_str("}")
    }
}
