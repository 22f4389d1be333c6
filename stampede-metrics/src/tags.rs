use crate::key::KeyId;
use smallvec::SmallVec;

/// Interned tag pairs, sorted by `(key, value)` and unique per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // SmallVec to avoid allocation for small tag sets (usually < 4)
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    pub fn from_sorted_iter(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }

    /// Build from arbitrary pairs; later pairs win when a key repeats.
    pub fn from_pairs(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut out = Self::default();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn contains(&self, key: KeyId, value: KeyId) -> bool {
        self.get(key) == Some(value)
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let slice: &[(KeyId, KeyId)] = &self.tags;
        let idx = slice.partition_point(|(k, _)| *k < key);
        slice.get(idx).and_then(|(k, v)| (*k == key).then_some(*v))
    }

    /// Set `key` to `value`, replacing any previous value for that key.
    pub fn insert(&mut self, key: KeyId, value: KeyId) {
        let idx = self.tags.partition_point(|(k, _)| *k < key);
        match self.tags.get_mut(idx) {
            Some(slot) if slot.0 == key => slot.1 = value,
            _ => self.tags.insert(idx, (key, value)),
        }
    }

    #[must_use]
    pub fn with(mut self, key: KeyId, value: KeyId) -> Self {
        self.insert(key, value);
        self
    }

    /// True when every pair of `filter` is present in `self` (exact match).
    pub fn matches(&self, filter: &TagSet) -> bool {
        filter.iter().all(|(k, v)| self.contains(k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagset_contains_and_get() {
        let a = KeyId::from(1);
        let b = KeyId::from(2);
        let c = KeyId::from(3);

        let set = TagSet::from_sorted_iter([(a, b), (c, a)]);
        assert!(set.contains(a, b));
        assert!(!set.contains(a, a));
        assert_eq!(set.get(a), Some(b));
        assert_eq!(set.get(c), Some(a));
        assert_eq!(set.get(b), None);
    }

    #[test]
    fn insert_keeps_order_and_replaces_existing_key() {
        let k1 = KeyId::from(1);
        let k2 = KeyId::from(2);
        let k3 = KeyId::from(3);
        let v = KeyId::from(10);
        let w = KeyId::from(11);

        let set = TagSet::default().with(k3, v).with(k1, v).with(k2, v).with(k3, w);
        let pairs: Vec<_> = set.iter().collect();
        assert_eq!(pairs, vec![(k1, v), (k2, v), (k3, w)]);
    }

    #[test]
    fn matches_requires_every_filter_pair() {
        let scenario = KeyId::from(1);
        let status = KeyId::from(2);
        let sc1 = KeyId::from(10);
        let sc2 = KeyId::from(11);
        let ok = KeyId::from(12);

        let tags = TagSet::from_pairs([(scenario, sc1), (status, ok)]);
        assert!(tags.matches(&TagSet::default()));
        assert!(tags.matches(&TagSet::from_pairs([(scenario, sc1)])));
        assert!(!tags.matches(&TagSet::from_pairs([(scenario, sc2)])));
        assert!(!tags.matches(&TagSet::from_pairs([(scenario, sc1), (status, sc2)])));
    }
}
