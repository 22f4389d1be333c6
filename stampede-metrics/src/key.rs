use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned string id used for metric names, tag keys and tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Debug, Default)]
struct Strings {
    ids: HashMap<Arc<str>, KeyId>,
    values: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub struct Interner {
    inner: RwLock<Strings>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.lookup(s) {
            return id;
        }

        let mut inner = self.inner.write();
        // Another writer may have interned it between the read and write locks.
        if let Some(&id) = inner.ids.get(s) {
            return id;
        }

        let id = KeyId(inner.values.len() as u32);
        let s: Arc<str> = Arc::from(s);
        inner.values.push(s.clone());
        inner.ids.insert(s, id);
        id
    }

    /// Look a string up without interning it.
    pub fn lookup(&self, s: &str) -> Option<KeyId> {
        self.inner.read().ids.get(s).copied()
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.inner.read().values.get(id.0 as usize).cloned()
    }
}
