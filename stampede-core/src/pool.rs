use std::collections::VecDeque;

use crate::script::ScriptVu;
use crate::vu::{Vu, VuState};

/// Idle VUs of one scenario.
///
/// Borrowing never waits: the caller gets a VU or `None` and decides whether to wait,
/// skip or drop. Only the owning executor loop touches the pool.
#[derive(Debug)]
pub struct VuPool<V> {
    idle: VecDeque<Vu<V>>,
    allocated: u64,
    initializing: u64,
    max: u64,
}

impl<V: ScriptVu> VuPool<V> {
    pub fn new(max: u64) -> Self {
        Self {
            idle: VecDeque::new(),
            allocated: 0,
            initializing: 0,
            max,
        }
    }

    /// Take the longest-idle VU.
    pub fn try_borrow(&mut self) -> Option<Vu<V>> {
        let mut vu = self.idle.pop_front()?;
        vu.state = VuState::Active;
        Some(vu)
    }

    /// Take the first idle VU matching `pred`.
    pub fn try_borrow_where(&mut self, pred: impl Fn(&Vu<V>) -> bool) -> Option<Vu<V>> {
        let idx = self.idle.iter().position(pred)?;
        let mut vu = self.idle.remove(idx)?;
        vu.state = VuState::Active;
        Some(vu)
    }

    /// Return a VU: per-iteration state is reset, one-time setup is kept.
    pub fn give_back(&mut self, mut vu: Vu<V>) {
        vu.inner.reset();
        vu.state = VuState::Idle;
        self.idle.push_back(vu);
    }

    /// Add a freshly initialised VU.
    pub fn add(&mut self, mut vu: Vu<V>) {
        vu.state = VuState::Idle;
        self.allocated = self.allocated.saturating_add(1);
        self.idle.push_back(vu);
    }

    /// A VU was lost (its iteration task died); frees its slot for lazy growth.
    pub fn forget(&mut self) {
        self.allocated = self.allocated.saturating_sub(1);
    }

    /// Reserve a slot for a VU that is being initialised. `false` when the pool is full.
    pub fn reserve(&mut self) -> bool {
        if self.allocated + self.initializing >= self.max {
            return false;
        }
        self.initializing += 1;
        true
    }

    /// Settle a reservation made with [`Self::reserve`].
    pub fn settle(&mut self, vu: Option<Vu<V>>) {
        self.initializing = self.initializing.saturating_sub(1);
        if let Some(vu) = vu {
            self.add(vu);
        }
    }

    pub fn set_max(&mut self, max: u64) {
        self.max = max;
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn initializing(&self) -> u64 {
        self.initializing
    }

    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn any_idle(&self, pred: impl Fn(&Vu<V>) -> bool) -> bool {
        self.idle.iter().any(pred)
    }

    /// Drop every idle VU (scenario teardown).
    pub fn drain(&mut self) -> usize {
        let n = self.idle.len();
        self.idle.clear();
        self.allocated = self.allocated.saturating_sub(n as u64);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptError;
    use crate::vu::IterationContext;

    #[derive(Debug, Default)]
    struct CountingVu {
        scratch: Vec<u32>,
        warmed: bool,
    }

    impl ScriptVu for CountingVu {
        async fn iteration(&mut self, _ctx: &IterationContext) -> Result<(), ScriptError> {
            self.scratch.push(1);
            Ok(())
        }

        fn reset(&mut self) {
            self.scratch.clear();
        }
    }

    fn vu(id: u64) -> Vu<CountingVu> {
        Vu::new(
            id,
            id,
            CountingVu {
                scratch: Vec::new(),
                warmed: true,
            },
        )
    }

    #[test]
    fn borrow_is_non_blocking_and_fifo() {
        let mut pool = VuPool::new(2);
        assert!(pool.try_borrow().is_none());

        pool.add(vu(1));
        pool.add(vu(2));
        let a = pool.try_borrow().unwrap_or_else(|| panic!("expected a VU"));
        assert_eq!(a.id(), 1);
        assert_eq!(a.state(), VuState::Active);
        let b = pool.try_borrow().unwrap_or_else(|| panic!("expected a VU"));
        assert_eq!(b.id(), 2);
        assert!(pool.try_borrow().is_none());
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn give_back_resets_transient_state_only() {
        let mut pool = VuPool::new(1);
        pool.add(vu(1));

        let mut v = pool.try_borrow().unwrap_or_else(|| panic!("expected a VU"));
        v.inner.scratch.push(7);
        v.state = VuState::Interrupted;
        pool.give_back(v);

        let v = pool.try_borrow().unwrap_or_else(|| panic!("expected a VU"));
        assert!(v.inner().scratch.is_empty());
        assert!(v.inner().warmed);
    }

    #[test]
    fn reserve_respects_max() {
        let mut pool: VuPool<CountingVu> = VuPool::new(2);
        pool.add(vu(1));
        assert!(pool.reserve());
        assert!(!pool.reserve());
        pool.settle(Some(vu(2)));
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.initializing(), 0);
        assert!(!pool.reserve());

        pool.set_max(3);
        assert!(pool.reserve());
        pool.settle(None);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn borrow_where_skips_non_matching() {
        let mut pool = VuPool::new(2);
        let mut first = vu(1);
        first.iterations = 3;
        pool.add(first);
        pool.add(vu(2));

        let v = pool
            .try_borrow_where(|v| v.iterations() < 3)
            .unwrap_or_else(|| panic!("expected a VU"));
        assert_eq!(v.id(), 2);
        assert!(pool.try_borrow_where(|v| v.iterations() < 3).is_none());
        assert_eq!(pool.idle(), 1);
    }
}
