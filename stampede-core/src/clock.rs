use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct ClockState {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

#[derive(Debug)]
struct ClockInner {
    state: Mutex<ClockState>,
    paused: watch::Sender<bool>,
}

/// Run time that stands still while the run is paused.
///
/// Every schedule (durations, stage progress, arrival times, start offsets) is measured
/// against this clock, so pausing shifts the whole remaining run instead of skipping it.
#[derive(Debug, Clone)]
pub struct RunClock {
    inner: Arc<ClockInner>,
}

impl Default for RunClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RunClock {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClockInner {
                state: Mutex::new(ClockState::default()),
                paused,
            }),
        }
    }

    /// Start counting. Idempotent.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.started.is_none() {
            let now = Instant::now();
            state.started = Some(now);
            if *self.inner.paused.borrow() {
                state.paused_at = Some(now);
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        let state = self.inner.state.lock();
        let Some(started) = state.started else {
            return Duration::ZERO;
        };
        let now = state.paused_at.unwrap_or_else(Instant::now);
        now.saturating_duration_since(started)
            .saturating_sub(state.paused_total)
    }

    /// Returns `false` when already paused.
    pub fn pause(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *self.inner.paused.borrow() {
            return false;
        }
        if state.started.is_some() {
            state.paused_at = Some(Instant::now());
        }
        self.inner.paused.send_replace(true);
        true
    }

    /// Returns `false` when not paused.
    pub fn resume(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !*self.inner.paused.borrow() {
            return false;
        }
        if let Some(at) = state.paused_at.take() {
            state.paused_total = state.paused_total.saturating_add(at.elapsed());
        }
        self.inner.paused.send_replace(false);
        true
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Resolves once the pause state differs from `paused`.
    pub async fn wait_pause_change(&self, paused: bool) {
        let mut rx = self.inner.paused.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|p| *p != paused).await;
    }

    /// Sleep until the run clock reads `at`. Time spent paused does not count.
    pub async fn sleep_until(&self, at: Duration) {
        let mut rx = self.inner.paused.subscribe();
        loop {
            if *rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    return;
                }
                continue;
            }

            let remaining = at.saturating_sub(self.elapsed());
            if remaining.is_zero() {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    pub async fn sleep(&self, d: Duration) {
        let at = self.elapsed().saturating_add(d);
        self.sleep_until(at).await;
    }
}
