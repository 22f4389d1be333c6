use std::time::Duration;

use tokio::sync::watch;

use super::Dispatcher;
use crate::script::Script;

/// Current shape of an externally controlled scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalParams {
    pub vus: u64,
    pub max_vus: u64,
    /// Measured from the scenario start. `None` runs until stopped.
    pub duration: Option<Duration>,
}

/// Partial update; unset fields keep their current value. A zero `duration` means
/// "until stopped".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    pub vus: Option<u64>,
    pub max_vus: Option<u64>,
    pub duration: Option<Duration>,
}

impl ExternalParams {
    /// Apply `update`, rejecting shapes that could never be satisfied.
    pub fn apply(self, update: ExternalUpdate) -> Result<Self, String> {
        let next = Self {
            vus: update.vus.unwrap_or(self.vus),
            max_vus: update.max_vus.unwrap_or(self.max_vus),
            duration: match update.duration {
                Some(d) if d.is_zero() => None,
                Some(d) => Some(d),
                None => self.duration,
            },
        };
        if next.max_vus == 0 {
            return Err("`max_vus` must be a positive integer".to_string());
        }
        if next.vus > next.max_vus {
            return Err(format!(
                "`vus` ({}) must be <= `max_vus` ({})",
                next.vus, next.max_vus
            ));
        }
        Ok(next)
    }
}

/// Like constant-vus, except that the VU count, the pool ceiling and the duration are read
/// from `params` on every change. Lowering `vus` lets busy VUs finish their iteration.
pub(super) async fn run<S: Script>(d: &mut Dispatcher<S>, mut params: watch::Receiver<ExternalParams>) {
    let clock = d.clock().clone();
    let stop = d.stop_token().clone();
    let start = clock.elapsed();
    let mut updates_open = true;

    loop {
        if stop.is_cancelled() {
            return;
        }
        let p = *params.borrow_and_update();
        d.set_max_vus(p.max_vus);

        let end = p.duration.map(|dur| start.saturating_add(dur));
        if end.is_some_and(|end| clock.elapsed() >= end) {
            return;
        }

        let wanted = p.vus;
        while d.pool().allocated() + d.pool().initializing() < wanted {
            if !d.spawn_vu_init() {
                break;
            }
        }

        let paused = clock.is_paused();
        let target = usize::try_from(wanted).unwrap_or(usize::MAX);
        if !paused {
            while d.inflight() < target {
                let Some(vu) = d.borrow() else { break };
                d.dispatch(vu);
            }
        }

        let deadline = async {
            match end {
                Some(end) => clock.sleep_until(end).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = deadline => return,
            changed = params.changed(), if updates_open => {
                if changed.is_err() {
                    updates_open = false;
                } else {
                    tracing::info!(scenario = d.scenario_name(), params = ?*params.borrow(), "external update");
                }
            }
            Some(event) = d.next_event(), if d.inflight() > 0 || d.initializing() > 0 => {
                d.handle(event);
            }
            _ = clock.wait_pause_change(paused) => {}
        }
    }
}
