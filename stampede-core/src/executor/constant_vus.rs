use std::time::Duration;

use super::Dispatcher;
use crate::script::Script;

/// Keep every VU busy until `duration` has passed on the run clock.
pub(super) async fn run<S: Script>(d: &mut Dispatcher<S>, duration: Duration) {
    let clock = d.clock().clone();
    let stop = d.stop_token().clone();
    let end = clock.elapsed().saturating_add(duration);

    loop {
        if stop.is_cancelled() {
            return;
        }
        let paused = clock.is_paused();
        if !paused && clock.elapsed() < end {
            while let Some(vu) = d.borrow() {
                d.dispatch(vu);
            }
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = clock.sleep_until(end) => return,
            Some(report) = d.join_next(), if d.inflight() > 0 => d.reclaim(report),
            _ = clock.wait_pause_change(paused) => {}
        }
    }
}
