use std::time::Duration;

use super::Dispatcher;
use crate::script::Script;

/// Every VU runs exactly `iterations` iterations, or until `max_duration` runs out.
pub(super) async fn run_per_vu<S: Script>(
    d: &mut Dispatcher<S>,
    iterations: u64,
    max_duration: Duration,
) {
    let clock = d.clock().clone();
    let stop = d.stop_token().clone();
    let deadline = clock.elapsed().saturating_add(max_duration);

    loop {
        if stop.is_cancelled() {
            return;
        }
        let paused = clock.is_paused();
        if !paused && clock.elapsed() < deadline {
            while let Some(vu) = d.borrow_where(|v| v.iterations() < iterations) {
                d.dispatch(vu);
            }
        }
        if d.inflight() == 0 && !d.pool().any_idle(|v| v.iterations() < iterations) {
            return;
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = clock.sleep_until(deadline) => {
                tracing::debug!(scenario = d.scenario_name(), "max_duration reached");
                return;
            }
            Some(report) = d.join_next(), if d.inflight() > 0 => d.reclaim(report),
            _ = clock.wait_pause_change(paused) => {}
        }
    }
}

/// `iterations` shared by all VUs: whichever VU is free takes the next one.
pub(super) async fn run_shared<S: Script>(
    d: &mut Dispatcher<S>,
    iterations: u64,
    max_duration: Duration,
) {
    let clock = d.clock().clone();
    let stop = d.stop_token().clone();
    let deadline = clock.elapsed().saturating_add(max_duration);
    let mut remaining = iterations;

    loop {
        if stop.is_cancelled() {
            return;
        }
        let paused = clock.is_paused();
        if !paused && clock.elapsed() < deadline {
            while remaining > 0 {
                let Some(vu) = d.borrow() else { break };
                remaining -= 1;
                d.dispatch(vu);
            }
        }
        if remaining == 0 && d.inflight() == 0 {
            return;
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = clock.sleep_until(deadline) => {
                tracing::debug!(scenario = d.scenario_name(), remaining, "max_duration reached");
                return;
            }
            Some(report) = d.join_next(), if d.inflight() > 0 => d.reclaim(report),
            _ = clock.wait_pause_change(paused) => {}
        }
    }
}
