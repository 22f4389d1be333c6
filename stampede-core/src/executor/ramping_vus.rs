use std::time::Duration;

use ahash::AHashMap;

use super::Dispatcher;
use crate::iteration::InterruptCause;
use crate::schedule::RampingSchedule;
use crate::script::Script;

/// Follow the stage curve: below target, idle VUs start iterations right away; above
/// target, VUs stop after their current iteration. VUs ramped down but still busy after
/// `graceful_ramp_down` are interrupted.
pub(super) async fn run<S: Script>(
    d: &mut Dispatcher<S>,
    schedule: &RampingSchedule,
    graceful_ramp_down: Duration,
) {
    let clock = d.clock().clone();
    let stop = d.stop_token().clone();
    let start = clock.elapsed();
    // vu id -> run-clock time at which it gets interrupted.
    let mut ramped_down: AHashMap<u64, Duration> = AHashMap::new();

    loop {
        if stop.is_cancelled() {
            return;
        }
        let paused = clock.is_paused();
        let now = clock.elapsed();
        let at = now.saturating_sub(start);
        if schedule.is_done(at) {
            return;
        }

        let target = usize::try_from(schedule.target_at(at)).unwrap_or(usize::MAX);
        if !paused {
            while d.inflight() < target {
                let Some(vu) = d.borrow() else { break };
                d.dispatch(vu);
            }
        }

        mark_excess(d, target, now, graceful_ramp_down, &mut ramped_down);
        ramped_down.retain(|vu_id, deadline| {
            if *deadline <= now {
                d.interrupt_vu(*vu_id, InterruptCause::RampDown);
                false
            } else {
                true
            }
        });

        let mut wake = schedule.next_recheck_in(at);
        if let Some(next) = ramped_down.values().min() {
            wake = wake.min(next.saturating_sub(now));
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = clock.sleep(wake) => {}
            Some(report) = d.join_next(), if d.inflight() > 0 => d.reclaim(report),
            _ = clock.wait_pause_change(paused) => {}
        }
    }
}

/// Keep exactly the in-flight VUs above `target` marked for ramp-down, highest scenario
/// index first. VUs that are needed again (target went back up) or already finished
/// lose their mark.
fn mark_excess<S: Script>(
    d: &Dispatcher<S>,
    target: usize,
    now: Duration,
    graceful_ramp_down: Duration,
    ramped_down: &mut AHashMap<u64, Duration>,
) {
    let mut inflight = d.inflight_vus();
    let excess = inflight.len().saturating_sub(target);
    if excess == 0 {
        ramped_down.clear();
        return;
    }

    inflight.sort_unstable_by(|a, b| b.1.cmp(&a.1));
    inflight.truncate(excess);

    ramped_down.retain(|vu_id, _| inflight.iter().any(|(id, _)| id == vu_id));
    for (vu_id, _) in inflight {
        ramped_down
            .entry(vu_id)
            .or_insert_with(|| now.saturating_add(graceful_ramp_down));
    }
}
