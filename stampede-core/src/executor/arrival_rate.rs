use super::Dispatcher;
use crate::schedule::ArrivalSchedule;
use crate::script::Script;

/// Open model: iterations start when the schedule says so, whether or not earlier ones
/// have finished. A due iteration with no idle VU is dropped; if the pool may still grow,
/// one more VU is initialised in the background for later ticks.
pub(super) async fn run<S: Script>(d: &mut Dispatcher<S>, schedule: &ArrivalSchedule) {
    let clock = d.clock().clone();
    let stop = d.stop_token().clone();
    let start = clock.elapsed();
    let end = start.saturating_add(schedule.total_duration());

    let mut n: u64 = 0;
    let mut next_due = schedule.time_of(0);

    loop {
        let wake = match next_due {
            Some(due) => start.saturating_add(due),
            None => end,
        };

        // A VU freed at the same instant a tick is due serves that tick: reclaims and
        // finished inits are handled before the tick fires.
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            Some(event) = d.next_event(), if d.inflight() > 0 || d.initializing() > 0 => {
                d.handle(event);
            }
            _ = clock.sleep_until(wake) => {
                if next_due.is_none() {
                    return;
                }
                match d.borrow() {
                    Some(vu) => d.dispatch(vu),
                    None => {
                        d.record_dropped();
                        d.spawn_vu_init();
                    }
                }
                n += 1;
                next_due = schedule.time_of(n);
            }
        }
    }
}
