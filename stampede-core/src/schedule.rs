use std::time::Duration;

use crate::config::Stage;

/// Piecewise-linear target curve: starts at `start` and moves linearly to each stage's
/// `target` over that stage's duration.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampingSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }


    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn stage_index(&self, elapsed: Duration) -> usize {
        // Stage `i` covers `(end[i-1], end[i]]`; a boundary belongs to the stage it ends.
        self.cumulative_ends.partition_point(|end| *end < elapsed)
    }

    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        (
            stage_start,
            self.cumulative_ends[idx],
            start_target,
            self.stages[idx].target,
        )
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() || elapsed == Duration::ZERO {
            return self.start;
        }

        if elapsed >= self.total_duration() {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = self.stage_index(elapsed);
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        if stage_duration.is_zero() {
            return end_target;
        }
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_i = start_target as i128;
        let delta = end_target as i128 - start_i;
        let num = stage_elapsed.as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + (delta.saturating_mul(num) / den.max(1));
        cur.clamp(0, u64::MAX as i128) as u64
    }

    /// How long a control loop may sleep before the target can next change.
    pub fn next_recheck_in(&self, elapsed: Duration) -> Duration {
        const MAX_SLEEP: Duration = Duration::from_millis(50);

        let total = self.total_duration();
        if self.stages.is_empty() || elapsed >= total {
            return MAX_SLEEP;
        }

        let idx = self.stage_index(elapsed);
        let (_, stage_end, _, _) = self.stage_bounds(idx);
        stage_end
            .saturating_sub(elapsed)
            .clamp(Duration::from_millis(1), MAX_SLEEP)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateSegment {
    start: f64,
    duration: f64,
    /// Iterations per second at the segment's start and end.
    rate_start: f64,
    rate_end: f64,
    integral_start: f64,
    integral_end: f64,
}

/// Start times for an open-model executor.
///
/// The rate curve (iterations per `time_unit`) is piecewise linear; iteration `n`
/// (0-based) is due at the first instant the integral of the curve reaches `n`.
#[derive(Debug, Clone)]
pub struct ArrivalSchedule {
    segments: Vec<RateSegment>,
    total: Duration,
}

const INTEGRAL_EPSILON: f64 = 1e-9;

impl ArrivalSchedule {
    pub fn constant(rate: u64, time_unit: Duration, duration: Duration) -> Self {
        Self::ramping(rate, time_unit, vec![Stage::new(duration, rate)])
    }

    pub fn ramping(start_rate: u64, time_unit: Duration, stages: Vec<Stage>) -> Self {
        let unit = time_unit.as_secs_f64().max(f64::MIN_POSITIVE);
        let mut segments = Vec::with_capacity(stages.len());
        let mut at = 0.0;
        let mut integral = 0.0;
        let mut prev = start_rate as f64 / unit;

        for stage in &stages {
            let duration = stage.duration.as_secs_f64();
            let next = stage.target as f64 / unit;
            let area = (prev + next) * 0.5 * duration;
            segments.push(RateSegment {
                start: at,
                duration,
                rate_start: prev,
                rate_end: next,
                integral_start: integral,
                integral_end: integral + area,
            });
            at += duration;
            integral += area;
            prev = next;
        }

        let total = stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
        Self { segments, total }
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Offset from the scenario start at which iteration `n` is due, or `None` when the
    /// schedule ends first.
    pub fn time_of(&self, n: u64) -> Option<Duration> {
        let want = n as f64;
        let idx = self
            .segments
            .partition_point(|s| s.integral_end <= want + INTEGRAL_EPSILON);
        let seg = self.segments.get(idx)?;

        let k = (want - seg.integral_start).max(0.0);
        if k == 0.0 {
            return Some(Duration::from_secs_f64(seg.start));
        }

        // integral(tau) = rate_start * tau + a * tau^2, solved for the smallest tau >= 0.
        let a = if seg.duration > 0.0 {
            (seg.rate_end - seg.rate_start) / (2.0 * seg.duration)
        } else {
            0.0
        };
        let b = seg.rate_start;
        let disc = b * b + 4.0 * a * k;
        if disc < 0.0 {
            return None;
        }
        let denom = b + disc.sqrt();
        if denom <= 0.0 {
            return None;
        }
        let tau = (2.0 * k / denom).min(seg.duration);

        let at = Duration::from_secs_f64(seg.start + tau);
        (at < self.total).then_some(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(ms: u64, target: u64) -> Stage {
        Stage::new(Duration::from_millis(ms), target)
    }

    #[test]
    fn ramping_interpolates_linearly() {
        let sched = RampingSchedule::new(0, vec![s(1000, 10), s(1000, 10), s(1000, 0)]);
        assert_eq!(sched.total_duration(), Duration::from_secs(3));
        assert_eq!(sched.target_at(Duration::ZERO), 0);
        assert_eq!(sched.target_at(Duration::from_millis(500)), 5);
        assert_eq!(sched.target_at(Duration::from_millis(1000)), 10);
        assert_eq!(sched.target_at(Duration::from_millis(1500)), 10);
        assert_eq!(sched.target_at(Duration::from_millis(2500)), 5);
        assert_eq!(sched.target_at(Duration::from_secs(10)), 0);
    }

    #[test]
    fn zero_length_stage_jumps_to_target() {
        let sched = RampingSchedule::new(1, vec![s(0, 5), s(1000, 5)]);
        assert_eq!(sched.target_at(Duration::from_millis(1)), 5);
    }

    #[test]
    fn constant_arrival_is_evenly_spaced() {
        let sched = ArrivalSchedule::constant(10, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(sched.time_of(0), Some(Duration::ZERO));
        let t5 = sched
            .time_of(5)
            .unwrap_or_else(|| panic!("iteration 5 must be scheduled"));
        assert!((t5.as_secs_f64() - 0.5).abs() < 1e-6);
        assert!(sched.time_of(9).is_some());
        assert_eq!(sched.time_of(10), None);
    }

    #[test]
    fn time_unit_scales_rate() {
        let sched =
            ArrivalSchedule::constant(30, Duration::from_secs(60), Duration::from_secs(10));
        // 0.5 iterations/s
        let t1 = sched
            .time_of(1)
            .unwrap_or_else(|| panic!("iteration 1 must be scheduled"));
        assert!((t1.as_secs_f64() - 2.0).abs() < 1e-6);
        assert_eq!(sched.time_of(5), None);
    }

    #[test]
    fn ramping_arrival_follows_integral() {
        // 0 -> 10/s over 2s: integral(t) = 2.5 t^2, total 10 iterations.
        let sched = ArrivalSchedule::ramping(0, Duration::from_secs(1), vec![s(2000, 10)]);
        assert_eq!(sched.time_of(0), Some(Duration::ZERO));
        let t4 = sched
            .time_of(4)
            .unwrap_or_else(|| panic!("iteration 4 must be scheduled"));
        // 2.5 t^2 = 4 => t = sqrt(1.6)
        assert!((t4.as_secs_f64() - 1.6f64.sqrt()).abs() < 1e-6);
        assert!(sched.time_of(9).is_some());
        assert_eq!(sched.time_of(10), None);
    }

    #[test]
    fn ramping_arrival_crosses_stage_boundaries() {
        // 10/s for 1s, then down to 0 over 2s: 10 + 10 iterations.
        let sched =
            ArrivalSchedule::ramping(10, Duration::from_secs(1), vec![s(1000, 10), s(2000, 0)]);
        let t10 = sched
            .time_of(10)
            .unwrap_or_else(|| panic!("iteration 10 must be scheduled"));
        assert_eq!(t10, Duration::from_secs(1));

        let mut prev = Duration::ZERO;
        for n in 0..20 {
            let t = sched
                .time_of(n)
                .unwrap_or_else(|| panic!("iteration {n} must be scheduled"));
            assert!(t >= prev, "times must be monotonic");
            prev = t;
        }
        assert_eq!(sched.time_of(20), None);
    }
}
