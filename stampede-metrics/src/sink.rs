use std::time::Duration;

use hdrhistogram::Histogram;

use crate::metrics::MetricKind;

/// Trend values are stored in the histograms with three decimals of precision.
const TREND_SCALE: f64 = 1000.0;
const TREND_SIGFIG: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterSink {
    pub sum: f64,
    pub samples: u64,
}

impl CounterSink {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.samples = self.samples.saturating_add(1);
    }

    /// Sum per second of run time.
    pub fn rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 { 0.0 } else { self.sum / secs }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GaugeSink {
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub samples: u64,
}

impl GaugeSink {
    pub fn add(&mut self, value: f64) {
        if self.samples == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.last = value;
        self.samples = self.samples.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateSink {
    pub trues: u64,
    pub total: u64,
}

impl RateSink {
    pub fn add(&mut self, value: f64) {
        if value != 0.0 {
            self.trues = self.trues.saturating_add(1);
        }
        self.total = self.total.saturating_add(1);
    }

    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.trues as f64 / self.total as f64
        }
    }
}

/// Histograms only hold unsigned values, so negative samples go by magnitude into a
/// second one and percentiles are ranked across both.
#[derive(Debug, Clone)]
pub struct TrendSink {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    hist: Histogram<u64>,
    negative: Histogram<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
}

fn new_trend_histogram() -> Histogram<u64> {
    // Auto-resizing; only fails for an out-of-range precision.
    match Histogram::<u64>::new(TREND_SIGFIG) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Recorded value at 1-based ascending position `n`, within histogram precision.
fn nth_smallest(hist: &Histogram<u64>, n: u64) -> u64 {
    let total = hist.len();
    if total == 0 {
        return 0;
    }
    // Aim half a rank low so float rounding cannot push the lookup to rank n + 1.
    hist.value_at_quantile((n as f64 - 0.5) / total as f64)
}

impl Default for TrendSink {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
            hist: new_trend_histogram(),
            negative: new_trend_histogram(),
        }
    }
}

impl TrendSink {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count = self.count.saturating_add(1);
        self.sum += value;

        let scaled = (value.abs() * TREND_SCALE).round() as u64;
        if value < 0.0 {
            let _ = self.negative.record(scaled);
        } else {
            let _ = self.hist.record(scaled);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// `p` in `[0, 100]`. Histogram bucketing can overshoot the exact extremes, so the
    /// result is clamped to the observed range.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let q = (p / 100.0).clamp(0.0, 1.0);
        // 1-based rank of the requested sample in ascending order.
        let rank = ((q * self.count as f64).ceil() as u64).clamp(1, self.count);
        let negatives = self.negative.len();

        let raw = if rank <= negatives {
            // Most negative first: rank 1 is the largest magnitude.
            -(nth_smallest(&self.negative, negatives - rank + 1) as f64)
        } else {
            nth_smallest(&self.hist, rank - negatives) as f64
        };
        (raw / TREND_SCALE).clamp(self.min, self.max)
    }

    pub fn med(&self) -> f64 {
        self.percentile(50.0)
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            count: self.count,
            avg: self.avg(),
            min: self.min,
            med: self.med(),
            max: self.max,
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
        }
    }
}

/// Aggregation state for one metric or submetric. Only the metrics engine mutates it.
#[derive(Debug, Clone)]
pub enum Sink {
    Counter(CounterSink),
    Gauge(GaugeSink),
    Rate(RateSink),
    Trend(Box<TrendSink>),
}

/// Read-only view of a sink at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SinkValues {
    Counter { count: f64, rate: f64 },
    Gauge { value: f64, min: f64, max: f64 },
    Rate { rate: f64, passes: u64, fails: u64 },
    Trend(TrendSummary),
}

impl Sink {
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Sink::Counter(CounterSink::default()),
            MetricKind::Gauge => Sink::Gauge(GaugeSink::default()),
            MetricKind::Rate => Sink::Rate(RateSink::default()),
            MetricKind::Trend => Sink::Trend(Box::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Sink::Counter(_) => MetricKind::Counter,
            Sink::Gauge(_) => MetricKind::Gauge,
            Sink::Rate(_) => MetricKind::Rate,
            Sink::Trend(_) => MetricKind::Trend,
        }
    }

    #[inline]
    pub fn add(&mut self, value: f64) {
        match self {
            Sink::Counter(s) => s.add(value),
            Sink::Gauge(s) => s.add(value),
            Sink::Rate(s) => s.add(value),
            Sink::Trend(s) => s.add(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Sink::Counter(s) => s.samples == 0,
            Sink::Gauge(s) => s.samples == 0,
            Sink::Rate(s) => s.total == 0,
            Sink::Trend(s) => s.count == 0,
        }
    }

    pub fn values(&self, run_elapsed: Duration) -> SinkValues {
        match self {
            Sink::Counter(s) => SinkValues::Counter {
                count: s.sum,
                rate: s.rate(run_elapsed),
            },
            Sink::Gauge(s) => SinkValues::Gauge {
                value: s.last,
                min: s.min,
                max: s.max,
            },
            Sink::Rate(s) => SinkValues::Rate {
                rate: s.rate(),
                passes: s.trues,
                fails: s.total - s.trues,
            },
            Sink::Trend(s) => SinkValues::Trend(s.summary()),
        }
    }
}

impl SinkValues {
    /// Named statistics in display order, using the same names thresholds use.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        match *self {
            SinkValues::Counter { count, rate } => vec![("count", count), ("rate", rate)],
            SinkValues::Gauge { value, min, max } => {
                vec![("value", value), ("min", min), ("max", max)]
            }
            SinkValues::Rate {
                rate,
                passes,
                fails,
            } => vec![
                ("rate", rate),
                ("passes", passes as f64),
                ("fails", fails as f64),
            ],
            SinkValues::Trend(t) => vec![
                ("avg", t.avg),
                ("min", t.min),
                ("med", t.med),
                ("max", t.max),
                ("p(90)", t.p90),
                ("p(95)", t.p95),
            ],
        }
    }
}
