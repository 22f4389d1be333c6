use std::time::SystemTime;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::registry::MetricId;
use crate::tags::TagSet;

pub const DEFAULT_BUS_CAPACITY: usize = 4096;

/// One observation on its way to the metrics engine.
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric: MetricId,
    pub tags: TagSet,
    pub value: f64,
    pub time: SystemTime,
}

impl Sample {
    pub fn new(metric: MetricId, tags: TagSet, value: f64) -> Self {
        Self {
            metric,
            tags,
            value,
            time: SystemTime::now(),
        }
    }
}

/// Producer side of the sample bus. Cheap to clone; one per iteration task is fine.
#[derive(Debug, Clone)]
pub struct SampleSender {
    tx: mpsc::Sender<Sample>,
}

#[derive(Debug)]
pub struct SampleReceiver {
    rx: mpsc::Receiver<Sample>,
}

/// Bounded, ordered channel between sample producers and the single engine consumer.
///
/// `send` waits while the bus is full, so a slow engine throttles producers instead of
/// dropping samples.
pub fn sample_bus(capacity: usize) -> (SampleSender, SampleReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SampleSender { tx }, SampleReceiver { rx })
}

impl SampleSender {
    pub async fn send(&self, sample: Sample) -> Result<()> {
        self.tx.send(sample).await.map_err(|_| Error::BusClosed)
    }

    /// Non-waiting send; hands the sample back when the bus is full or closed.
    pub fn try_send(&self, sample: Sample) -> std::result::Result<(), Sample> {
        self.tx.try_send(sample).map_err(|err| match err {
            mpsc::error::TrySendError::Full(s) | mpsc::error::TrySendError::Closed(s) => s,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl SampleReceiver {
    pub async fn recv(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Sample> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new samples; already queued ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricKind, Registry};
    use std::time::Duration;

    #[tokio::test]
    async fn bus_preserves_order_per_producer() {
        let reg = Registry::default();
        let metric = reg
            .register("c", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        let (tx, mut rx) = sample_bus(8);

        for v in 0..5 {
            tx.send(Sample::new(metric, TagSet::default(), v as f64))
                .await
                .unwrap_or_else(|e| panic!("{e}"));
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(s) = rx.recv().await {
            seen.push(s.value);
        }
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn full_bus_blocks_producer_until_drained() {
        let reg = Registry::default();
        let metric = reg
            .register("c", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        let (tx, mut rx) = sample_bus(1);

        tx.send(Sample::new(metric, TagSet::default(), 1.0))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(tx.try_send(Sample::new(metric, TagSet::default(), 2.0)).is_err());

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.send(Sample::new(metric, TagSet::default(), 2.0)),
        )
        .await;
        assert!(blocked.is_err(), "send must wait while the bus is full");

        assert!(rx.recv().await.is_some());
        tx.send(Sample::new(metric, TagSet::default(), 3.0))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
    }

    #[tokio::test]
    async fn send_after_receiver_drop_reports_closed() {
        let (tx, rx) = sample_bus(4);
        drop(rx);
        let reg = Registry::default();
        let metric = reg
            .register("c", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            tx.send(Sample::new(metric, TagSet::default(), 1.0)).await,
            Err(Error::BusClosed)
        ));
    }
}
