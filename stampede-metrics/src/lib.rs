pub mod error;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod sample;
pub mod selector;
pub mod sink;
pub mod tags;

pub use error::{Error, Result};
pub use key::KeyId;
pub use metrics::MetricKind;
pub use registry::{MetricId, Registry};
pub use sample::{Sample, SampleReceiver, SampleSender, sample_bus};
pub use selector::Selector;
pub use sink::{
    CounterSink, GaugeSink, RateSink, Sink, SinkValues, TrendSink, TrendSummary,
};
pub use tags::TagSet;
