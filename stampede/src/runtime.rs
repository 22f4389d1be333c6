mod synthetic;
mod workload;

pub(crate) use synthetic::SyntheticScript;
pub(crate) use workload::{Lifecycle, MetricEmit, Program, Workload};
