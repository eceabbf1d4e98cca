pub mod accumulator;
pub mod activity;
pub mod config;
pub mod error;
pub mod observer;
pub mod rpc;
pub mod run;
pub mod series;
pub mod store;
#[cfg(test)]
pub(crate) mod test_util;

pub use accumulator::{Accumulator, AdvanceReport};
pub use activity::{run_activity, ActivityEndpoints, ActivityReport, DevActivity, HttpActivitySource};
pub use config::{AccumulatorConfig, RetryPolicy, Seed, SeriesSpec};
pub use error::{CoreError, RpcError};
pub use observer::{ChainObserver, Metric, NodeObserver, Observation};
pub use run::{run_once, RunOptions, RunReport};
pub use series::{Checkpoint, Position, Sample, SeriesSet};
pub use store::{JsonFileStore, SeriesStore};
