//! Chain observation layer.
//!
//! Defines the [`ChainObserver`] trait the accumulator drives, a node-backed
//! implementation ([`NodeObserver`]) and a test mock (`mock::MockObserver`).

#[cfg(test)]
pub mod mock;
mod node;

pub use node::{Metric, NodeObserver};

use async_trait::async_trait;

use crate::error::CoreError;
use crate::series::{Checkpoint, Position, Sample};

/// Values for one step together with the fingerprint of the block they
/// were read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub checkpoint: Checkpoint,
    pub values: Sample,
}

/// The view of an external data source that the accumulator needs.
///
/// Every method must be safe to call repeatedly for the same arguments;
/// the accumulator retries transient failures.
#[async_trait]
pub trait ChainObserver: Send + Sync {
    /// Highest position currently available from the source.
    async fn head_position(&self) -> Result<Position, CoreError>;

    /// Fingerprint of the source at `position`. Fails with
    /// [`CoreError::NotFound`] when the position is unknown or pruned.
    async fn hash_at(&self, position: Position) -> Result<Checkpoint, CoreError>;

    /// Values for every tracked series for the step ending at `position`,
    /// aggregating the preceding `window` units of source data. The
    /// returned checkpoint must identify the block the values came from.
    async fn sample(&self, position: Position, window: u64) -> Result<Observation, CoreError>;
}
