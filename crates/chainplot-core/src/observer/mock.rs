use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::series::{Checkpoint, Position, Sample};
use crate::test_util::hash_for;

use super::{ChainObserver, Observation};

/// An in-memory chain for accumulator tests.
///
/// Every height up to `head` has the hash [`hash_for`] unless overridden,
/// and every series samples to the position as `f64` unless overridden.
/// Transient failures can be scripted per height.
pub struct MockObserver {
    head: Position,
    series: Vec<String>,
    hashes: HashMap<Position, String>,
    values: HashMap<Position, Sample>,
    /// Remaining `NotFound` failures to inject per height, for both
    /// `hash_at` and `sample`.
    failures: Mutex<HashMap<Position, u32>>,
    calls: Mutex<Vec<String>>,
}

impl MockObserver {
    pub fn builder(series: &[&str]) -> MockObserverBuilder {
        MockObserverBuilder {
            head: 0,
            series: series.iter().map(|s| (*s).to_owned()).collect(),
            hashes: HashMap::new(),
            values: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Every observer call made so far, as `method(position)` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn checkpoint(&self, position: Position) -> Checkpoint {
        let hash = self
            .hashes
            .get(&position)
            .cloned()
            .unwrap_or_else(|| hash_for(position));
        Checkpoint(hash)
    }

    fn maybe_fail(&self, position: Position) -> Result<(), CoreError> {
        let mut failures = self.failures.lock().expect("failures lock");
        if let Some(remaining) = failures.get_mut(&position) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CoreError::NotFound { position });
            }
        }
        Ok(())
    }
}

pub struct MockObserverBuilder {
    head: Position,
    series: Vec<String>,
    hashes: HashMap<Position, String>,
    values: HashMap<Position, Sample>,
    failures: HashMap<Position, u32>,
}

impl MockObserverBuilder {
    pub fn with_head(mut self, head: Position) -> Self {
        self.head = head;
        self
    }

    /// Replace the hash at `position`, simulating a reorganized block.
    pub fn with_hash(mut self, position: Position, hash: &str) -> Self {
        self.hashes.insert(position, hash.to_owned());
        self
    }

    pub fn with_sample(mut self, position: Position, sample: Sample) -> Self {
        self.values.insert(position, sample);
        self
    }

    /// Fail the next `count` calls touching `position` with `NotFound`.
    pub fn failing(mut self, position: Position, count: u32) -> Self {
        self.failures.insert(position, count);
        self
    }

    pub fn build(self) -> MockObserver {
        MockObserver {
            head: self.head,
            series: self.series,
            hashes: self.hashes,
            values: self.values,
            failures: Mutex::new(self.failures),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChainObserver for MockObserver {
    async fn head_position(&self) -> Result<Position, CoreError> {
        self.record("head_position".to_owned());
        Ok(self.head)
    }

    async fn hash_at(&self, position: Position) -> Result<Checkpoint, CoreError> {
        self.record(format!("hash_at({position})"));
        if position > self.head {
            return Err(CoreError::NotFound { position });
        }
        self.maybe_fail(position)?;
        Ok(self.checkpoint(position))
    }

    async fn sample(&self, position: Position, window: u64) -> Result<Observation, CoreError> {
        self.record(format!("sample({position},{window})"));
        if position > self.head {
            return Err(CoreError::NotFound { position });
        }
        self.maybe_fail(position)?;
        let values = match self.values.get(&position) {
            Some(sample) => sample.clone(),
            None => self
                .series
                .iter()
                .map(|name| (name.clone(), position as f64))
                .collect::<BTreeMap<_, _>>(),
        };
        Ok(Observation {
            checkpoint: self.checkpoint(position),
            values,
        })
    }
}
