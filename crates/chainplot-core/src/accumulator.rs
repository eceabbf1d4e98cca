//! Checkpointed series accumulation with reorg rollback.
//!
//! Each run loads the persisted [`SeriesSet`], checks whether its last
//! checkpoint is still on the observer's canonical chain, rolls back a
//! fixed window of trailing points if it is not, then appends one point per
//! `step_size` positions until it reaches the head captured at loop entry.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{AccumulatorConfig, RetryPolicy};
use crate::error::CoreError;
use crate::observer::ChainObserver;
use crate::series::{Position, Sample, SeriesSet};

/// Outcome of one advance loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceReport {
    /// The head the loop compared against.
    pub target: Position,
    pub appended: usize,
}

pub struct Accumulator {
    config: AccumulatorConfig,
}

impl Accumulator {
    pub fn new(config: AccumulatorConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    /// Turn persisted state into a validated working state. Absent state
    /// yields the configured seed.
    pub fn load(&self, persisted: Option<SeriesSet>) -> Result<SeriesSet, CoreError> {
        match persisted {
            Some(mut state) => {
                state.adopt_legacy(&self.config);
                state.validate(&self.config)?;
                Ok(state)
            }
            None => Ok(SeriesSet::seeded(&self.config)),
        }
    }

    /// Pin a checkpoint-less state to the observer's current hash at its
    /// last position. No-op for empty or already anchored states.
    pub async fn anchor<O>(&self, state: &mut SeriesSet, observer: &O) -> Result<(), CoreError>
    where
        O: ChainObserver + ?Sized,
    {
        if state.checkpoint.is_some() {
            return Ok(());
        }
        let Some(last) = state.last_position() else {
            return Ok(());
        };

        let hash = self
            .retrying("hash_at", || observer.hash_at(last))
            .await?;
        debug!(position = last, hash = %hash, "anchored seeded series");
        state.checkpoint = Some(hash);
        Ok(())
    }

    /// Whether the last stored checkpoint has been reorganized away.
    ///
    /// Always false while the series holds `minimum_history` points or
    /// fewer. A missing checkpoint on a long enough series counts as stale.
    pub async fn detect_reorg<O>(&self, state: &SeriesSet, observer: &O) -> Result<bool, CoreError>
    where
        O: ChainObserver + ?Sized,
    {
        if state.len() <= self.config.minimum_history {
            return Ok(false);
        }
        let Some(last) = state.last_position() else {
            return Ok(false);
        };

        let current = self
            .retrying("hash_at", || observer.hash_at(last))
            .await?;
        let stale = state.checkpoint.as_ref() != Some(&current);
        if stale {
            warn!(
                position = last,
                stored = state.checkpoint.as_ref().map(|c| c.0.as_str()).unwrap_or("<none>"),
                current = %current,
                "checkpoint no longer on canonical chain"
            );
        }
        Ok(stale)
    }

    /// Drop the last `window` points and re-anchor the checkpoint at the new
    /// last position. The state is untouched if this fails.
    pub async fn rollback<O>(
        &self,
        state: &mut SeriesSet,
        observer: &O,
        window: usize,
    ) -> Result<(), CoreError>
    where
        O: ChainObserver + ?Sized,
    {
        if state.len() <= window {
            return Err(CoreError::InsufficientHistory {
                points: state.len(),
                window,
            });
        }

        let new_last = state.axis[state.len() - 1 - window];
        let hash = self
            .retrying("hash_at", || observer.hash_at(new_last))
            .await?;

        state.truncate_tail(window);
        state.checkpoint = Some(hash);
        info!(window, position = new_last, "rolled back trailing points");
        Ok(())
    }

    /// Append points until the head reported at entry is reached.
    pub async fn advance<O>(
        &self,
        state: &mut SeriesSet,
        observer: &O,
    ) -> Result<AdvanceReport, CoreError>
    where
        O: ChainObserver + ?Sized,
    {
        let head = self
            .retrying("head_position", || observer.head_position())
            .await?;
        self.advance_to(state, observer, head).await
    }

    /// Append one point per `step_size` positions while the next position is
    /// at or below `target`. Partial progress stays in `state` on error.
    pub async fn advance_to<O>(
        &self,
        state: &mut SeriesSet,
        observer: &O,
        target: Position,
    ) -> Result<AdvanceReport, CoreError>
    where
        O: ChainObserver + ?Sized,
    {
        let step = self.config.step_size;
        let mut appended = 0;

        loop {
            let next = state.next_position(&self.config);
            if next > target {
                break;
            }

            debug!(position = next, "sampling");
            let observation = self
                .retrying("sample", || observer.sample(next, step))
                .await?;
            let values = self.prepare_values(state, next, observation.values)?;

            state.push_step(next, &values, observation.checkpoint);
            appended += 1;
        }

        Ok(AdvanceReport { target, appended })
    }

    /// Check that a sample covers every configured series and fold
    /// cumulative series onto their running totals.
    fn prepare_values(
        &self,
        state: &SeriesSet,
        position: Position,
        mut sample: Sample,
    ) -> Result<Sample, CoreError> {
        let mut values = Sample::new();
        for spec in &self.config.series {
            let value = sample.remove(&spec.name).ok_or_else(|| {
                CoreError::InvalidData(format!(
                    "sample at {position} is missing series `{}`",
                    spec.name
                ))
            })?;
            let value = if spec.cumulative {
                state.last_value(&spec.name).unwrap_or(0.0) + value
            } else {
                value
            };
            values.insert(spec.name.clone(), value);
        }
        Ok(values)
    }

    async fn retrying<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        retry(&self.config.retry, operation, op).await
    }
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy.
pub(crate) async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= policy.attempts => {
                return Err(CoreError::ObserverUnavailable {
                    operation: operation.to_owned(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                warn!(operation, attempt, error = %err, "transient observer failure; retrying");
                tokio::time::sleep(backoff_delay(policy, attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Linear backoff before retry number `attempt + 1`, saturating instead of
/// overflowing for large configured delays.
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.backoff.saturating_mul(attempt)
}
