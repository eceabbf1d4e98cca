//! One polling run for one chart.
//!
//! `BOOTSTRAP_OR_LOAD -> REORG_CHECK -> (ROLLBACK)? -> ADVANCE -> PERSIST`.
//! Persisted state only ever moves from one valid series set to another;
//! progress made before a failure is written out before the error is
//! returned.

use tracing::{error, info, warn};

use crate::accumulator::{retry, Accumulator};
use crate::error::CoreError;
use crate::observer::ChainObserver;
use crate::series::{Position, SeriesSet};
use crate::store::SeriesStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Persist after every this many appended points, in addition to the
    /// final write. Useful for long catch-up runs.
    pub persist_every: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// No persisted state existed; the run started from the seed.
    pub bootstrapped: bool,
    /// Points discarded by a reorg rollback.
    pub rolled_back: usize,
    pub appended: usize,
    /// Observer head captured before advancing.
    pub head: Position,
    pub last_position: Option<Position>,
}

pub async fn run_once<O, S>(
    accumulator: &Accumulator,
    observer: &O,
    store: &S,
    key: &str,
    options: RunOptions,
) -> Result<RunReport, CoreError>
where
    O: ChainObserver + ?Sized,
    S: SeriesStore + ?Sized,
{
    let config = accumulator.config();

    let persisted = store.read(key)?;
    let bootstrapped = persisted.is_none();
    let mut state = accumulator.load(persisted)?;
    if bootstrapped {
        info!(chart = key, points = state.len(), "no persisted state; starting from seed");
        accumulator.anchor(&mut state, observer).await?;
    }
    let mut dirty = bootstrapped;

    let mut rolled_back = 0;
    if accumulator.detect_reorg(&state, observer).await? {
        accumulator
            .rollback(&mut state, observer, config.rollback_window)
            .await?;
        rolled_back = config.rollback_window;
        dirty = true;
    }

    let head = retry(&config.retry, "head_position", || observer.head_position()).await?;

    let mut appended = 0;
    loop {
        let chunk_target = match options.persist_every {
            Some(every) if every > 0 => {
                let next = state.next_position(config);
                let span = (every as u64 - 1).saturating_mul(config.step_size);
                next.saturating_add(span).min(head)
            }
            _ => head,
        };

        match accumulator.advance_to(&mut state, observer, chunk_target).await {
            Ok(report) => {
                appended += report.appended;
                if report.appended > 0 {
                    dirty = true;
                }
            }
            Err(err) => {
                let progress = state.len();
                if dirty {
                    persist(store, key, &state).map_err(|persist_err| {
                        error!(chart = key, error = %persist_err, "failed to save partial progress");
                        persist_err
                    })?;
                }
                warn!(chart = key, points = progress, error = %err, "advance aborted");
                return Err(err);
            }
        }

        if chunk_target >= head || state.next_position(config) > head {
            break;
        }
        if dirty {
            persist(store, key, &state)?;
            dirty = false;
            info!(chart = key, position = ?state.last_position(), "checkpoint saved");
        }
    }

    if dirty {
        persist(store, key, &state)?;
    }

    let report = RunReport {
        bootstrapped,
        rolled_back,
        appended,
        head,
        last_position: state.last_position(),
    };
    info!(
        chart = key,
        appended = report.appended,
        rolled_back = report.rolled_back,
        head = report.head,
        last = ?report.last_position,
        "run complete"
    );
    Ok(report)
}

fn persist<S: SeriesStore + ?Sized>(
    store: &S,
    key: &str,
    state: &SeriesSet,
) -> Result<(), CoreError> {
    store.write(key, state)
}
