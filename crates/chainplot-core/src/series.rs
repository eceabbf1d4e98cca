//! The persisted series model.
//!
//! A [`SeriesSet`] is a shared integer axis (block heights) plus any number
//! of named numeric series, each holding exactly one value per axis entry.
//! The checkpoint fingerprints the source at the last axis position so the
//! next run can tell whether that position was reorganized away.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AccumulatorConfig;
use crate::error::CoreError;

/// A position on the accumulation axis (block height).
pub type Position = u64;

/// One value per tracked series, produced for a single axis step.
pub type Sample = BTreeMap<String, f64>;

/// Opaque fingerprint of the source state at a position (a block hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(pub String);

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// On disk this is the chart pages' document: `blocks_axis`, one array per
/// series, and `lastBlockHash`. `step_size` is written on every save;
/// documents without it (or without an axis, or with an empty
/// `lastBlockHash`) are upgraded by [`SeriesSet::adopt_legacy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<u64>,
    #[serde(rename = "blocks_axis", default)]
    pub axis: Vec<Position>,
    #[serde(
        rename = "lastBlockHash",
        default,
        deserialize_with = "empty_hash_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub checkpoint: Option<Checkpoint>,
    #[serde(flatten)]
    pub series: BTreeMap<String, Vec<f64>>,
}

fn empty_hash_as_none<'de, D>(deserializer: D) -> Result<Option<Checkpoint>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|hash| !hash.is_empty()).map(Checkpoint))
}

impl SeriesSet {
    /// Build the bootstrap state for a deployment: `seed.points` zero-valued
    /// entries starting at `seed.origin`, with no checkpoint.
    pub fn seeded(config: &AccumulatorConfig) -> Self {
        let points = config.seed.points;
        let axis = (0..points as u64)
            .map(|i| config.seed.origin + i * config.step_size)
            .collect();
        let series = config
            .series
            .iter()
            .map(|spec| (spec.name.clone(), vec![0.0; points]))
            .collect();

        Self {
            step_size: Some(config.step_size),
            axis,
            checkpoint: None,
            series,
        }
    }

    pub fn len(&self) -> usize {
        self.axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    pub fn last_position(&self) -> Option<Position> {
        self.axis.last().copied()
    }

    /// The position the next appended step will occupy.
    pub fn next_position(&self, config: &AccumulatorConfig) -> Position {
        match self.last_position() {
            Some(last) => last + config.step_size,
            None => config.seed.origin,
        }
    }

    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.series.get(name).and_then(|values| values.last().copied())
    }

    /// Check the structural invariants against the deployment config:
    /// every configured series exists and no others do, every series has
    /// one value per axis entry, and the axis advances by exactly
    /// `step_size`.
    pub fn validate(&self, config: &AccumulatorConfig) -> Result<(), CoreError> {
        if let Some(stored) = self.step_size.filter(|s| *s != config.step_size) {
            return Err(CoreError::CorruptState(format!(
                "stored step size {stored} does not match configured step size {}",
                config.step_size
            )));
        }

        for spec in &config.series {
            let values = self.series.get(&spec.name).ok_or_else(|| {
                CoreError::CorruptState(format!("missing series `{}`", spec.name))
            })?;
            if values.len() != self.axis.len() {
                return Err(CoreError::CorruptState(format!(
                    "series `{}` has {} values but the axis has {} entries",
                    spec.name,
                    values.len(),
                    self.axis.len()
                )));
            }
        }

        if let Some(unknown) = self
            .series
            .keys()
            .find(|name| !config.series.iter().any(|spec| &spec.name == *name))
        {
            return Err(CoreError::CorruptState(format!(
                "unexpected series `{unknown}`"
            )));
        }

        if let Some(pair) = self
            .axis
            .windows(2)
            .find(|pair| pair[0].checked_add(config.step_size) != Some(pair[1]))
        {
            return Err(CoreError::CorruptState(format!(
                "axis jumps from {} to {} with step size {}",
                pair[0], pair[1], config.step_size
            )));
        }

        Ok(())
    }

    /// Fill in what older documents leave out. A missing `step_size` is
    /// taken from `config`. A missing axis is rebuilt from the array
    /// index (entry `i` sits at `origin + i * step_size`), which is how the
    /// per-block masternode document was laid out.
    pub fn adopt_legacy(&mut self, config: &AccumulatorConfig) {
        if self.step_size.is_none() {
            self.step_size = Some(config.step_size);
        }
        if self.axis.is_empty() {
            let points = config
                .series
                .first()
                .and_then(|spec| self.series.get(&spec.name))
                .map_or(0, Vec::len);
            self.axis = (0..points as u64)
                .map(|i| config.seed.origin + i * config.step_size)
                .collect();
        }
    }

    /// Drop the last `count` entries from the axis and every series.
    pub(crate) fn truncate_tail(&mut self, count: usize) {
        let keep = self.axis.len().saturating_sub(count);
        self.axis.truncate(keep);
        for values in self.series.values_mut() {
            values.truncate(keep);
        }
    }

    /// Append one step. `values` must already contain an entry for every
    /// series in the set.
    pub(crate) fn push_step(
        &mut self,
        position: Position,
        values: &Sample,
        checkpoint: Checkpoint,
    ) {
        self.axis.push(position);
        for (name, series) in self.series.iter_mut() {
            series.push(values.get(name).copied().unwrap_or_default());
        }
        self.checkpoint = Some(checkpoint);
    }
}
