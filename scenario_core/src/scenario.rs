use std::sync::Arc;

use thiserror::Error;

use scenario_schema::{KnobEdit, KnobError, ScenarioInput, ScenarioKnobs};

use crate::baseline::BaselineData;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Knob(#[from] KnobError),
    #[error("invalid knobs for '{id}': {source}")]
    InvalidKnobs {
        id: String,
        #[source]
        source: KnobError,
    },
    #[error("unknown parent unit '{0}'")]
    UnknownParent(String),
    #[error("unknown area '{0}'")]
    UnknownArea(String),
    #[error("parent position {position} is out of range ({len} parent units)")]
    ParentOutOfRange { position: usize, len: usize },
}

/// Knobs of every area of a study area, in baseline row order.
#[derive(Debug, Clone)]
pub struct ScenarioTable {
    baseline: Arc<BaselineData>,
    knobs: Vec<ScenarioKnobs>,
}

/// Knob cells overwritten by one edit, kept so the edit can be undone.
#[derive(Debug, Clone, Default)]
pub struct KnobPatch {
    rows: Vec<usize>,
    previous: Vec<ScenarioKnobs>,
}

impl KnobPatch {
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ScenarioTable {
    /// Every area keeps its baseline.
    pub fn unset(baseline: Arc<BaselineData>) -> Self {
        let knobs = vec![ScenarioKnobs::default(); baseline.len()];
        Self { baseline, knobs }
    }

    /// Each child area inherits the knobs of its parent unit.
    pub fn from_parent_knobs(
        baseline: Arc<BaselineData>,
        knobs_by_parent: &ScenarioInput,
    ) -> Result<Self, ScenarioError> {
        let mut table = Self::unset(baseline);
        for (parent, knobs) in knobs_by_parent {
            knobs.validate().map_err(|source| ScenarioError::InvalidKnobs {
                id: parent.clone(),
                source,
            })?;
            let children = table
                .baseline
                .children(parent)
                .ok_or_else(|| ScenarioError::UnknownParent(parent.clone()))?;
            for &idx in children {
                table.knobs[idx] = *knobs;
            }
        }
        Ok(table)
    }

    pub fn from_area_knobs(
        baseline: Arc<BaselineData>,
        knobs_by_area: &ScenarioInput,
    ) -> Result<Self, ScenarioError> {
        let mut table = Self::unset(baseline);
        for (area, knobs) in knobs_by_area {
            knobs.validate().map_err(|source| ScenarioError::InvalidKnobs {
                id: area.clone(),
                source,
            })?;
            let idx = table
                .baseline
                .area_index(area)
                .ok_or_else(|| ScenarioError::UnknownArea(area.clone()))?;
            table.knobs[idx] = *knobs;
        }
        Ok(table)
    }

    pub fn baseline(&self) -> &Arc<BaselineData> {
        &self.baseline
    }

    pub fn len(&self) -> usize {
        self.knobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knobs.is_empty()
    }

    pub fn knobs(&self) -> &[ScenarioKnobs] {
        &self.knobs
    }

    pub fn knobs_at(&self, idx: usize) -> Option<&ScenarioKnobs> {
        self.knobs.get(idx)
    }

    pub fn knobs_of(&self, area: &str) -> Option<&ScenarioKnobs> {
        self.baseline
            .area_index(area)
            .and_then(|idx| self.knobs.get(idx))
    }

    pub fn children(&self, parent: &str) -> Result<&[usize], ScenarioError> {
        self.baseline
            .children(parent)
            .ok_or_else(|| ScenarioError::UnknownParent(parent.to_string()))
    }

    pub fn parent_at(&self, position: usize) -> Result<&str, ScenarioError> {
        self.baseline
            .parent_at(position)
            .ok_or(ScenarioError::ParentOutOfRange {
                position,
                len: self.baseline.parents().len(),
            })
    }

    /// True when every child of `parent` already holds the edited value.
    pub fn is_noop(&self, parent: &str, edit: &KnobEdit) -> Result<bool, ScenarioError> {
        Ok(self
            .children(parent)?
            .iter()
            .all(|&idx| self.knobs[idx].matches(edit)))
    }

    /// Set one knob for every child area of `parent`. Nothing changes when
    /// the edit is invalid or the parent is unknown.
    pub fn apply(&mut self, parent: &str, edit: KnobEdit) -> Result<KnobPatch, ScenarioError> {
        edit.validate()?;
        let rows = self.children(parent)?.to_vec();
        let previous = rows.iter().map(|&idx| self.knobs[idx]).collect();
        for &idx in &rows {
            self.knobs[idx].apply(edit);
        }
        Ok(KnobPatch { rows, previous })
    }

    pub fn revert(&mut self, patch: KnobPatch) {
        for (idx, knobs) in patch.rows.into_iter().zip(patch.previous) {
            self.knobs[idx] = knobs;
        }
    }
}
