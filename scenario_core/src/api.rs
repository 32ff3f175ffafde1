use std::sync::Arc;

use scenario_schema::{ScenarioInput, ScenarioOutput};

use crate::{
    engine::{EngineError, ScenarioEngine},
    scenario::ScenarioTable,
    study_area::StudyArea,
};

/// Evaluate area-keyed knobs in one shot and publish parent-keyed records.
///
/// `seed` falls back to the configured `api_seed`, so repeated calls with
/// the same scenario return the same records.
pub fn evaluate_scenario(
    study_area: &Arc<StudyArea>,
    scenario: &ScenarioInput,
    seed: Option<u64>,
) -> Result<ScenarioOutput, EngineError> {
    let seed = seed.unwrap_or_else(|| study_area.config().api_seed());
    let table = ScenarioTable::from_area_knobs(Arc::clone(study_area.baseline()), scenario)?;
    let engine = ScenarioEngine::from_table(Arc::clone(study_area), table, Some(seed))?;
    tracing::debug!(
        target: "scenario::engine",
        study_area = %study_area.name(),
        areas = scenario.len(),
        seed,
        "scenario.evaluated"
    );
    Ok(engine.indicators().to_output())
}
