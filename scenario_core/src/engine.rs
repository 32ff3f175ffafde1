use std::{mem, sync::Arc};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use scenario_schema::{
    feature_order, IndicatorRecord, KnobEdit, KnobError, ScenarioInput, ScenarioKnobs,
    ScenarioOutput, SignatureType, POPULATION,
};

use crate::{
    baseline::BaselineData,
    capability::{aligned_series, checked_predictions, AreaSeries, CapabilityError},
    features::{FeatureError, FeatureFrame, FeatureVector},
    sampling::{SynthesisError, SynthesizedArea, VariableSynthesizer},
    scenario::{ScenarioError, ScenarioTable},
    study_area::StudyArea,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Knob(#[from] KnobError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error("scenario table was built for a different study area")]
    ForeignTable,
}

/// The four indicators of one area, or their mean over a parent unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AreaIndicators {
    pub air_quality: f64,
    pub house_price: f64,
    pub job_accessibility: f64,
    pub greenspace_accessibility: f64,
}

impl AreaIndicators {
    fn mean<'a>(rows: impl ExactSizeIterator<Item = &'a AreaIndicators>) -> Self {
        let count = rows.len().max(1) as f64;
        let sum = rows.fold(AreaIndicators::default(), |acc, row| AreaIndicators {
            air_quality: acc.air_quality + row.air_quality,
            house_price: acc.house_price + row.house_price,
            job_accessibility: acc.job_accessibility + row.job_accessibility,
            greenspace_accessibility: acc.greenspace_accessibility + row.greenspace_accessibility,
        });
        AreaIndicators {
            air_quality: sum.air_quality / count,
            house_price: sum.house_price / count,
            job_accessibility: sum.job_accessibility / count,
            greenspace_accessibility: sum.greenspace_accessibility / count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParentIndicators {
    /// Most frequent signature type in effect among the child areas.
    pub signature_type: Option<SignatureType>,
    pub areas: usize,
    #[serde(flatten)]
    pub means: AreaIndicators,
}

/// Indicator means per parent unit, in parent first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IndicatorTable {
    rows: IndexMap<String, ParentIndicators>,
}

impl IndicatorTable {
    fn aggregate(baseline: &BaselineData, table: &ScenarioTable, areas: &[AreaIndicators]) -> Self {
        let rows = baseline
            .parents()
            .filter_map(|parent| {
                let children = baseline.children(parent)?;
                let signature_type = dominant_type(children.iter().filter_map(|&idx| {
                    let knobs = table.knobs_at(idx)?;
                    knobs
                        .signature_type
                        .or_else(|| baseline.area(idx).and_then(|area| area.signature_type))
                }));
                let means = AreaIndicators::mean(children.iter().map(|&idx| &areas[idx]));
                Some((
                    parent.to_string(),
                    ParentIndicators {
                        signature_type,
                        areas: children.len(),
                        means,
                    },
                ))
            })
            .collect();
        Self { rows }
    }

    pub fn get(&self, parent: &str) -> Option<&ParentIndicators> {
        self.rows.get(parent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParentIndicators)> + '_ {
        self.rows
            .iter()
            .map(|(parent, indicators)| (parent.as_str(), indicators))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Published records. Parents without a determined signature type are
    /// left out.
    pub fn to_output(&self) -> ScenarioOutput {
        self.rows
            .iter()
            .filter_map(|(parent, row)| {
                let signature_type = row.signature_type?;
                Some((
                    parent.clone(),
                    IndicatorRecord {
                        signature_type,
                        air_quality: row.means.air_quality,
                        house_price: row.means.house_price,
                        job_accessibility: row.means.job_accessibility,
                        greenspace_accessibility: row.means.greenspace_accessibility,
                    },
                ))
            })
            .collect()
    }
}

/// Most frequent type; ties go to the lower code.
fn dominant_type(types: impl Iterator<Item = SignatureType>) -> Option<SignatureType> {
    let mut counts = [0usize; SignatureType::ALL.len()];
    for signature in types {
        counts[signature.code() as usize] += 1;
    }
    counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .max_by(|(code_a, count_a), (code_b, count_b)| {
            count_a.cmp(count_b).then(code_b.cmp(code_a))
        })
        .and_then(|(code, _)| SignatureType::from_code(code as u8))
}

/// Live scenario state of one study area.
///
/// Every area whose four knobs are set carries synthesized features and
/// deltas; the rest keep the baseline. Edits re-synthesize only the child
/// areas of the edited parent unit, then re-predict the whole state.
#[derive(Debug)]
pub struct ScenarioEngine {
    study_area: Arc<StudyArea>,
    table: ScenarioTable,
    seed: Option<u64>,
    features: Vec<FeatureVector>,
    jobs_delta: Vec<f64>,
    greenspace_delta: Vec<f64>,
    area_indicators: Vec<AreaIndicators>,
    indicators: IndicatorTable,
}

impl ScenarioEngine {
    /// Child areas inherit the knobs of their parent unit in `initial_state`.
    pub fn new(
        study_area: Arc<StudyArea>,
        initial_state: &ScenarioInput,
        seed: Option<u64>,
    ) -> Result<Self, EngineError> {
        let table =
            ScenarioTable::from_parent_knobs(Arc::clone(study_area.baseline()), initial_state)?;
        Self::from_table(study_area, table, seed)
    }

    pub fn from_table(
        study_area: Arc<StudyArea>,
        table: ScenarioTable,
        seed: Option<u64>,
    ) -> Result<Self, EngineError> {
        if !Arc::ptr_eq(table.baseline(), study_area.baseline()) {
            return Err(EngineError::ForeignTable);
        }

        let areas = study_area.baseline().len();
        let mut features = Vec::with_capacity(areas);
        let mut jobs_delta = Vec::with_capacity(areas);
        let mut greenspace_delta = Vec::with_capacity(areas);
        let mut synthesized = 0usize;
        for idx in 0..areas {
            if table.knobs_at(idx).map_or(false, ScenarioKnobs::is_complete) {
                synthesized += 1;
            }
            let area = synthesize_row(&study_area, &table, idx, seed)?;
            features.push(area.features);
            jobs_delta.push(area.jobs_delta);
            greenspace_delta.push(area.greenspace_delta);
        }

        let mut engine = Self {
            study_area,
            table,
            seed,
            features,
            jobs_delta,
            greenspace_delta,
            area_indicators: Vec::new(),
            indicators: IndicatorTable::default(),
        };
        engine.predict()?;

        tracing::info!(
            target: "scenario::engine",
            study_area = %engine.study_area.name(),
            areas,
            synthesized,
            parents = engine.indicators.len(),
            seed = ?engine.seed,
            "scenario.applied"
        );
        Ok(engine)
    }

    /// Set one knob of every child area of `parent` and re-predict.
    ///
    /// Returns `false` when the edit matches the current value of every
    /// child, in which case nothing is recomputed. On error the knobs,
    /// features and indicators are left as they were.
    pub fn change(&mut self, parent: &str, edit: KnobEdit) -> Result<bool, EngineError> {
        edit.validate()?;
        if self.table.is_noop(parent, &edit)? {
            tracing::debug!(
                target: "scenario::engine",
                parent,
                knob = edit.knob_name(),
                "scenario.change_skipped"
            );
            return Ok(false);
        }

        let patch = self.table.apply(parent, edit)?;
        let rows = patch.rows().to_vec();

        let mut fresh = Vec::with_capacity(rows.len());
        for &idx in &rows {
            match synthesize_row(&self.study_area, &self.table, idx, self.seed) {
                Ok(area) => fresh.push(area),
                Err(err) => {
                    self.table.revert(patch);
                    return Err(err);
                }
            }
        }

        let mut previous = Vec::with_capacity(rows.len());
        for (&idx, area) in rows.iter().zip(fresh) {
            previous.push(SynthesizedArea {
                features: mem::replace(&mut self.features[idx], area.features),
                jobs_delta: mem::replace(&mut self.jobs_delta[idx], area.jobs_delta),
                greenspace_delta: mem::replace(
                    &mut self.greenspace_delta[idx],
                    area.greenspace_delta,
                ),
            });
        }

        if let Err(err) = self.predict() {
            for (&idx, area) in rows.iter().zip(previous) {
                self.features[idx] = area.features;
                self.jobs_delta[idx] = area.jobs_delta;
                self.greenspace_delta[idx] = area.greenspace_delta;
            }
            self.table.revert(patch);
            tracing::warn!(
                target: "scenario::engine",
                parent,
                knob = edit.knob_name(),
                error = %err,
                "scenario.change_reverted"
            );
            return Err(err);
        }

        tracing::debug!(
            target: "scenario::engine",
            parent,
            knob = edit.knob_name(),
            areas = rows.len(),
            "scenario.changed"
        );
        Ok(true)
    }

    /// [`Self::change`] with the parent unit picked by its position.
    pub fn change_at(&mut self, position: usize, edit: KnobEdit) -> Result<bool, EngineError> {
        let parent = self.table.parent_at(position)?.to_string();
        self.change(&parent, edit)
    }

    /// Run the capabilities on the current state and replace the stored
    /// indicators. Nothing is replaced when a capability fails.
    pub fn predict(&mut self) -> Result<&IndicatorTable, EngineError> {
        let baseline = self.study_area.baseline();
        let capabilities = self.study_area.capabilities();
        let mode = self.study_area.config().travel_mode();

        let area_ids: Vec<&str> = baseline.areas().iter().map(|area| area.id.as_str()).collect();
        let mut frame =
            FeatureFrame::new(area_ids.clone(), baseline.feature_columns(), &self.features)?;
        frame.rename_column(baseline.population_column(), POPULATION);
        frame.ensure_schema(feature_order())?;

        let air_quality = checked_predictions(
            "air quality predictor",
            &area_ids,
            capabilities.air_quality.predict(&frame)?,
        )?;
        let house_price = checked_predictions(
            "house price predictor",
            &area_ids,
            capabilities.house_price.predict(&frame)?,
        )?;

        let jobs = series(&area_ids, &self.jobs_delta);
        let greenspace = series(&area_ids, &self.greenspace_delta);
        let job_accessibility = aligned_series(
            "job accessibility",
            area_ids.iter().copied(),
            &capabilities.accessibility.job_accessibility(&jobs, mode)?,
        )?;
        let greenspace_accessibility = aligned_series(
            "greenspace accessibility",
            area_ids.iter().copied(),
            &capabilities
                .accessibility
                .greenspace_accessibility(&greenspace, mode)?,
        )?;

        let area_indicators: Vec<AreaIndicators> = (0..area_ids.len())
            .map(|idx| AreaIndicators {
                air_quality: air_quality[idx],
                house_price: house_price[idx],
                job_accessibility: job_accessibility[idx],
                greenspace_accessibility: greenspace_accessibility[idx],
            })
            .collect();
        let indicators = IndicatorTable::aggregate(baseline, &self.table, &area_indicators);

        self.area_indicators = area_indicators;
        self.indicators = indicators;
        Ok(&self.indicators)
    }

    pub fn study_area(&self) -> &Arc<StudyArea> {
        &self.study_area
    }

    pub fn table(&self) -> &ScenarioTable {
        &self.table
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    pub fn features_of(&self, area: &str) -> Option<&FeatureVector> {
        self.study_area
            .baseline()
            .area_index(area)
            .and_then(|idx| self.features.get(idx))
    }

    pub fn jobs_delta(&self) -> &[f64] {
        &self.jobs_delta
    }

    pub fn greenspace_delta(&self) -> &[f64] {
        &self.greenspace_delta
    }

    pub fn area_indicators(&self) -> &[AreaIndicators] {
        &self.area_indicators
    }

    pub fn indicators(&self) -> &IndicatorTable {
        &self.indicators
    }
}

fn series(area_ids: &[&str], values: &[f64]) -> AreaSeries {
    area_ids
        .iter()
        .zip(values)
        .map(|(area, &value)| (area.to_string(), value))
        .collect()
}

/// Features of row `idx` under the table's knobs: synthesized when all four
/// knobs are set, the baseline otherwise.
fn synthesize_row(
    study_area: &StudyArea,
    table: &ScenarioTable,
    idx: usize,
    seed: Option<u64>,
) -> Result<SynthesizedArea, EngineError> {
    let baseline = study_area.baseline();
    let (Some(area), Some(knobs)) = (baseline.area(idx), table.knobs_at(idx)) else {
        return Err(ScenarioError::UnknownArea(idx.to_string()).into());
    };
    if !knobs.is_complete() {
        return Ok(SynthesizedArea::baseline(area));
    }
    let config = study_area.config();
    let synthesizer = VariableSynthesizer::new(
        baseline.profiles(),
        config.sampling_mode(),
        config.iqr_divisor(),
    );
    Ok(synthesizer.synthesize(area, knobs, seed)?)
}
