//! Reference capability implementations loaded from JSON.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    capability::{Accessibility, AreaSeries, CapabilityError, Predictor},
    features::FeatureFrame,
    graph::{AdjacencyTable, GraphError, SpatialWeightsGraph},
};

pub const LAG_SUFFIX: &str = "_lag";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to parse model definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("travel mode '{mode}' has no baseline {indicator} for area '{area}'")]
    MissingBaseline {
        mode: String,
        indicator: &'static str,
        area: String,
    },
    #[error("travel mode '{mode}' has a non-finite baseline {indicator} for area '{area}'")]
    NonFiniteBaseline {
        mode: String,
        indicator: &'static str,
        area: String,
    },
    #[error("accessibility definition lists no travel modes")]
    NoModes,
}

/// `intercept + Σ coefficient · column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub intercept: f64,
    pub coefficients: IndexMap<String, f64>,
}

impl LinearModel {
    pub fn new<S: Into<String>>(
        intercept: f64,
        coefficients: impl IntoIterator<Item = (S, f64)>,
    ) -> Self {
        Self {
            intercept,
            coefficients: coefficients
                .into_iter()
                .map(|(column, value)| (column.into(), value))
                .collect(),
        }
    }

    fn evaluate(
        &self,
        rows: usize,
        mut column: impl FnMut(&str) -> Option<Vec<f64>>,
    ) -> Result<Vec<f64>, CapabilityError> {
        let mut predictions = vec![self.intercept; rows];
        for (name, &coefficient) in &self.coefficients {
            let values =
                column(name).ok_or_else(|| CapabilityError::UnknownColumn(name.clone()))?;
            for (prediction, value) in predictions.iter_mut().zip(values) {
                *prediction += coefficient * value;
            }
        }
        Ok(predictions)
    }
}

impl Predictor for LinearModel {
    fn predict(&self, frame: &FeatureFrame<'_>) -> Result<Vec<f64>, CapabilityError> {
        self.evaluate(frame.len(), |name| {
            frame.column_index(name).map(|idx| frame.column_values(idx))
        })
    }
}

/// Linear model over the frame plus the spatial lag of selected columns,
/// exposed to the coefficients as `<column>_lag`.
#[derive(Debug, Clone)]
pub struct SpatialLagModel {
    model: LinearModel,
    lag_columns: Vec<String>,
    graph: Arc<SpatialWeightsGraph>,
}

impl SpatialLagModel {
    pub fn new(
        model: LinearModel,
        lag_columns: Vec<String>,
        graph: Arc<SpatialWeightsGraph>,
    ) -> Self {
        Self {
            model,
            lag_columns,
            graph,
        }
    }

    /// Lagged columns in frame row order. Areas of the graph absent from the
    /// frame contribute zero.
    fn lagged(
        &self,
        frame: &FeatureFrame<'_>,
    ) -> Result<HashMap<String, Vec<f64>>, CapabilityError> {
        let positions = frame
            .area_ids()
            .iter()
            .map(|area| {
                self.graph
                    .position(area)
                    .ok_or_else(|| CapabilityError::UnknownArea {
                        capability: "spatial lag model".to_string(),
                        area: area.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut lagged = HashMap::with_capacity(self.lag_columns.len());
        for column in &self.lag_columns {
            let idx = frame
                .column_index(column)
                .ok_or_else(|| CapabilityError::UnknownColumn(column.clone()))?;
            let mut aligned = vec![0.0; self.graph.n()];
            for (row, &position) in frame.rows().iter().zip(&positions) {
                aligned[position] = row.values()[idx];
            }
            let lag = self.graph.lag(&aligned)?;
            lagged.insert(
                format!("{column}{LAG_SUFFIX}"),
                positions.iter().map(|&position| lag[position]).collect(),
            );
        }
        Ok(lagged)
    }
}

impl Predictor for SpatialLagModel {
    fn predict(&self, frame: &FeatureFrame<'_>) -> Result<Vec<f64>, CapabilityError> {
        let lagged = self.lagged(frame)?;
        self.model.evaluate(frame.len(), |name| {
            lagged
                .get(name)
                .cloned()
                .or_else(|| frame.column_index(name).map(|idx| frame.column_values(idx)))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpatialLagDefinition {
    #[serde(default)]
    pub intercept: f64,
    pub coefficients: IndexMap<String, f64>,
    pub lag_columns: Vec<String>,
}

/// Persisted predictor, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictorDefinition {
    Linear(LinearModel),
    SpatialLag(SpatialLagDefinition),
}

impl PredictorDefinition {
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Spatial-lag models lag over `graph`.
    pub fn into_predictor(self, graph: &Arc<SpatialWeightsGraph>) -> Box<dyn Predictor> {
        match self {
            PredictorDefinition::Linear(model) => Box::new(model),
            PredictorDefinition::SpatialLag(definition) => Box::new(SpatialLagModel::new(
                LinearModel {
                    intercept: definition.intercept,
                    coefficients: definition.coefficients,
                },
                definition.lag_columns,
                Arc::clone(graph),
            )),
        }
    }
}

/// Cumulative opportunities of one travel mode: what each origin reaches
/// within the travel-time cutoff.
#[derive(Debug)]
pub struct ModeAccessibility {
    baseline_jobs: Vec<f64>,
    baseline_greenspace: Vec<f64>,
    reach: SpatialWeightsGraph,
}

impl ModeAccessibility {
    /// Baselines must cover every origin of `reach`.
    pub fn new(
        mode: &str,
        baseline_jobs: &AreaSeries,
        baseline_greenspace: &AreaSeries,
        reach: SpatialWeightsGraph,
    ) -> Result<Self, ModelError> {
        let align = |series: &AreaSeries, indicator: &'static str| {
            reach
                .ids()
                .map(|area| match series.get(area) {
                    Some(value) if value.is_finite() => Ok(*value),
                    Some(_) => Err(ModelError::NonFiniteBaseline {
                        mode: mode.to_string(),
                        indicator,
                        area: area.to_string(),
                    }),
                    None => Err(ModelError::MissingBaseline {
                        mode: mode.to_string(),
                        indicator,
                        area: area.to_string(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
        };
        let baseline_jobs = align(baseline_jobs, "job accessibility")?;
        let baseline_greenspace = align(baseline_greenspace, "greenspace accessibility")?;
        Ok(Self {
            baseline_jobs,
            baseline_greenspace,
            reach,
        })
    }

    /// `baseline + reach · delta`, keyed by origin.
    fn score(
        &self,
        capability: &str,
        baseline: &[f64],
        delta: &AreaSeries,
    ) -> Result<AreaSeries, CapabilityError> {
        let mut aligned = vec![0.0; self.reach.n()];
        for (area, &value) in delta {
            let position =
                self.reach
                    .position(area)
                    .ok_or_else(|| CapabilityError::UnknownArea {
                        capability: capability.to_string(),
                        area: area.clone(),
                    })?;
            aligned[position] = value;
        }
        let gained = self.reach.lag(&aligned)?;
        Ok(self
            .reach
            .ids()
            .zip(baseline.iter().zip(gained))
            .map(|(area, (base, gain))| (area.to_string(), base + gain))
            .collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ModeDefinition {
    baseline_jobs: AreaSeries,
    baseline_greenspace: AreaSeries,
    reach: AdjacencyTable,
}

#[derive(Debug, Clone, Deserialize)]
struct AccessibilityDefinition {
    modes: IndexMap<String, ModeDefinition>,
}

/// Job and greenspace accessibility as cumulative sums over reachable
/// destinations, one reach graph per travel mode.
#[derive(Debug, Default)]
pub struct CumulativeAccessibility {
    modes: HashMap<String, ModeAccessibility>,
}

impl CumulativeAccessibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: impl Into<String>, accessibility: ModeAccessibility) -> Self {
        self.modes.insert(mode.into(), accessibility);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let definition: AccessibilityDefinition = serde_json::from_str(json)?;
        if definition.modes.is_empty() {
            return Err(ModelError::NoModes);
        }
        let mut accessibility = Self::new();
        for (mode, tables) in definition.modes {
            let reach = SpatialWeightsGraph::from_table(tables.reach)?;
            let scores = ModeAccessibility::new(
                &mode,
                &tables.baseline_jobs,
                &tables.baseline_greenspace,
                reach,
            )?;
            accessibility = accessibility.with_mode(mode, scores);
        }
        Ok(accessibility)
    }

    pub fn modes(&self) -> impl Iterator<Item = &str> + '_ {
        self.modes.keys().map(String::as_str)
    }

    fn mode(&self, mode: &str) -> Result<&ModeAccessibility, CapabilityError> {
        self.modes
            .get(mode)
            .ok_or_else(|| CapabilityError::UnknownMode(mode.to_string()))
    }
}

impl Accessibility for CumulativeAccessibility {
    fn job_accessibility(
        &self,
        jobs_delta: &AreaSeries,
        mode: &str,
    ) -> Result<AreaSeries, CapabilityError> {
        let scores = self.mode(mode)?;
        scores.score("job accessibility", &scores.baseline_jobs, jobs_delta)
    }

    fn greenspace_accessibility(
        &self,
        greenspace_delta: &AreaSeries,
        mode: &str,
    ) -> Result<AreaSeries, CapabilityError> {
        let scores = self.mode(mode)?;
        scores.score(
            "greenspace accessibility",
            &scores.baseline_greenspace,
            greenspace_delta,
        )
    }
}
