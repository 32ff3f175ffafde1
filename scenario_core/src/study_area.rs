use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    baseline::{
        AreaRecord, BaselineData, BaselineError, LabelledTable, SignatureProfiles,
        SignatureTables,
    },
    capability::{Capabilities, Predictor},
    config::EngineConfig,
    graph::{AdjacencyTable, GraphError, SpatialWeightsGraph},
    models::{CumulativeAccessibility, ModelError, PredictorDefinition},
};

pub const AREAS_FILE: &str = "areas.json";
pub const DEFAULT_DATA_FILE: &str = "default_data.json";
pub const MEDIAN_FORM_FILE: &str = "median_form.json";
pub const IQR_FORM_FILE: &str = "iqr_form.json";
pub const MEDIAN_FUNCTION_FILE: &str = "median_function.json";
pub const IQR_FUNCTION_FILE: &str = "iqr_function.json";
pub const MATRIX_FILE: &str = "matrix.json";
pub const AIR_QUALITY_MODEL_FILE: &str = "air_quality_model.json";
pub const HOUSE_PRICE_MODEL_FILE: &str = "house_price_model.json";
pub const ACCESSIBILITY_FILE: &str = "accessibility.json";

#[derive(Debug, Error)]
pub enum StudyAreaError {
    #[error("failed to read {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid adjacency in {path:?}: {source}")]
    Graph {
        path: PathBuf,
        #[source]
        source: GraphError,
    },
    #[error("invalid model in {path:?}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Baseline(#[from] BaselineError),
}

/// Baseline data, capabilities and configuration of one study area.
/// Immutable once built; engines share it through `Arc`.
#[derive(Debug)]
pub struct StudyArea {
    name: String,
    baseline: Arc<BaselineData>,
    capabilities: Capabilities,
    config: Arc<EngineConfig>,
}

impl StudyArea {
    pub fn new(
        name: impl Into<String>,
        baseline: Arc<BaselineData>,
        capabilities: Capabilities,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            baseline,
            capabilities,
            config,
        }
    }

    /// Load every table of a study area directory. The directory name
    /// becomes the study area name.
    pub fn from_dir(dir: &Path, config: Arc<EngineConfig>) -> Result<Self, StudyAreaError> {
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        let matrix_path = dir.join(MATRIX_FILE);
        let matrix: AdjacencyTable = read_json(&matrix_path)?;
        let adjacency = Arc::new(SpatialWeightsGraph::from_table(matrix).map_err(|source| {
            StudyAreaError::Graph {
                path: matrix_path.clone(),
                source,
            }
        })?);

        let tables = SignatureTables {
            median_form: read_json(&dir.join(MEDIAN_FORM_FILE))?,
            iqr_form: read_json(&dir.join(IQR_FORM_FILE))?,
            median_function: read_json(&dir.join(MEDIAN_FUNCTION_FILE))?,
            iqr_function: read_json(&dir.join(IQR_FUNCTION_FILE))?,
        };
        let profiles = SignatureProfiles::from_tables(&tables)?;

        let records: Vec<AreaRecord> = read_json(&dir.join(AREAS_FILE))?;
        let default_data: LabelledTable = read_json(&dir.join(DEFAULT_DATA_FILE))?;
        let baseline = BaselineData::from_tables(
            records,
            &default_data,
            profiles,
            Arc::clone(&adjacency),
            config.baseline_population_column(),
        )?;

        let capabilities = Capabilities {
            air_quality: load_predictor(&dir.join(AIR_QUALITY_MODEL_FILE), &adjacency)?,
            house_price: load_predictor(&dir.join(HOUSE_PRICE_MODEL_FILE), &adjacency)?,
            accessibility: Box::new(load_accessibility(&dir.join(ACCESSIBILITY_FILE))?),
        };

        tracing::info!(
            target: "scenario::study_area",
            name = %name,
            path = %dir.display(),
            areas = baseline.len(),
            parents = baseline.parents().len(),
            signature_profiles = baseline.profiles().len(),
            "study_area.loaded"
        );

        Ok(Self::new(name, Arc::new(baseline), capabilities, config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn baseline(&self) -> &Arc<BaselineData> {
        &self.baseline
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }
}

fn read_to_string(path: &Path) -> Result<String, StudyAreaError> {
    fs::read_to_string(path).map_err(|source| StudyAreaError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StudyAreaError> {
    let contents = read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| StudyAreaError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_predictor(
    path: &Path,
    adjacency: &Arc<SpatialWeightsGraph>,
) -> Result<Box<dyn Predictor>, StudyAreaError> {
    let definition = PredictorDefinition::from_json_str(&read_to_string(path)?).map_err(
        |source| StudyAreaError::Model {
            path: path.to_path_buf(),
            source,
        },
    )?;
    Ok(definition.into_predictor(adjacency))
}

fn load_accessibility(path: &Path) -> Result<CumulativeAccessibility, StudyAreaError> {
    CumulativeAccessibility::from_json_str(&read_to_string(path)?).map_err(|source| {
        StudyAreaError::Model {
            path: path.to_path_buf(),
            source,
        }
    })
}
