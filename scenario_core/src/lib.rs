//! Scenario engine for small-area urban indicators.
//!
//! A [`StudyArea`] bundles the measured baseline of every area, the
//! per-signature statistics used to sample new built form, and the trained
//! capabilities. A [`ScenarioEngine`] applies scenario knobs on top of it,
//! re-synthesizing only the areas an edit touches, and publishes indicator
//! means per parent unit.

pub mod api;
pub mod baseline;
pub mod capability;
pub mod config;
pub mod engine;
pub mod features;
pub mod graph;
pub mod hashing;
pub mod models;
pub mod sampling;
pub mod scenario;
pub mod study_area;

pub use api::evaluate_scenario;
pub use baseline::{
    Area, AreaRecord, BaselineData, BaselineError, LabelledTable, SignatureProfile,
    SignatureProfiles, SignatureTables,
};
pub use capability::{Accessibility, AreaSeries, Capabilities, CapabilityError, Predictor};
pub use config::{
    load_engine_config_from_env, EngineConfig, EngineConfigError, EngineConfigMetadata,
    BUILTIN_ENGINE_CONFIG, ENGINE_CONFIG_ENV,
};
pub use engine::{AreaIndicators, EngineError, IndicatorTable, ParentIndicators, ScenarioEngine};
pub use features::{FeatureError, FeatureFrame, FeatureVector};
pub use graph::{
    AdjacencyEntry, AdjacencyTable, CsrMatrix, GraphError, SpatialWeightsGraph, Transformation,
};
pub use models::{
    CumulativeAccessibility, LinearModel, ModeAccessibility, ModelError, PredictorDefinition,
    SpatialLagModel,
};
pub use sampling::{SamplingMode, SynthesisError, SynthesizedArea, VariableSynthesizer};
pub use scenario::{KnobPatch, ScenarioError, ScenarioTable};
pub use study_area::{StudyArea, StudyAreaError};

pub use scenario_schema;
