mod common;

use std::{fs, sync::Arc};

use scenario_core::{
    evaluate_scenario, BaselineError, Capabilities, CapabilityError, CumulativeAccessibility,
    EngineConfig, EngineError, FeatureFrame, LinearModel, Predictor, ScenarioEngine,
    ScenarioError, StudyArea, StudyAreaError,
};
use scenario_schema::{KnobError, ScenarioInput, ScenarioKnobs};

use common::{
    load_study_area, load_study_area_with, reference_knobs, rewrite_json, scratch_study_area,
    study_area_dir,
};

/// Always one value short.
#[derive(Debug)]
struct ShortPredictor;

impl Predictor for ShortPredictor {
    fn predict(&self, frame: &FeatureFrame<'_>) -> Result<Vec<f64>, CapabilityError> {
        Ok(vec![1.0; frame.len().saturating_sub(1)])
    }
}

#[test]
fn out_of_range_knobs_are_rejected() {
    let study_area = load_study_area();
    let knobs = ScenarioKnobs {
        use_balance: Some(1.5),
        ..reference_knobs()
    };
    let scenario = ScenarioInput::from([("E00000001".to_string(), knobs)]);
    let err = evaluate_scenario(&study_area, &scenario, None).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Scenario(ScenarioError::InvalidKnobs {
            ref id,
            source: KnobError::UseOutOfRange(_),
        }) if id == "E00000001"
    ));
}

#[test]
fn unknown_area_is_rejected() {
    let study_area = load_study_area();
    let scenario = ScenarioInput::from([("E99999999".to_string(), reference_knobs())]);
    assert!(matches!(
        evaluate_scenario(&study_area, &scenario, None),
        Err(EngineError::Scenario(ScenarioError::UnknownArea(area))) if area == "E99999999"
    ));
}

#[test]
fn area_ids_are_not_parent_ids() {
    let study_area = load_study_area();
    let scenario = ScenarioInput::from([("E00000001".to_string(), reference_knobs())]);
    assert!(matches!(
        ScenarioEngine::new(study_area, &scenario, None),
        Err(EngineError::Scenario(ScenarioError::UnknownParent(_)))
    ));
}

#[test]
fn predictor_with_wrong_output_length_fails_the_scenario() {
    let loaded = load_study_area();
    let accessibility = CumulativeAccessibility::from_json_str(
        &fs::read_to_string(study_area_dir().join("accessibility.json")).expect("read"),
    )
    .expect("accessibility");
    let study_area = Arc::new(StudyArea::new(
        "short",
        Arc::clone(loaded.baseline()),
        Capabilities {
            air_quality: Box::new(ShortPredictor),
            house_price: Box::new(LinearModel::new(240.0, [("population", 0.01)])),
            accessibility: Box::new(accessibility),
        },
        Arc::new(EngineConfig::default()),
    ));

    let err = ScenarioEngine::new(study_area, &ScenarioInput::new(), Some(0)).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Capability(CapabilityError::LengthMismatch {
            expected: 9,
            actual: 8,
            ..
        })
    ));
}

#[test]
fn unknown_travel_mode_fails_prediction() {
    let study_area = load_study_area_with(EngineConfig::default().with_travel_mode("teleport"));
    assert!(matches!(
        evaluate_scenario(&study_area, &ScenarioInput::new(), None),
        Err(EngineError::Capability(CapabilityError::UnknownMode(mode))) if mode == "teleport"
    ));
}

#[test]
fn missing_table_reports_its_path() {
    let scratch = scratch_study_area();
    fs::remove_file(scratch.path().join("iqr_function.json")).expect("remove");
    let err = StudyArea::from_dir(scratch.path(), Arc::new(EngineConfig::default())).unwrap_err();
    match err {
        StudyAreaError::ReadFailed { path, .. } => assert!(path.ends_with("iqr_function.json")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn area_outside_the_adjacency_graph_is_rejected() {
    let scratch = scratch_study_area();
    rewrite_json(&scratch.path().join("matrix.json"), |matrix| {
        if let Some(entries) = matrix["entries"].as_array_mut() {
            entries.retain(|entry| {
                entry["focal"] != "E00000009" && entry["neighbor"] != "E00000009"
            });
        }
    });
    let err = StudyArea::from_dir(scratch.path(), Arc::new(EngineConfig::default())).unwrap_err();
    assert!(matches!(
        err,
        StudyAreaError::Baseline(BaselineError::NotInAdjacency { ref area }) if area == "E00000009"
    ));
}

#[test]
fn unknown_model_kind_is_reported_with_path() {
    let scratch = scratch_study_area();
    rewrite_json(&scratch.path().join("house_price_model.json"), |model| {
        model["kind"] = "gradient_boosting".into();
    });
    let err = StudyArea::from_dir(scratch.path(), Arc::new(EngineConfig::default())).unwrap_err();
    assert!(matches!(
        err,
        StudyAreaError::Model { ref path, .. } if path.ends_with("house_price_model.json")
    ));
}
