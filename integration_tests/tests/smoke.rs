mod common;

use scenario_core::{evaluate_scenario, EngineConfig, ScenarioEngine};
use scenario_schema::{ScenarioInput, ScenarioKnobs, SignatureType};

use common::{load_study_area, load_study_area_with, reference_knobs, PARENTS};

#[test]
fn fixture_study_area_loads() {
    let study_area = load_study_area();
    assert_eq!(study_area.name(), "study_area");
    let baseline = study_area.baseline();
    assert_eq!(baseline.len(), 9);
    assert_eq!(baseline.parents().collect::<Vec<_>>(), PARENTS);
    assert_eq!(baseline.profiles().len(), SignatureType::ALL.len());
    assert_eq!(baseline.population_column(), "population_estimate");
}

#[test]
fn api_publishes_typed_parents_only() {
    let study_area = load_study_area();
    let scenario = ScenarioInput::from([("E00000004".to_string(), reference_knobs())]);
    let output = evaluate_scenario(&study_area, &scenario, None).expect("output");

    assert_eq!(output.keys().collect::<Vec<_>>(), [PARENTS[0], PARENTS[1]]);
    for record in output.values() {
        assert!(record.air_quality.is_finite());
        assert!(record.house_price.is_finite());
        assert!(record.job_accessibility.is_finite());
        assert!(record.greenspace_accessibility.is_finite());
    }
}

#[test]
fn json_scenario_with_nulls_round_trips_through_the_api() {
    let study_area = load_study_area();
    let scenario: ScenarioInput = serde_json::from_str(
        r#"{
            "E00000002": {"signature_type": 11, "use": 0.5, "greenspace": 0.0, "job_types": 1.0},
            "E00000005": {"signature_type": null, "use": null, "greenspace": null, "job_types": null},
            "E00000008": {"greenspace": 0.3}
        }"#,
    )
    .expect("scenario parses");
    assert!(scenario["E00000005"].is_unset());
    assert_eq!(scenario["E00000002"].greenspace, Some(0.0));

    let output = evaluate_scenario(&study_area, &scenario, Some(1)).expect("output");
    let json = serde_json::to_value(&output).expect("serialize");
    assert_eq!(json[PARENTS[1]]["signature_type"], 10);
    assert!(json[PARENTS[0]]["air_quality"].is_f64());
    // partial knobs on an untyped area leave the parent untyped
    assert!(json.get(PARENTS[2]).is_none());
}

#[test]
fn bike_reach_spreads_changes_across_parents() {
    let knobs = ScenarioInput::from([(PARENTS[0].to_string(), reference_knobs())]);

    let walk = load_study_area();
    let walk_base = ScenarioEngine::new(walk.clone(), &ScenarioInput::new(), Some(5))
        .expect("walk baseline");
    let walk_edit = ScenarioEngine::new(walk, &knobs, Some(5)).expect("walk scenario");
    assert_eq!(
        walk_edit.indicators().get(PARENTS[1]).map(|row| row.means.job_accessibility),
        walk_base.indicators().get(PARENTS[1]).map(|row| row.means.job_accessibility)
    );

    let bike = load_study_area_with(EngineConfig::default().with_travel_mode("bike"));
    let bike_base = ScenarioEngine::new(bike.clone(), &ScenarioInput::new(), Some(5))
        .expect("bike baseline");
    let bike_edit = ScenarioEngine::new(bike, &knobs, Some(5)).expect("bike scenario");
    assert_ne!(
        bike_edit.indicators().get(PARENTS[1]).map(|row| row.means.job_accessibility),
        bike_base.indicators().get(PARENTS[1]).map(|row| row.means.job_accessibility)
    );
}

#[test]
fn explicit_zero_differs_from_unset() {
    let study_area = load_study_area();
    let zero = ScenarioKnobs {
        greenspace: Some(0.0),
        ..reference_knobs()
    };
    let unset = ScenarioKnobs {
        greenspace: None,
        ..reference_knobs()
    };
    let with_zero = ScenarioEngine::new(
        study_area.clone(),
        &ScenarioInput::from([(PARENTS[0].to_string(), zero)]),
        Some(9),
    )
    .expect("zero");
    let with_unset = ScenarioEngine::new(
        study_area,
        &ScenarioInput::from([(PARENTS[0].to_string(), unset)]),
        Some(9),
    )
    .expect("unset");
    // zero greenspace is a full scenario; an unset knob keeps the baseline
    assert_ne!(with_zero.features()[0], with_unset.features()[0]);
    assert_eq!(with_unset.greenspace_delta()[0], 0.0);
}
