#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use scenario_core::{EngineConfig, StudyArea};
use scenario_schema::{ScenarioKnobs, ScenarioOutput, SignatureType};

pub const PARENTS: [&str; 3] = ["E01000001", "E01000002", "E01000003"];

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn study_area_dir() -> PathBuf {
    fixtures_dir().join("study_area")
}

pub fn load_study_area() -> Arc<StudyArea> {
    load_study_area_with(EngineConfig::default())
}

pub fn load_study_area_with(config: EngineConfig) -> Arc<StudyArea> {
    let dir = study_area_dir();
    debug_assert!(dir.exists(), "missing fixture study area at {}", dir.display());
    Arc::new(StudyArea::from_dir(&dir, Arc::new(config)).expect("fixture study area loads"))
}

pub fn expected_baseline() -> ScenarioOutput {
    let json = fs::read_to_string(fixtures_dir().join("expected_baseline.json"))
        .expect("expected baseline fixture");
    serde_json::from_str(&json).expect("expected baseline parses")
}

/// `{signature_type: 3, use: 0.4, greenspace: 0.2, job_types: 0.8}`.
pub fn reference_knobs() -> ScenarioKnobs {
    ScenarioKnobs::new(SignatureType::WarehousePark, 0.4, 0.2, 0.8)
}

/// Copy of the fixture study area that a test may break.
pub fn scratch_study_area() -> tempfile::TempDir {
    let scratch = tempfile::tempdir().expect("tempdir");
    for entry in fs::read_dir(study_area_dir()).expect("fixture dir") {
        let entry = entry.expect("fixture entry");
        fs::copy(entry.path(), scratch.path().join(entry.file_name())).expect("copy fixture");
    }
    scratch
}

pub fn rewrite_json(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("parse");
    edit(&mut value);
    fs::write(path, serde_json::to_string(&value).expect("serialize")).expect("write");
}

pub fn assert_close(actual: f64, expected: f64, label: &str) {
    let tolerance = 1e-9 * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() < tolerance,
        "{label}: {actual} != {expected}"
    );
}

pub fn assert_outputs_close(actual: &ScenarioOutput, expected: &ScenarioOutput) {
    assert_eq!(
        actual.keys().collect::<Vec<_>>(),
        expected.keys().collect::<Vec<_>>()
    );
    for (parent, want) in expected {
        let got = &actual[parent];
        assert_eq!(got.signature_type, want.signature_type, "{parent} signature");
        assert_close(got.air_quality, want.air_quality, &format!("{parent} air_quality"));
        assert_close(got.house_price, want.house_price, &format!("{parent} house_price"));
        assert_close(
            got.job_accessibility,
            want.job_accessibility,
            &format!("{parent} job_accessibility"),
        );
        assert_close(
            got.greenspace_accessibility,
            want.greenspace_accessibility,
            &format!("{parent} greenspace_accessibility"),
        );
    }
}
