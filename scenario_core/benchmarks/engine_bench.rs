use std::{collections::HashMap, sync::Arc};

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use scenario_core::{
    AdjacencyEntry, Area, AreaSeries, BaselineData, Capabilities, CumulativeAccessibility,
    EngineConfig, FeatureVector, LinearModel, ModeAccessibility, ScenarioEngine,
    SignatureProfile, SignatureProfiles, SpatialLagModel, SpatialWeightsGraph, StudyArea,
    Transformation,
};
use scenario_schema::{
    KnobEdit, ScenarioInput, ScenarioKnobs, SignatureType, FEATURE_COUNT, GREEN_URBAN_AREAS,
    POPULATION,
};

const AREAS_PER_PARENT: usize = 5;

fn area_id(idx: usize) -> String {
    format!("E{idx:08}")
}

/// Ring of areas, each adjacent to its two neighbours.
fn ring(
    areas: usize,
    weight: f64,
    transformation: Transformation,
    self_loops: bool,
) -> SpatialWeightsGraph {
    let mut entries = Vec::with_capacity(areas * 3);
    for idx in 0..areas {
        if self_loops {
            entries.push(AdjacencyEntry::new(area_id(idx), area_id(idx), weight));
        }
        entries.push(AdjacencyEntry::new(area_id(idx), area_id((idx + 1) % areas), weight));
        entries.push(AdjacencyEntry::new(
            area_id(idx),
            area_id((idx + areas - 1) % areas),
            weight,
        ));
    }
    SpatialWeightsGraph::new(entries, transformation, false).expect("ring graph")
}

fn configure_study_area(parents: usize) -> Arc<StudyArea> {
    let areas = parents * AREAS_PER_PARENT;
    let adjacency = Arc::new(ring(areas, 0.5, Transformation::RowStandardized, false));

    let rows = (0..areas)
        .map(|idx| {
            let mut values: Vec<f64> = (0..FEATURE_COUNT).map(|col| 1.0 + col as f64).collect();
            values[0] = 200.0 + (idx % 17) as f64;
            values[13] = 0.05;
            Area {
                id: area_id(idx),
                parent: format!("P{:06}", idx / AREAS_PER_PARENT),
                size: 1.0 + (idx % 3) as f64,
                signature_type: SignatureType::from_code((idx % 16) as u8),
                baseline: FeatureVector::from_values(values).expect("width"),
            }
        })
        .collect();

    let profiles = SignatureType::ALL
        .iter()
        .map(|&signature| {
            let median: Vec<f64> = (0..FEATURE_COUNT)
                .map(|col| 10.0 + col as f64 + signature.code() as f64)
                .collect();
            (
                signature,
                SignatureProfile {
                    median: FeatureVector::from_values(median).expect("width"),
                    iqr: FeatureVector::from_values(vec![2.5; FEATURE_COUNT]).expect("width"),
                },
            )
        })
        .collect::<HashMap<_, _>>();

    let baseline = BaselineData::new(
        rows,
        SignatureProfiles::new(profiles).expect("profiles"),
        Arc::clone(&adjacency),
        "population_estimate",
    )
    .expect("baseline");

    let scores: AreaSeries = (0..areas).map(|idx| (area_id(idx), 1_000.0)).collect();
    let walk = ModeAccessibility::new(
        "walk",
        &scores,
        &scores,
        ring(areas, 1.0, Transformation::Binary, true),
    )
    .expect("walk");

    let capabilities = Capabilities {
        air_quality: Box::new(SpatialLagModel::new(
            LinearModel::new(3.0, [("population", 0.01), ("population_lag", 0.02)]),
            vec!["population".to_string()],
            adjacency,
        )),
        house_price: Box::new(LinearModel::new(
            250.0,
            [(POPULATION, 0.5), (GREEN_URBAN_AREAS, -10.0)],
        )),
        accessibility: Box::new(CumulativeAccessibility::new().with_mode("walk", walk)),
    };

    Arc::new(StudyArea::new(
        "bench",
        Arc::new(baseline),
        capabilities,
        EngineConfig::builtin(),
    ))
}

fn scenario(parents: usize) -> ScenarioInput {
    (0..parents)
        .step_by(4)
        .map(|parent| {
            (
                format!("P{parent:06}"),
                ScenarioKnobs::new(SignatureType::DenseUrban, 0.4, 0.2, 0.8),
            )
        })
        .collect()
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenario_engine");

    for parents in [20usize, 100, 400] {
        let study_area = configure_study_area(parents);
        let input = scenario(parents);

        group.bench_with_input(BenchmarkId::new("full_build", parents), &parents, |b, _| {
            b.iter(|| {
                ScenarioEngine::new(Arc::clone(&study_area), &input, Some(0)).expect("engine")
            });
        });

        group.bench_with_input(
            BenchmarkId::new("incremental_change", parents),
            &parents,
            |b, _| {
                b.iter_batched(
                    || {
                        ScenarioEngine::new(Arc::clone(&study_area), &input, Some(0))
                            .expect("engine")
                    },
                    |mut engine| {
                        engine
                            .change_at(1, KnobEdit::Use(Some(-0.3)))
                            .expect("change");
                        engine
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
