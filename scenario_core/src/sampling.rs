//! Scenario variable synthesis.
//!
//! Turns one area's scenario knobs into a complete feature vector plus the
//! job and greenspace deltas consumed by the accessibility capability.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scenario_schema::{
    feature_order, validate_greenspace, validate_job_types, validate_use, KnobError,
    ScenarioKnobs, SignatureType, FORM_FEATURE_COUNT, FUNCTION_FEATURE_COUNT,
};

use crate::{
    baseline::{Area, SignatureProfiles},
    features::{columns, FeatureVector},
    hashing::area_seed,
};

pub type FunctionGroup = [f64; FUNCTION_FEATURE_COUNT];
pub type FormGroup = [f64; FORM_FEATURE_COUNT];

/// How sampled features draw from the random generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Every feature re-seeds a fresh generator with the scenario seed and
    /// takes one sample, so all features of all areas share the same
    /// standard-normal draw. Matches historical scenario outputs.
    #[default]
    SharedDraw,
    /// One generator per area, seeded from the scenario seed and the area id,
    /// advancing across features.
    Independent,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Knob(#[from] KnobError),
    #[error("no signature profile for {signature} (area '{area}')")]
    MissingProfile {
        area: String,
        signature: SignatureType,
    },
    #[error("cannot sample '{column}' for area '{area}': {reason}")]
    Distribution {
        area: String,
        column: String,
        reason: String,
    },
    #[error("synthesized features of area '{area}' contain non-finite values")]
    NonFinite { area: String },
}

/// Features and deltas of one area under a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedArea {
    pub features: FeatureVector,
    pub jobs_delta: f64,
    pub greenspace_delta: f64,
}

impl SynthesizedArea {
    /// Untouched baseline with zero deltas.
    pub fn baseline(area: &Area) -> Self {
        Self {
            features: area.baseline.clone(),
            jobs_delta: 0.0,
            greenspace_delta: 0.0,
        }
    }
}

enum DrawSource {
    Reseeded(Option<u64>),
    Stream(ChaCha8Rng),
}

impl DrawSource {
    fn for_area(mode: SamplingMode, seed: Option<u64>, area_id: &str) -> Self {
        match (mode, seed) {
            (SamplingMode::SharedDraw, seed) => DrawSource::Reseeded(seed),
            (SamplingMode::Independent, Some(seed)) => {
                DrawSource::Stream(ChaCha8Rng::seed_from_u64(area_seed(seed, area_id)))
            }
            (SamplingMode::Independent, None) => DrawSource::Stream(ChaCha8Rng::from_entropy()),
        }
    }

    fn sample(&mut self, normal: &Normal<f64>) -> f64 {
        match self {
            DrawSource::Reseeded(Some(seed)) => {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                normal.sample(&mut rng)
            }
            DrawSource::Reseeded(None) => {
                let mut rng = ChaCha8Rng::from_entropy();
                normal.sample(&mut rng)
            }
            DrawSource::Stream(rng) => normal.sample(rng),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VariableSynthesizer<'a> {
    profiles: &'a SignatureProfiles,
    mode: SamplingMode,
    iqr_divisor: f64,
}

impl<'a> VariableSynthesizer<'a> {
    pub fn new(profiles: &'a SignatureProfiles, mode: SamplingMode, iqr_divisor: f64) -> Self {
        Self {
            profiles,
            mode,
            iqr_divisor,
        }
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Synthesize `area` under `knobs`.
    ///
    /// A target signature type different from the area's own replaces form
    /// and function with samples from that type's profile; otherwise the
    /// measured baseline is kept. The land-use, greenspace and job-type knobs
    /// then adjust the function group, each only when it holds a value.
    pub fn synthesize(
        &self,
        area: &Area,
        knobs: &ScenarioKnobs,
        seed: Option<u64>,
    ) -> Result<SynthesizedArea, SynthesisError> {
        knobs.validate()?;

        let (mut function, form) = match knobs.signature_type {
            Some(target) if area.signature_type != Some(target) => {
                self.sample_profile(area, target, seed)?
            }
            _ => (area.baseline.function(), area.baseline.form()),
        };

        if let Some(index) = knobs.use_balance {
            rebalance_population(&mut function, index)?;
        }

        let greenspace_delta = match knobs.greenspace {
            Some(index) => reallocate_greenspace(&mut function, index)? * area.size,
            None => 0.0,
        };

        if let Some(index) = knobs.job_types {
            rebalance_job_types(&mut function, index)?;
        }

        let jobs_delta = jobs_total(&function) - area.baseline.jobs_total();
        let features = FeatureVector::from_groups(function, form);
        if !features.is_finite() || !jobs_delta.is_finite() || !greenspace_delta.is_finite() {
            return Err(SynthesisError::NonFinite {
                area: area.id.clone(),
            });
        }

        Ok(SynthesizedArea {
            features,
            jobs_delta,
            greenspace_delta,
        })
    }

    /// Draw every feature from `Normal(median, iqr / divisor)` of `target`,
    /// folded to non-negative values. Counts are scaled by the area size.
    fn sample_profile(
        &self,
        area: &Area,
        target: SignatureType,
        seed: Option<u64>,
    ) -> Result<(FunctionGroup, FormGroup), SynthesisError> {
        let profile = self
            .profiles
            .get(target)
            .ok_or_else(|| SynthesisError::MissingProfile {
                area: area.id.clone(),
                signature: target,
            })?;

        let mut draws = DrawSource::for_area(self.mode, seed, &area.id);
        let mut sampled = Vec::with_capacity(profile.median.values().len());
        for (column, (&median, &iqr)) in feature_order().zip(
            profile
                .median
                .values()
                .iter()
                .zip(profile.iqr.values().iter()),
        ) {
            let normal = Normal::new(median, iqr / self.iqr_divisor).map_err(|err| {
                SynthesisError::Distribution {
                    area: area.id.clone(),
                    column: column.to_string(),
                    reason: err.to_string(),
                }
            })?;
            sampled.push(draws.sample(&normal).abs());
        }

        let mut function = [0.0; FUNCTION_FEATURE_COUNT];
        function.copy_from_slice(&sampled[..FUNCTION_FEATURE_COUNT]);
        let mut form = [0.0; FORM_FEATURE_COUNT];
        form.copy_from_slice(&sampled[FUNCTION_FEATURE_COUNT..]);

        for idx in columns::AREA_SCALED {
            function[idx] *= area.size;
        }

        Ok((function, form))
    }
}

pub fn jobs_total(function: &FunctionGroup) -> f64 {
    columns::JOBS.iter().map(|&idx| function[idx]).sum()
}

/// Move mass between residents and workplaces. Negative `index` turns
/// `index * jobs` into residents, positive turns `index * population` into
/// jobs. Category proportions among jobs are kept.
pub fn rebalance_population(function: &mut FunctionGroup, index: f64) -> Result<(), KnobError> {
    validate_use(index)?;
    let n_jobs = jobs_total(function);
    let population = function[columns::POPULATION];
    let difference = if index < 0.0 {
        index * n_jobs
    } else {
        index * population
    };
    function[columns::POPULATION] = population - difference;
    distribute(function, &columns::JOBS, n_jobs, n_jobs + difference);
    Ok(())
}

/// Allocate `index` of the area to green urban space. Every function feature
/// shrinks by `1 - change`; returns the change of the greenspace share.
pub fn reallocate_greenspace(function: &mut FunctionGroup, index: f64) -> Result<f64, KnobError> {
    validate_greenspace(index)?;
    let change = index - function[columns::GREEN_URBAN_AREAS];
    for value in function.iter_mut() {
        *value *= 1.0 - change;
    }
    function[columns::GREEN_URBAN_AREAS] = index;
    Ok(change)
}

/// Split blue and white collar jobs so that white collar holds `index` of
/// their combined total. Services are untouched.
pub fn rebalance_job_types(function: &mut FunctionGroup, index: f64) -> Result<(), KnobError> {
    validate_job_types(index)?;
    let blue: f64 = columns::BLUE_COLLAR.iter().map(|&idx| function[idx]).sum();
    let white: f64 = columns::WHITE_COLLAR.iter().map(|&idx| function[idx]).sum();
    let total = blue + white;
    distribute(function, &columns::BLUE_COLLAR, blue, total * (1.0 - index));
    distribute(function, &columns::WHITE_COLLAR, white, total * index);
    Ok(())
}

/// Scale `group` from `current` to `target`, keeping proportions. An empty
/// group has no proportions, so the target is split evenly.
fn distribute(function: &mut FunctionGroup, group: &[usize], current: f64, target: f64) {
    if current > 0.0 {
        let multiplier = target / current;
        for &idx in group {
            function[idx] *= multiplier;
        }
    } else {
        let share = target / group.len() as f64;
        for &idx in group {
            function[idx] = share;
        }
    }
}
