//! Seams to the externally trained models and the accessibility calculator.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{
    features::{FeatureError, FeatureFrame},
    graph::GraphError,
};

/// Per-area values keyed by area id, in insertion order.
pub type AreaSeries = IndexMap<String, f64>;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{capability} returned {actual} values for {expected} areas")]
    LengthMismatch {
        capability: String,
        expected: usize,
        actual: usize,
    },
    #[error("{capability} returned no value for area '{area}'")]
    MissingArea { capability: String, area: String },
    #[error("{capability} has no data for area '{area}'")]
    UnknownArea { capability: String, area: String },
    #[error("{capability} returned a non-finite value for area '{area}'")]
    NonFinite { capability: String, area: String },
    #[error("model references unknown column '{0}'")]
    UnknownColumn(String),
    #[error("unknown travel mode '{0}'")]
    UnknownMode(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// A trained regression over the fixed feature schema.
pub trait Predictor: fmt::Debug + Send + Sync {
    /// One value per frame row, in row order.
    fn predict(&self, frame: &FeatureFrame<'_>) -> Result<Vec<f64>, CapabilityError>;
}

pub trait Accessibility: fmt::Debug + Send + Sync {
    fn job_accessibility(
        &self,
        jobs_delta: &AreaSeries,
        mode: &str,
    ) -> Result<AreaSeries, CapabilityError>;

    fn greenspace_accessibility(
        &self,
        greenspace_delta: &AreaSeries,
        mode: &str,
    ) -> Result<AreaSeries, CapabilityError>;
}

/// The collaborators one study area predicts with.
#[derive(Debug)]
pub struct Capabilities {
    pub air_quality: Box<dyn Predictor>,
    pub house_price: Box<dyn Predictor>,
    pub accessibility: Box<dyn Accessibility>,
}

/// Predictor output must hold one finite value per row.
pub(crate) fn checked_predictions(
    capability: &str,
    area_ids: &[&str],
    values: Vec<f64>,
) -> Result<Vec<f64>, CapabilityError> {
    if values.len() != area_ids.len() {
        return Err(CapabilityError::LengthMismatch {
            capability: capability.to_string(),
            expected: area_ids.len(),
            actual: values.len(),
        });
    }
    if let Some((area, _)) = area_ids
        .iter()
        .zip(&values)
        .find(|(_, value)| !value.is_finite())
    {
        return Err(CapabilityError::NonFinite {
            capability: capability.to_string(),
            area: area.to_string(),
        });
    }
    Ok(values)
}

/// Read `series` in `area_ids` order; every area needs a finite value.
pub(crate) fn aligned_series<'a>(
    capability: &str,
    area_ids: impl IntoIterator<Item = &'a str>,
    series: &AreaSeries,
) -> Result<Vec<f64>, CapabilityError> {
    area_ids
        .into_iter()
        .map(|area| match series.get(area) {
            Some(value) if value.is_finite() => Ok(*value),
            Some(_) => Err(CapabilityError::NonFinite {
                capability: capability.to_string(),
                area: area.to_string(),
            }),
            None => Err(CapabilityError::MissingArea {
                capability: capability.to_string(),
                area: area.to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictions_need_one_finite_value_per_row() {
        let ids = ["E1", "E2"];
        assert_eq!(
            checked_predictions("air_quality", &ids, vec![1.0, 2.0]).expect("valid"),
            vec![1.0, 2.0]
        );
        assert!(matches!(
            checked_predictions("air_quality", &ids, vec![1.0]),
            Err(CapabilityError::LengthMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            checked_predictions("air_quality", &ids, vec![1.0, f64::NAN]),
            Err(CapabilityError::NonFinite { area, .. }) if area == "E2"
        ));
    }

    #[test]
    fn series_are_read_in_area_order() {
        let series = AreaSeries::from([("E2".to_string(), 2.0), ("E1".to_string(), 1.0)]);
        assert_eq!(
            aligned_series("job_accessibility", ["E1", "E2"], &series).expect("aligned"),
            vec![1.0, 2.0]
        );
        assert!(matches!(
            aligned_series("job_accessibility", ["E1", "E3"], &series),
            Err(CapabilityError::MissingArea { area, .. }) if area == "E3"
        ));
    }
}
