use serde::{Deserialize, Serialize};
use thiserror::Error;

use scenario_schema::{FEATURE_COUNT, FORM_FEATURE_COUNT, FUNCTION_FEATURE_COUNT};

/// Positions of the columns the synthesizer manipulates directly.
pub(crate) mod columns {
    pub const POPULATION: usize = 0;
    pub const JOBS: [usize; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
    pub const BLUE_COLLAR: [usize; 4] = [1, 2, 3, 5];
    pub const WHITE_COLLAR: [usize; 2] = [6, 7];
    #[cfg(test)]
    pub const SERVICES: [usize; 2] = [4, 8];
    pub const GREEN_URBAN_AREAS: usize = 13;
    pub const AREA_SCALED: [usize; 9] = [0, 1, 2, 3, 4, 5, 6, 7, 8];
}

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("feature row has {actual} values, expected {expected}")]
    WrongWidth { expected: usize, actual: usize },
    #[error("column {position} is '{found}' but the model schema expects '{expected}'")]
    SchemaMismatch {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("feature table has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },
    #[error("feature table has {ids} area ids but {rows} rows")]
    RowCount { ids: usize, rows: usize },
}

/// One area's explanatory variables in the fixed model column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn from_values(values: Vec<f64>) -> Result<Self, FeatureError> {
        if values.len() != FEATURE_COUNT {
            return Err(FeatureError::WrongWidth {
                expected: FEATURE_COUNT,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    pub fn zeros() -> Self {
        Self(vec![0.0; FEATURE_COUNT])
    }

    /// Concatenate the function and form groups into schema order.
    pub fn from_groups(
        function: [f64; FUNCTION_FEATURE_COUNT],
        form: [f64; FORM_FEATURE_COUNT],
    ) -> Self {
        let mut values = Vec::with_capacity(FEATURE_COUNT);
        values.extend_from_slice(&function);
        values.extend_from_slice(&form);
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        scenario_schema::feature_index(column).map(|idx| self.0[idx])
    }

    pub fn function(&self) -> [f64; FUNCTION_FEATURE_COUNT] {
        let mut group = [0.0; FUNCTION_FEATURE_COUNT];
        group.copy_from_slice(&self.0[..FUNCTION_FEATURE_COUNT]);
        group
    }

    pub fn form(&self) -> [f64; FORM_FEATURE_COUNT] {
        let mut group = [0.0; FORM_FEATURE_COUNT];
        group.copy_from_slice(&self.0[FUNCTION_FEATURE_COUNT..]);
        group
    }

    pub fn population(&self) -> f64 {
        self.0[columns::POPULATION]
    }

    pub fn jobs_total(&self) -> f64 {
        columns::JOBS.iter().map(|&idx| self.0[idx]).sum()
    }

    pub fn greenspace_share(&self) -> f64 {
        self.0[columns::GREEN_URBAN_AREAS]
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|value| value.is_finite())
    }
}

impl TryFrom<Vec<f64>> for FeatureVector {
    type Error = FeatureError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        FeatureVector::from_values(value)
    }
}

impl From<FeatureVector> for Vec<f64> {
    fn from(value: FeatureVector) -> Self {
        value.0
    }
}

/// Read-only tabular view handed to a predictor: one row per area.
#[derive(Debug, Clone)]
pub struct FeatureFrame<'a> {
    area_ids: Vec<&'a str>,
    columns: Vec<String>,
    rows: &'a [FeatureVector],
}

impl<'a> FeatureFrame<'a> {
    pub fn new(
        area_ids: Vec<&'a str>,
        columns: Vec<String>,
        rows: &'a [FeatureVector],
    ) -> Result<Self, FeatureError> {
        if area_ids.len() != rows.len() {
            return Err(FeatureError::RowCount {
                ids: area_ids.len(),
                rows: rows.len(),
            });
        }
        if columns.len() != FEATURE_COUNT {
            return Err(FeatureError::ColumnCount {
                expected: FEATURE_COUNT,
                actual: columns.len(),
            });
        }
        Ok(Self {
            area_ids,
            columns,
            rows,
        })
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        for column in self.columns.iter_mut().filter(|column| column.as_str() == from) {
            *column = to.to_string();
        }
    }

    /// Column names must match `expected` position by position.
    pub fn ensure_schema<'s>(
        &self,
        expected: impl IntoIterator<Item = &'s str>,
    ) -> Result<(), FeatureError> {
        let expected: Vec<&str> = expected.into_iter().collect();
        if expected.len() != self.columns.len() {
            return Err(FeatureError::ColumnCount {
                expected: expected.len(),
                actual: self.columns.len(),
            });
        }
        for (position, (want, found)) in expected.iter().zip(&self.columns).enumerate() {
            if *want != found {
                return Err(FeatureError::SchemaMismatch {
                    position,
                    expected: want.to_string(),
                    found: found.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn area_ids(&self) -> &[&'a str] {
        &self.area_ids
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn rows(&self) -> &'a [FeatureVector] {
        self.rows
    }

    pub fn column_values(&self, idx: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row.values()[idx]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_schema::{
        feature_index, feature_order, AREA_SCALED_FEATURES, BLUE_COLLAR, GREEN_URBAN_AREAS,
        JOB_CATEGORIES, POPULATION, SERVICES, WHITE_COLLAR,
    };

    fn positions(names: &[&str]) -> Vec<usize> {
        names
            .iter()
            .map(|name| feature_index(name).expect("schema column"))
            .collect()
    }

    #[test]
    fn column_positions_match_schema() {
        assert_eq!(feature_index(POPULATION), Some(columns::POPULATION));
        assert_eq!(
            feature_index(GREEN_URBAN_AREAS),
            Some(columns::GREEN_URBAN_AREAS)
        );
        assert_eq!(positions(&JOB_CATEGORIES), columns::JOBS.to_vec());
        assert_eq!(positions(&BLUE_COLLAR), columns::BLUE_COLLAR.to_vec());
        assert_eq!(positions(&WHITE_COLLAR), columns::WHITE_COLLAR.to_vec());
        assert_eq!(positions(&SERVICES), columns::SERVICES.to_vec());
        assert_eq!(
            positions(&AREA_SCALED_FEATURES),
            columns::AREA_SCALED.to_vec()
        );
    }

    #[test]
    fn vectors_reject_wrong_width() {
        assert_eq!(
            FeatureVector::from_values(vec![1.0; 3]),
            Err(FeatureError::WrongWidth {
                expected: FEATURE_COUNT,
                actual: 3
            })
        );
        let parsed: Result<FeatureVector, _> = serde_json::from_str("[1.0, 2.0]");
        assert!(parsed.is_err());
    }

    #[test]
    fn groups_concatenate_in_schema_order() {
        let mut function = [0.0; FUNCTION_FEATURE_COUNT];
        function[columns::POPULATION] = 120.0;
        function[columns::GREEN_URBAN_AREAS] = 0.1;
        let mut form = [0.0; FORM_FEATURE_COUNT];
        form[0] = 7.0;
        let vector = FeatureVector::from_groups(function, form);
        assert_eq!(vector.get(POPULATION), Some(120.0));
        assert_eq!(vector.get("sdbAre"), Some(7.0));
        assert_eq!(vector.greenspace_share(), 0.1);
        assert_eq!(vector.function(), function);
        assert_eq!(vector.form(), form);
    }

    #[test]
    fn frame_renames_and_checks_schema() {
        let rows = vec![FeatureVector::zeros()];
        let mut columns: Vec<String> = feature_order().map(str::to_string).collect();
        columns[0] = "population_estimate".to_string();
        let mut frame = FeatureFrame::new(vec!["E1"], columns, &rows).expect("frame");

        assert!(matches!(
            frame.ensure_schema(feature_order()),
            Err(FeatureError::SchemaMismatch { position: 0, .. })
        ));
        frame.rename_column("population_estimate", POPULATION);
        assert!(frame.ensure_schema(feature_order()).is_ok());
        assert_eq!(frame.column_index("sdbAre"), Some(16));
        assert_eq!(frame.column_values(0), vec![0.0]);
    }
}
