//! Baseline tables of a study area: the measured state every scenario starts
//! from, plus the per-signature statistics used to sample new form.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::Arc,
};

use indexmap::IndexMap;
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};
use thiserror::Error;

use scenario_schema::{
    feature_order, SignatureType, FEATURE_COUNT, FORM_FEATURES, FUNCTION_FEATURES, POPULATION,
};

use crate::{
    features::{FeatureError, FeatureVector},
    graph::SpatialWeightsGraph,
};

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("the baseline table contains no areas")]
    Empty,
    #[error("area '{0}' appears more than once")]
    DuplicateArea(String),
    #[error("area '{area}' has no parent unit mapping")]
    MissingParent { area: String },
    #[error("area '{area}' is mapped to a parent but has no baseline row")]
    UnknownArea { area: String },
    #[error("area '{area}' has invalid geometric size {size}")]
    InvalidSize { area: String, size: f64 },
    #[error("baseline row of area '{area}' contains non-finite values")]
    NonFiniteBaseline { area: String },
    #[error("baseline row of area '{area}' is malformed: {source}")]
    Feature {
        area: String,
        #[source]
        source: FeatureError,
    },
    #[error("table '{table}' lists row '{row}' more than once")]
    DuplicateRow { table: String, row: String },
    #[error("table '{table}' is missing column '{column}'")]
    MissingColumn { table: String, column: String },
    #[error("table '{table}' row '{row}' has {actual} values for {expected} columns")]
    RowWidth {
        table: String,
        row: String,
        expected: usize,
        actual: usize,
    },
    #[error("unknown signature type label '{0}'")]
    UnknownSignature(String),
    #[error("signature type {signature} is missing from table '{table}'")]
    MissingProfile {
        signature: SignatureType,
        table: String,
    },
    #[error("signature type {signature} has invalid {table} value {value} for '{column}'")]
    InvalidStatistic {
        signature: SignatureType,
        table: String,
        column: String,
        value: f64,
    },
    #[error("area '{area}' is missing from the spatial adjacency graph")]
    NotInAdjacency { area: String },
}

/// Smallest spatial unit carrying its own knobs and features.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub id: String,
    pub parent: String,
    /// Geometric area, used to turn sampled densities into counts.
    pub size: f64,
    pub signature_type: Option<SignatureType>,
    pub baseline: FeatureVector,
}

/// Per-area record of `areas.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaRecord {
    pub id: String,
    pub parent: String,
    pub area: f64,
    #[serde(default)]
    pub signature_type: Option<String>,
}

/// Column-labelled table keyed by row label, preserving row order. Rows
/// are kept as read so repeated labels can be reported.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelledTable {
    pub columns: Vec<String>,
    #[serde(deserialize_with = "ordered_rows")]
    pub rows: Vec<(String, Vec<f64>)>,
}

/// JSON object to `(label, values)` pairs in document order, duplicates kept.
fn ordered_rows<'de, D>(deserializer: D) -> Result<Vec<(String, Vec<f64>)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct RowsVisitor;

    impl<'de> Visitor<'de> for RowsVisitor {
        type Value = Vec<(String, Vec<f64>)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of row label to values")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut rows = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(row) = map.next_entry::<String, Vec<f64>>()? {
                rows.push(row);
            }
            Ok(rows)
        }
    }

    deserializer.deserialize_map(RowsVisitor)
}

impl LabelledTable {
    /// Pick `wanted` columns, in that order, from every row.
    fn select(
        &self,
        table: &str,
        wanted: &[&str],
    ) -> Result<Vec<(String, Vec<f64>)>, BaselineError> {
        let positions = wanted
            .iter()
            .map(|column| {
                self.columns
                    .iter()
                    .position(|have| have == column)
                    .ok_or_else(|| BaselineError::MissingColumn {
                        table: table.to_string(),
                        column: column.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows
            .iter()
            .map(|(label, values)| {
                if !seen.insert(label.as_str()) {
                    return Err(BaselineError::DuplicateRow {
                        table: table.to_string(),
                        row: label.clone(),
                    });
                }
                if values.len() != self.columns.len() {
                    return Err(BaselineError::RowWidth {
                        table: table.to_string(),
                        row: label.clone(),
                        expected: self.columns.len(),
                        actual: values.len(),
                    });
                }
                let picked = positions.iter().map(|&idx| values[idx]).collect();
                Ok((label.clone(), picked))
            })
            .collect()
    }
}

/// Median and inter-quartile range of every feature for one signature type.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureProfile {
    pub median: FeatureVector,
    pub iqr: FeatureVector,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureProfiles {
    profiles: HashMap<SignatureType, SignatureProfile>,
}

/// The four persisted signature statistic tables.
#[derive(Debug, Clone)]
pub struct SignatureTables {
    pub median_form: LabelledTable,
    pub iqr_form: LabelledTable,
    pub median_function: LabelledTable,
    pub iqr_function: LabelledTable,
}

impl SignatureProfiles {
    pub fn new(profiles: HashMap<SignatureType, SignatureProfile>) -> Result<Self, BaselineError> {
        for (&signature, profile) in &profiles {
            for (column, (&median, &iqr)) in feature_order().zip(
                profile
                    .median
                    .values()
                    .iter()
                    .zip(profile.iqr.values().iter()),
            ) {
                if !median.is_finite() {
                    return Err(BaselineError::InvalidStatistic {
                        signature,
                        table: "median".to_string(),
                        column: column.to_string(),
                        value: median,
                    });
                }
                if !iqr.is_finite() || iqr < 0.0 {
                    return Err(BaselineError::InvalidStatistic {
                        signature,
                        table: "iqr".to_string(),
                        column: column.to_string(),
                        value: iqr,
                    });
                }
            }
        }
        Ok(Self { profiles })
    }

    /// Merge the form and function tables. A signature listed in any table
    /// must be present in all four.
    pub fn from_tables(tables: &SignatureTables) -> Result<Self, BaselineError> {
        let median_form =
            index_by_signature(tables.median_form.select("median_form", &FORM_FEATURES)?)?;
        let iqr_form =
            index_by_signature(tables.iqr_form.select("iqr_form", &FORM_FEATURES)?)?;
        let median_function = index_by_signature(
            tables
                .median_function
                .select("median_function", &FUNCTION_FEATURES)?,
        )?;
        let iqr_function = index_by_signature(
            tables
                .iqr_function
                .select("iqr_function", &FUNCTION_FEATURES)?,
        )?;

        let mut signatures: Vec<SignatureType> = median_form
            .keys()
            .chain(iqr_form.keys())
            .chain(median_function.keys())
            .chain(iqr_function.keys())
            .copied()
            .collect();
        signatures.sort_unstable();
        signatures.dedup();

        let lookup = |table: &BTreeMap<SignatureType, Vec<f64>>,
                      name: &str,
                      signature: SignatureType|
         -> Result<Vec<f64>, BaselineError> {
            table
                .get(&signature)
                .cloned()
                .ok_or_else(|| BaselineError::MissingProfile {
                    signature,
                    table: name.to_string(),
                })
        };

        let mut profiles = HashMap::with_capacity(signatures.len());
        for signature in signatures {
            let mut median = lookup(&median_function, "median_function", signature)?;
            median.extend(lookup(&median_form, "median_form", signature)?);
            let mut iqr = lookup(&iqr_function, "iqr_function", signature)?;
            iqr.extend(lookup(&iqr_form, "iqr_form", signature)?);
            profiles.insert(
                signature,
                SignatureProfile {
                    median: to_vector(signature.name(), median)?,
                    iqr: to_vector(signature.name(), iqr)?,
                },
            );
        }
        Self::new(profiles)
    }

    pub fn get(&self, signature: SignatureType) -> Option<&SignatureProfile> {
        self.profiles.get(&signature)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn index_by_signature(
    rows: Vec<(String, Vec<f64>)>,
) -> Result<BTreeMap<SignatureType, Vec<f64>>, BaselineError> {
    rows.into_iter()
        .map(|(label, values)| {
            SignatureType::from_name(&label)
                .map(|signature| (signature, values))
                .ok_or(BaselineError::UnknownSignature(label))
        })
        .collect()
}

fn to_vector(area: &str, values: Vec<f64>) -> Result<FeatureVector, BaselineError> {
    FeatureVector::from_values(values).map_err(|source| BaselineError::Feature {
        area: area.to_string(),
        source,
    })
}

/// Immutable baseline state of a study area.
#[derive(Debug, Clone)]
pub struct BaselineData {
    areas: Vec<Area>,
    index: HashMap<String, usize>,
    parents: IndexMap<String, Vec<usize>>,
    profiles: SignatureProfiles,
    adjacency: Arc<SpatialWeightsGraph>,
    population_column: String,
}

impl BaselineData {
    /// `population_column` is the label the persisted tables use for the
    /// population feature; it is renamed for the predictors.
    pub fn new(
        areas: Vec<Area>,
        profiles: SignatureProfiles,
        adjacency: Arc<SpatialWeightsGraph>,
        population_column: impl Into<String>,
    ) -> Result<Self, BaselineError> {
        if areas.is_empty() {
            return Err(BaselineError::Empty);
        }

        let mut index = HashMap::with_capacity(areas.len());
        let mut parents: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (idx, area) in areas.iter().enumerate() {
            if index.insert(area.id.clone(), idx).is_some() {
                return Err(BaselineError::DuplicateArea(area.id.clone()));
            }
            if !area.size.is_finite() || area.size <= 0.0 {
                return Err(BaselineError::InvalidSize {
                    area: area.id.clone(),
                    size: area.size,
                });
            }
            if !area.baseline.is_finite() {
                return Err(BaselineError::NonFiniteBaseline {
                    area: area.id.clone(),
                });
            }
            if !adjacency.contains(&area.id) {
                return Err(BaselineError::NotInAdjacency {
                    area: area.id.clone(),
                });
            }
            parents.entry(area.parent.clone()).or_default().push(idx);
        }

        Ok(Self {
            areas,
            index,
            parents,
            profiles,
            adjacency,
            population_column: population_column.into(),
        })
    }

    /// Join the default feature table with the area records. Rows follow the
    /// order of the default table.
    pub fn from_tables(
        records: Vec<AreaRecord>,
        default_data: &LabelledTable,
        profiles: SignatureProfiles,
        adjacency: Arc<SpatialWeightsGraph>,
        population_column: &str,
    ) -> Result<Self, BaselineError> {
        let wanted: Vec<&str> = feature_order()
            .map(|column| {
                if column == POPULATION {
                    population_column
                } else {
                    column
                }
            })
            .collect();
        let rows = default_data.select("default_data", &wanted)?;

        let mut by_id: HashMap<String, AreaRecord> = HashMap::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            if by_id.insert(id.clone(), record).is_some() {
                return Err(BaselineError::DuplicateArea(id));
            }
        }

        let mut areas = Vec::with_capacity(rows.len());
        for (id, values) in rows {
            let record = by_id
                .remove(&id)
                .ok_or_else(|| BaselineError::MissingParent { area: id.clone() })?;
            let signature_type = match record.signature_type {
                Some(label) => Some(
                    SignatureType::from_name(&label)
                        .ok_or(BaselineError::UnknownSignature(label))?,
                ),
                None => None,
            };
            let baseline = to_vector(&id, values)?;
            areas.push(Area {
                id,
                parent: record.parent,
                size: record.area,
                signature_type,
                baseline,
            });
        }

        if let Some(area) = by_id.into_keys().min() {
            return Err(BaselineError::UnknownArea { area });
        }

        Self::new(areas, profiles, adjacency, population_column)
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn area(&self, idx: usize) -> Option<&Area> {
        self.areas.get(idx)
    }

    pub fn area_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Parent units in first-seen order.
    pub fn parents(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.parents.keys().map(String::as_str)
    }

    pub fn parent_at(&self, position: usize) -> Option<&str> {
        self.parents
            .get_index(position)
            .map(|(parent, _)| parent.as_str())
    }

    /// Indices of the child areas of `parent`.
    pub fn children(&self, parent: &str) -> Option<&[usize]> {
        self.parents.get(parent).map(Vec::as_slice)
    }

    pub fn profiles(&self) -> &SignatureProfiles {
        &self.profiles
    }

    pub fn adjacency(&self) -> &Arc<SpatialWeightsGraph> {
        &self.adjacency
    }

    pub fn population_column(&self) -> &str {
        &self.population_column
    }

    /// Column labels of the stored feature table, population label included.
    pub fn feature_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = feature_order().map(str::to_string).collect();
        columns[0] = self.population_column.clone();
        debug_assert_eq!(columns.len(), FEATURE_COUNT);
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AdjacencyEntry, Transformation};

    fn self_loops(ids: &[&str]) -> Arc<SpatialWeightsGraph> {
        let entries = ids
            .iter()
            .map(|id| AdjacencyEntry::new(*id, *id, 0.0))
            .collect();
        Arc::new(
            SpatialWeightsGraph::new(entries, Transformation::RowStandardized, false)
                .expect("graph"),
        )
    }

    fn area(id: &str, parent: &str) -> Area {
        Area {
            id: id.to_string(),
            parent: parent.to_string(),
            size: 1.0,
            signature_type: None,
            baseline: FeatureVector::zeros(),
        }
    }

    fn table(columns: &[&str], rows: &[(&str, Vec<f64>)]) -> LabelledTable {
        LabelledTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|(label, values)| (label.to_string(), values.clone()))
                .collect(),
        }
    }

    #[test]
    fn parents_keep_first_seen_order() {
        let baseline = BaselineData::new(
            vec![area("a1", "P2"), area("a2", "P1"), area("a3", "P2")],
            SignatureProfiles::default(),
            self_loops(&["a1", "a2", "a3"]),
            "population",
        )
        .expect("baseline");
        let parents: Vec<&str> = baseline.parents().collect();
        assert_eq!(parents, vec!["P2", "P1"]);
        assert_eq!(baseline.children("P2"), Some(&[0usize, 2][..]));
        assert_eq!(baseline.parent_at(1), Some("P1"));
        assert_eq!(baseline.area_index("a3"), Some(2));
    }

    #[test]
    fn consistency_errors_are_fatal() {
        let missing_from_graph = BaselineData::new(
            vec![area("a1", "P1"), area("a2", "P1")],
            SignatureProfiles::default(),
            self_loops(&["a1"]),
            "population",
        );
        assert!(matches!(
            missing_from_graph,
            Err(BaselineError::NotInAdjacency { .. })
        ));

        let duplicate = BaselineData::new(
            vec![area("a1", "P1"), area("a1", "P1")],
            SignatureProfiles::default(),
            self_loops(&["a1"]),
            "population",
        );
        assert!(matches!(duplicate, Err(BaselineError::DuplicateArea(_))));

        let mut bad_size = area("a1", "P1");
        bad_size.size = 0.0;
        let invalid = BaselineData::new(
            vec![bad_size],
            SignatureProfiles::default(),
            self_loops(&["a1"]),
            "population",
        );
        assert!(matches!(invalid, Err(BaselineError::InvalidSize { .. })));
    }

    #[test]
    fn default_table_is_reordered_into_schema() {
        let mut columns: Vec<&str> = feature_order().collect();
        columns[0] = "population_estimate";
        columns.reverse();
        let mut values: Vec<f64> = (0..FEATURE_COUNT).map(|v| v as f64).collect();
        values.reverse();
        let default_data = table(&columns, &[("a1", values)]);

        let baseline = BaselineData::from_tables(
            vec![AreaRecord {
                id: "a1".to_string(),
                parent: "P1".to_string(),
                area: 2.5,
                signature_type: Some("Open sprawl".to_string()),
            }],
            &default_data,
            SignatureProfiles::default(),
            self_loops(&["a1"]),
            "population_estimate",
        )
        .expect("baseline");

        let area = &baseline.areas()[0];
        assert_eq!(area.signature_type, Some(SignatureType::OpenSprawl));
        assert_eq!(area.baseline.population(), 0.0);
        assert_eq!(area.baseline.get("lieWCe"), Some((FEATURE_COUNT - 1) as f64));
        assert_eq!(baseline.feature_columns()[0], "population_estimate");
    }

    #[test]
    fn repeated_default_rows_are_rejected() {
        let columns: Vec<&str> = feature_order().collect();
        let json = serde_json::json!({
            "columns": columns,
            "rows": {
                "a1": vec![0.0; FEATURE_COUNT],
                "a2": vec![1.0; FEATURE_COUNT],
            },
        })
        .to_string()
        .replace("\"a2\"", "\"a1\"");
        let default_data: LabelledTable = serde_json::from_str(&json).expect("table parses");
        assert_eq!(default_data.rows.len(), 2);

        let result = BaselineData::from_tables(
            vec![AreaRecord {
                id: "a1".to_string(),
                parent: "P1".to_string(),
                area: 1.0,
                signature_type: None,
            }],
            &default_data,
            SignatureProfiles::default(),
            self_loops(&["a1"]),
            POPULATION,
        );
        assert!(matches!(
            result,
            Err(BaselineError::DuplicateRow { ref table, ref row })
                if table == "default_data" && row == "a1"
        ));
    }

    #[test]
    fn unmapped_areas_are_rejected() {
        let columns: Vec<&str> = feature_order().collect();
        let default_data = table(&columns, &[("a1", vec![0.0; FEATURE_COUNT])]);
        let result = BaselineData::from_tables(
            Vec::new(),
            &default_data,
            SignatureProfiles::default(),
            self_loops(&["a1"]),
            POPULATION,
        );
        assert!(matches!(result, Err(BaselineError::MissingParent { .. })));
    }

    #[test]
    fn profiles_require_all_four_tables() {
        let form = table(&FORM_FEATURES, &[("Urban buffer", vec![1.0; 43])]);
        let function = table(&FUNCTION_FEATURES, &[("Urban buffer", vec![2.0; 16])]);
        let profiles = SignatureProfiles::from_tables(&SignatureTables {
            median_form: form.clone(),
            iqr_form: form.clone(),
            median_function: function.clone(),
            iqr_function: function.clone(),
        })
        .expect("profiles");
        let profile = profiles.get(SignatureType::UrbanBuffer).expect("profile");
        assert_eq!(profile.median.population(), 2.0);
        assert_eq!(profile.iqr.get("sdbAre"), Some(1.0));

        let incomplete = SignatureProfiles::from_tables(&SignatureTables {
            median_form: form.clone(),
            iqr_form: table(&FORM_FEATURES, &[]),
            median_function: function.clone(),
            iqr_function: function,
        });
        assert!(matches!(
            incomplete,
            Err(BaselineError::MissingProfile { .. })
        ));
    }

    #[test]
    fn negative_iqr_is_rejected() {
        let form = table(&FORM_FEATURES, &[("Urban buffer", vec![1.0; 43])]);
        let function = table(&FUNCTION_FEATURES, &[("Urban buffer", vec![2.0; 16])]);
        let negative = table(&FUNCTION_FEATURES, &[("Urban buffer", vec![-2.0; 16])]);
        let result = SignatureProfiles::from_tables(&SignatureTables {
            median_form: form.clone(),
            iqr_form: form,
            median_function: function,
            iqr_function: negative,
        });
        assert!(matches!(
            result,
            Err(BaselineError::InvalidStatistic { .. })
        ));
    }
}
