use std::{collections::HashSet, fmt, str::FromStr};

use indexmap::IndexSet;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the weights of a [`SpatialWeightsGraph`] were derived. The tag is
/// recorded only; weights are never re-derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transformation {
    Original,
    Binary,
    /// Row sums equal one, so the lag is a weighted mean.
    RowStandardized,
    /// Global sum equals one.
    DoublyStandardized,
    VarianceStabilizing,
    Custom,
}

impl Transformation {
    pub fn tag(self) -> char {
        match self {
            Transformation::Original => 'O',
            Transformation::Binary => 'B',
            Transformation::RowStandardized => 'R',
            Transformation::DoublyStandardized => 'D',
            Transformation::VarianceStabilizing => 'V',
            Transformation::Custom => 'C',
        }
    }
}

impl FromStr for Transformation {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "O" => Ok(Transformation::Original),
            "B" => Ok(Transformation::Binary),
            "R" => Ok(Transformation::RowStandardized),
            "D" => Ok(Transformation::DoublyStandardized),
            "V" => Ok(Transformation::VarianceStabilizing),
            "C" => Ok(Transformation::Custom),
            _ => Err(GraphError::UnsupportedTransformation(s.to_string())),
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("the adjacency table cannot be empty")]
    Empty,
    #[error("the adjacency table cannot contain missing values ('{focal}' -> '{neighbor}')")]
    MissingWeight { focal: String, neighbor: String },
    #[error(
        "neighbor '{neighbor}' of '{focal}' is not a focal id; isolates must be encoded as a self-loop with weight 0"
    )]
    UnknownNeighbor { focal: String, neighbor: String },
    #[error("duplicate adjacency entry '{focal}' -> '{neighbor}'")]
    DuplicateEntry { focal: String, neighbor: String },
    #[error("'transformation' needs to be one of O, B, R, D, V, C. '{0}' was given instead")]
    UnsupportedTransformation(String),
    #[error("weight {weight} of '{focal}' -> '{neighbor}' is not finite")]
    NonFiniteWeight {
        focal: String,
        neighbor: String,
        weight: f64,
    },
    #[error("lag input has {actual} values but the graph has {expected} observations")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("failed to parse adjacency table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One `(focal, neighbor, weight)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjacencyEntry {
    pub focal: String,
    pub neighbor: String,
    pub weight: f64,
}

impl AdjacencyEntry {
    pub fn new(focal: impl Into<String>, neighbor: impl Into<String>, weight: f64) -> Self {
        Self {
            focal: focal.into(),
            neighbor: neighbor.into(),
            weight,
        }
    }
}

/// Persisted adjacency layout. `weight: null` is a missing value and is
/// rejected; an absent transformation means row-standardized, which is how
/// the study-area graphs are published.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjacencyTable {
    #[serde(default)]
    pub transformation: Option<String>,
    pub entries: Vec<PersistedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistedEntry {
    pub focal: String,
    pub neighbor: String,
    pub weight: Option<f64>,
}

/// Compressed sparse row matrix over the canonical id order.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    fn build(n: usize, entries: &[(usize, usize, f64)]) -> Self {
        let mut row_ptr = vec![0usize; n + 1];
        for &(row, _, _) in entries {
            row_ptr[row + 1] += 1;
        }
        for idx in 0..n {
            row_ptr[idx + 1] += row_ptr[idx];
        }
        // counting sort keeps the within-row order of the adjacency
        let mut cursor = row_ptr.clone();
        let mut col_idx = vec![0usize; entries.len()];
        let mut values = vec![0.0f64; entries.len()];
        for &(row, col, weight) in entries {
            let slot = cursor[row];
            col_idx[slot] = col;
            values[slot] = weight;
            cursor[row] += 1;
        }
        Self {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = match (self.row_ptr.get(row), self.row_ptr.get(row + 1)) {
            (Some(&start), Some(&end)) => (start, end),
            _ => (0, 0),
        };
        self.col_idx[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Sparse product `W x`; `x` must have one value per column.
    pub fn matvec(&self, x: &[f64]) -> Result<Vec<f64>, GraphError> {
        if x.len() != self.n {
            return Err(GraphError::LengthMismatch {
                expected: self.n,
                actual: x.len(),
            });
        }
        Ok((0..self.n)
            .map(|row| self.row(row).map(|(col, weight)| weight * x[col]).sum())
            .collect())
    }
}

/// Sparse, directed, possibly asymmetric spatial weights between areas.
///
/// Entries are held in canonical order: focal ids in first-seen order, and
/// within each focal group neighbors ordered by that same focal order (not
/// sorted independently). The CSR form is built lazily once and cached.
#[derive(Debug, Clone)]
pub struct SpatialWeightsGraph {
    ids: IndexSet<String>,
    entries: Vec<(usize, usize, f64)>,
    transformation: Transformation,
    sparse: OnceCell<CsrMatrix>,
}

impl SpatialWeightsGraph {
    /// Build from triples. When `is_sorted` is true the caller asserts the
    /// entries are already canonical and reordering is skipped.
    pub fn new(
        adjacency: Vec<AdjacencyEntry>,
        transformation: Transformation,
        is_sorted: bool,
    ) -> Result<Self, GraphError> {
        if adjacency.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut ids: IndexSet<String> = IndexSet::new();
        for entry in &adjacency {
            if entry.weight.is_nan() {
                return Err(GraphError::MissingWeight {
                    focal: entry.focal.clone(),
                    neighbor: entry.neighbor.clone(),
                });
            }
            if !ids.contains(&entry.focal) {
                ids.insert(entry.focal.clone());
            }
        }

        let mut seen = HashSet::with_capacity(adjacency.len());
        let mut entries = Vec::with_capacity(adjacency.len());
        for entry in adjacency {
            let focal = ids.get_index_of(&entry.focal).unwrap_or_default();
            let Some(neighbor) = ids.get_index_of(&entry.neighbor) else {
                return Err(GraphError::UnknownNeighbor {
                    focal: entry.focal,
                    neighbor: entry.neighbor,
                });
            };
            if !seen.insert((focal, neighbor)) {
                return Err(GraphError::DuplicateEntry {
                    focal: entry.focal,
                    neighbor: entry.neighbor,
                });
            }
            entries.push((focal, neighbor, entry.weight));
        }

        if !is_sorted {
            entries.sort_by_key(|&(focal, neighbor, _)| (focal, neighbor));
        }

        Ok(Self {
            ids,
            entries,
            transformation,
            sparse: OnceCell::new(),
        })
    }

    pub fn from_table(table: AdjacencyTable) -> Result<Self, GraphError> {
        let transformation = match table.transformation.as_deref() {
            Some(tag) => tag.parse()?,
            None => Transformation::RowStandardized,
        };
        let mut adjacency = Vec::with_capacity(table.entries.len());
        for entry in table.entries {
            let Some(weight) = entry.weight else {
                return Err(GraphError::MissingWeight {
                    focal: entry.focal,
                    neighbor: entry.neighbor,
                });
            };
            adjacency.push(AdjacencyEntry {
                focal: entry.focal,
                neighbor: entry.neighbor,
                weight,
            });
        }
        Self::new(adjacency, transformation, false)
    }

    pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
        let table: AdjacencyTable = serde_json::from_str(json)?;
        Self::from_table(table)
    }

    pub fn transformation(&self) -> Transformation {
        self.transformation
    }

    /// Observation ids in canonical order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.ids.iter().map(String::as_str)
    }

    pub fn n(&self) -> usize {
        self.ids.len()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.get_index_of(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Canonically ordered triples.
    pub fn adjacency(&self) -> impl Iterator<Item = AdjacencyEntry> + '_ {
        self.entries.iter().map(|&(focal, neighbor, weight)| {
            AdjacencyEntry::new(
                self.ids[focal].clone(),
                self.ids[neighbor].clone(),
                weight,
            )
        })
    }

    pub fn neighbors(&self, id: &str) -> Vec<(&str, f64)> {
        let Some(focal) = self.position(id) else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|(row, _, _)| *row == focal)
            .map(|&(_, neighbor, weight)| (self.ids[neighbor].as_str(), weight))
            .collect()
    }

    /// Cached sparse form; fails if any weight is infinite.
    pub fn sparse(&self) -> Result<&CsrMatrix, GraphError> {
        self.sparse.get_or_try_init(|| {
            if let Some(&(focal, neighbor, weight)) = self
                .entries
                .iter()
                .find(|(_, _, weight)| !weight.is_finite())
            {
                return Err(GraphError::NonFiniteWeight {
                    focal: self.ids[focal].clone(),
                    neighbor: self.ids[neighbor].clone(),
                    weight,
                });
            }
            Ok(CsrMatrix::build(self.ids.len(), &self.entries))
        })
    }

    /// Spatial lag: weighted sum of each observation's neighbors (a weighted
    /// mean under row-standardized weights). `values` follows [`Self::ids`].
    pub fn lag(&self, values: &[f64]) -> Result<Vec<f64>, GraphError> {
        self.sparse()?.matvec(values)
    }
}
