//! Data contracts shared by the scenario engine and its callers.
//!
//! Holds the fixed feature schema expected by the indicator models, the
//! signature-type vocabulary, scenario knob records and the published
//! scenario output records. Nothing in here depends on the engine itself.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const POPULATION: &str = "population";
pub const GREEN_URBAN_AREAS: &str = "Land cover [Green urban areas]";

pub const JOB_CATEGORIES: [&str; 8] = [
    "A, B, D, E. Agriculture, energy and water",
    "C. Manufacturing",
    "F. Construction",
    "G, I. Distribution, hotels and restaurants",
    "H, J. Transport and communication",
    "K, L, M, N. Financial, real estate, professional and administrative activities",
    "O,P,Q. Public administration, education and health",
    "R, S, T, U. Other",
];

/// Manual job categories rebalanced against [`WHITE_COLLAR`].
pub const BLUE_COLLAR: [&str; 4] = [
    "A, B, D, E. Agriculture, energy and water",
    "C. Manufacturing",
    "F. Construction",
    "H, J. Transport and communication",
];

pub const WHITE_COLLAR: [&str; 2] = [
    "K, L, M, N. Financial, real estate, professional and administrative activities",
    "O,P,Q. Public administration, education and health",
];

/// Job categories left untouched by job-type rebalancing.
pub const SERVICES: [&str; 2] = [
    "G, I. Distribution, hotels and restaurants",
    "R, S, T, U. Other",
];

pub const LAND_COVER: [&str; 7] = [
    "Land cover [Discontinuous urban fabric]",
    "Land cover [Continuous urban fabric]",
    "Land cover [Non-irrigated arable land]",
    "Land cover [Industrial or commercial units]",
    "Land cover [Green urban areas]",
    "Land cover [Pastures]",
    "Land cover [Sport and leisure facilities]",
];

/// Morphometric descriptors of the built form.
pub const FORM_FEATURES: [&str; 43] = [
    "sdbAre", "sdbCoA", "ssbCCo", "ssbCor", "ssbSqu", "ssbERI", "ssbCCM", "ssbCCD", "stbOri",
    "sdcAre", "sscCCo", "sscERI", "sicCAR", "stbCeA", "mtbAli", "mtbNDi", "mtcWNe", "ltbIBD",
    "sdsSPW", "sdsSWD", "sdsSPO", "sdsLen", "sssLin", "ldsMSL", "mtdDeg", "linP3W", "linP4W",
    "linPDE", "lcnClo", "ldsCDL", "xcnSCl", "linWID", "stbSAl", "sdsAre", "sisBpM", "misCel",
    "ltcRea", "ldeAre", "lseCCo", "lseERI", "lteOri", "lteWNB", "lieWCe",
];

pub const FUNCTION_FEATURE_COUNT: usize = 1 + JOB_CATEGORIES.len() + LAND_COVER.len();
pub const FORM_FEATURE_COUNT: usize = FORM_FEATURES.len();
pub const FEATURE_COUNT: usize = FUNCTION_FEATURE_COUNT + FORM_FEATURE_COUNT;

/// Land-use and population descriptors, in schema order.
pub const FUNCTION_FEATURES: [&str; FUNCTION_FEATURE_COUNT] = [
    POPULATION,
    JOB_CATEGORIES[0],
    JOB_CATEGORIES[1],
    JOB_CATEGORIES[2],
    JOB_CATEGORIES[3],
    JOB_CATEGORIES[4],
    JOB_CATEGORIES[5],
    JOB_CATEGORIES[6],
    JOB_CATEGORIES[7],
    LAND_COVER[0],
    LAND_COVER[1],
    LAND_COVER[2],
    LAND_COVER[3],
    LAND_COVER[4],
    LAND_COVER[5],
    LAND_COVER[6],
];

/// Features multiplied by the geometric size of an area when sampled from a
/// signature profile (profiles store densities, areas store counts).
pub const AREA_SCALED_FEATURES: [&str; 9] = [
    POPULATION,
    JOB_CATEGORIES[0],
    JOB_CATEGORIES[1],
    JOB_CATEGORIES[2],
    JOB_CATEGORIES[3],
    JOB_CATEGORIES[4],
    JOB_CATEGORIES[5],
    JOB_CATEGORIES[6],
    JOB_CATEGORIES[7],
];

/// The column order mandated by the indicator models. Never permute.
pub fn feature_order() -> impl Iterator<Item = &'static str> {
    FUNCTION_FEATURES
        .iter()
        .chain(FORM_FEATURES.iter())
        .copied()
}

pub fn feature_index(name: &str) -> Option<usize> {
    feature_order().position(|column| column == name)
}

/// Urban Grammar signature types, coded 0..=15 from least to most urban.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SignatureType {
    WildCountryside = 0,
    CountrysideAgriculture = 1,
    UrbanBuffer = 2,
    WarehousePark = 3,
    OpenSprawl = 4,
    DisconnectedSuburbia = 5,
    AccessibleSuburbia = 6,
    ConnectedResidential = 7,
    DenseResidential = 8,
    GriddedResidential = 9,
    DenseUrban = 10,
    LocalUrbanity = 11,
    RegionalUrbanity = 12,
    MetropolitanUrbanity = 13,
    ConcentratedUrbanity = 14,
    HyperConcentratedUrbanity = 15,
}

impl SignatureType {
    pub const ALL: [SignatureType; 16] = [
        SignatureType::WildCountryside,
        SignatureType::CountrysideAgriculture,
        SignatureType::UrbanBuffer,
        SignatureType::WarehousePark,
        SignatureType::OpenSprawl,
        SignatureType::DisconnectedSuburbia,
        SignatureType::AccessibleSuburbia,
        SignatureType::ConnectedResidential,
        SignatureType::DenseResidential,
        SignatureType::GriddedResidential,
        SignatureType::DenseUrban,
        SignatureType::LocalUrbanity,
        SignatureType::RegionalUrbanity,
        SignatureType::MetropolitanUrbanity,
        SignatureType::ConcentratedUrbanity,
        SignatureType::HyperConcentratedUrbanity,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Label used by the persisted signature tables.
    pub fn name(self) -> &'static str {
        match self {
            SignatureType::WildCountryside => "Wild countryside",
            SignatureType::CountrysideAgriculture => "Countryside agriculture",
            SignatureType::UrbanBuffer => "Urban buffer",
            SignatureType::WarehousePark => "Warehouse/Park land",
            SignatureType::OpenSprawl => "Open sprawl",
            SignatureType::DisconnectedSuburbia => "Disconnected suburbia",
            SignatureType::AccessibleSuburbia => "Accessible suburbia",
            SignatureType::ConnectedResidential => "Connected residential neighbourhoods",
            SignatureType::DenseResidential => "Dense residential neighbourhoods",
            SignatureType::GriddedResidential => "Gridded residential quarters",
            SignatureType::DenseUrban => "Dense urban neighbourhoods",
            SignatureType::LocalUrbanity => "Local urbanity",
            SignatureType::RegionalUrbanity => "Regional urbanity",
            SignatureType::MetropolitanUrbanity => "Metropolitan urbanity",
            SignatureType::ConcentratedUrbanity => "Concentrated urbanity",
            SignatureType::HyperConcentratedUrbanity => "Hyper concentrated urbanity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|sig| sig.name() == name)
    }
}

impl From<SignatureType> for u8 {
    fn from(value: SignatureType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for SignatureType {
    type Error = UnknownSignatureType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SignatureType::from_code(value).ok_or(UnknownSignatureType(value))
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("signature type code must be in a range 0...15. {0} given")]
pub struct UnknownSignatureType(pub u8);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KnobError {
    #[error("use index must be in a range -1...1. {0} given")]
    UseOutOfRange(f64),
    #[error("greenspace index must be in a range 0...1. {0} given")]
    GreenspaceOutOfRange(f64),
    #[error("job_types index must be in a range 0...1. {0} given")]
    JobTypesOutOfRange(f64),
    #[error("unknown scenario knob '{0}'")]
    UnknownKnob(String),
    #[error("invalid value '{value}' for knob '{knob}'")]
    InvalidValue { knob: String, value: String },
}

/// Scenario settings for one area. Every field is tri-state: `None` keeps the
/// baseline, `Some(0.0)` is an explicit value like any other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioKnobs {
    #[serde(default)]
    pub signature_type: Option<SignatureType>,
    #[serde(default, rename = "use")]
    pub use_balance: Option<f64>,
    #[serde(default)]
    pub greenspace: Option<f64>,
    #[serde(default)]
    pub job_types: Option<f64>,
}

impl ScenarioKnobs {
    pub fn new(
        signature_type: SignatureType,
        use_balance: f64,
        greenspace: f64,
        job_types: f64,
    ) -> Self {
        Self {
            signature_type: Some(signature_type),
            use_balance: Some(use_balance),
            greenspace: Some(greenspace),
            job_types: Some(job_types),
        }
    }

    /// All four knobs hold a value.
    pub fn is_complete(&self) -> bool {
        self.signature_type.is_some()
            && self.use_balance.is_some()
            && self.greenspace.is_some()
            && self.job_types.is_some()
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), KnobError> {
        if let Some(value) = self.use_balance {
            validate_use(value)?;
        }
        if let Some(value) = self.greenspace {
            validate_greenspace(value)?;
        }
        if let Some(value) = self.job_types {
            validate_job_types(value)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, edit: KnobEdit) {
        match edit {
            KnobEdit::SignatureType(value) => self.signature_type = value,
            KnobEdit::Use(value) => self.use_balance = value,
            KnobEdit::Greenspace(value) => self.greenspace = value,
            KnobEdit::JobTypes(value) => self.job_types = value,
        }
    }

    /// True when applying `edit` would leave the knobs unchanged.
    pub fn matches(&self, edit: &KnobEdit) -> bool {
        match *edit {
            KnobEdit::SignatureType(value) => self.signature_type == value,
            KnobEdit::Use(value) => same_knob(self.use_balance, value),
            KnobEdit::Greenspace(value) => same_knob(self.greenspace, value),
            KnobEdit::JobTypes(value) => same_knob(self.job_types, value),
        }
    }
}

fn same_knob(current: Option<f64>, next: Option<f64>) -> bool {
    match (current, next) {
        (Some(a), Some(b)) => a.to_bits() == b.to_bits(),
        (None, None) => true,
        _ => false,
    }
}

pub fn validate_use(value: f64) -> Result<(), KnobError> {
    if (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KnobError::UseOutOfRange(value))
    }
}

pub fn validate_greenspace(value: f64) -> Result<(), KnobError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KnobError::GreenspaceOutOfRange(value))
    }
}

pub fn validate_job_types(value: f64) -> Result<(), KnobError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KnobError::JobTypesOutOfRange(value))
    }
}

/// A single knob cell edit. `None` resets the knob to the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KnobEdit {
    SignatureType(Option<SignatureType>),
    Use(Option<f64>),
    Greenspace(Option<f64>),
    JobTypes(Option<f64>),
}

impl KnobEdit {
    pub fn knob_name(&self) -> &'static str {
        match self {
            KnobEdit::SignatureType(_) => "signature_type",
            KnobEdit::Use(_) => "use",
            KnobEdit::Greenspace(_) => "greenspace",
            KnobEdit::JobTypes(_) => "job_types",
        }
    }

    pub fn validate(&self) -> Result<(), KnobError> {
        match *self {
            KnobEdit::Use(Some(value)) => validate_use(value),
            KnobEdit::Greenspace(Some(value)) => validate_greenspace(value),
            KnobEdit::JobTypes(Some(value)) => validate_job_types(value),
            _ => Ok(()),
        }
    }
}

impl FromStr for KnobEdit {
    type Err = KnobError;

    /// Parses `knob=value`, where `value` may be `none` to reset the knob.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (knob, raw) = s
            .split_once('=')
            .ok_or_else(|| KnobError::UnknownKnob(s.to_string()))?;
        let knob = knob.trim();
        let raw = raw.trim();
        let invalid = || KnobError::InvalidValue {
            knob: knob.to_string(),
            value: raw.to_string(),
        };
        let unset = raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("null");

        let number = || -> Result<Option<f64>, KnobError> {
            if unset {
                Ok(None)
            } else {
                raw.parse::<f64>().map(Some).map_err(|_| invalid())
            }
        };

        let edit = match knob {
            "signature_type" => {
                if unset {
                    KnobEdit::SignatureType(None)
                } else {
                    let code = raw.parse::<u8>().map_err(|_| invalid())?;
                    let sig = SignatureType::from_code(code).ok_or_else(invalid)?;
                    KnobEdit::SignatureType(Some(sig))
                }
            }
            "use" => KnobEdit::Use(number()?),
            "greenspace" => KnobEdit::Greenspace(number()?),
            "job_types" => KnobEdit::JobTypes(number()?),
            other => return Err(KnobError::UnknownKnob(other.to_string())),
        };
        edit.validate()?;
        Ok(edit)
    }
}

/// Scenario knobs keyed by identifier. Whether a key names a parent unit or
/// a single area depends on the constructor that consumes the map:
/// `ScenarioEngine::new` and parent-keyed tables read parent ids, while
/// area-keyed tables and the one-shot evaluation read area ids.
pub type ScenarioInput = BTreeMap<String, ScenarioKnobs>;

/// Indicator means for one parent unit, as published to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub signature_type: SignatureType,
    pub air_quality: f64,
    pub house_price: f64,
    pub job_accessibility: f64,
    pub greenspace_accessibility: f64,
}

/// Scenario output keyed by parent-unit identifier.
pub type ScenarioOutput = BTreeMap<String, IndicatorRecord>;
