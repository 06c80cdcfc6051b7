//! Clinical coding systems.
//!
//! Every codelist belongs to exactly one coding system. The system decides
//! which backend table the extraction engine searches, so it travels with the
//! codes all the way into the produced study definition.

use std::fmt;
use std::str::FromStr;

/// A clinical coding system.
///
/// # Examples
///
/// ```
/// use cohort_types::CodingSystem;
///
/// let system = CodingSystem::from_tag("ctv3");
/// assert_eq!(system, Some(CodingSystem::Ctv3));
/// assert_eq!(CodingSystem::Snomed.tag(), "snomed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CodingSystem {
    /// ICD-10 diagnosis codes (hospital episodes, death certificates).
    Icd10,
    /// Read v3 (CTV3) primary care codes.
    Ctv3,
    /// SNOMED CT primary care codes.
    Snomed,
    /// Dictionary of medicines and devices (dm+d).
    Dmd,
}

impl CodingSystem {
    /// Tag for ICD-10.
    pub const ICD10_TAG: &'static str = "icd10";
    /// Tag for CTV3.
    pub const CTV3_TAG: &'static str = "ctv3";
    /// Tag for SNOMED CT.
    pub const SNOMED_TAG: &'static str = "snomed";
    /// Tag for dm+d.
    pub const DMD_TAG: &'static str = "dmd";

    /// All supported systems, in a stable order.
    pub const ALL: [CodingSystem; 4] = [Self::Icd10, Self::Ctv3, Self::Snomed, Self::Dmd];

    /// Creates a CodingSystem from its tag.
    ///
    /// Matching is case-insensitive and accepts the common aliases
    /// `snomedct` and `dm+d`. Returns `None` for unknown tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            Self::ICD10_TAG => Some(Self::Icd10),
            Self::CTV3_TAG => Some(Self::Ctv3),
            Self::SNOMED_TAG | "snomedct" => Some(Self::Snomed),
            Self::DMD_TAG | "dm+d" => Some(Self::Dmd),
            _ => None,
        }
    }

    /// Returns the canonical tag for this system.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Icd10 => Self::ICD10_TAG,
            Self::Ctv3 => Self::CTV3_TAG,
            Self::Snomed => Self::SNOMED_TAG,
            Self::Dmd => Self::DMD_TAG,
        }
    }

    /// Returns true for systems used in primary care records.
    pub fn is_primary_care(self) -> bool {
        matches!(self, Self::Ctv3 | Self::Snomed | Self::Dmd)
    }
}

impl fmt::Display for CodingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Error returned when parsing an unknown coding system tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCodingSystem(pub String);

impl fmt::Display for UnknownCodingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown coding system: '{}' (expected icd10, ctv3, snomed or dmd)",
            self.0
        )
    }
}

impl std::error::Error for UnknownCodingSystem {}

impl FromStr for CodingSystem {
    type Err = UnknownCodingSystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| UnknownCodingSystem(s.to_string()))
    }
}
