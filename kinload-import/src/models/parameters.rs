//! Import options
//!
//! Chosen by the caller at session start and carried unchanged through every
//! checkpoint of the session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How records relate to what the destination collection already holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Clear the collection first, then insert everything
    Replace,
    /// Insert everything next to what is already there
    #[default]
    Add,
    /// Update entities with a matching kind and cross-reference, insert the rest
    Merge,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(ConflictPolicy::Replace),
            "add" => Ok(ConflictPolicy::Add),
            "merge" => Ok(ConflictPolicy::Merge),
            other => Err(format!("unknown conflict policy '{}'", other)),
        }
    }
}

/// Caller overrides for the `private` flag on individuals
///
/// Precedence: explicit public, explicit private, a confidential or privacy
/// restriction in the record, then (when enabled) the presumed-living rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyOverrides {
    /// Cross-references always marked private
    #[serde(default)]
    pub private_xrefs: BTreeSet<String>,

    /// Cross-references never marked private
    #[serde(default)]
    pub public_xrefs: BTreeSet<String>,

    /// Mark individuals who may still be alive as private (default: false)
    #[serde(default)]
    pub presume_living_private: bool,

    /// Births within this many years of the import count as living (default: 100)
    #[serde(default = "default_living_threshold_years")]
    pub living_threshold_years: u32,
}

/// Import session options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Conflict policy (default: add)
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Import media-object records and pointers (default: true)
    #[serde(default = "default_include_media")]
    pub include_media: bool,

    #[serde(default)]
    pub privacy_overrides: PrivacyOverrides,
}

fn default_living_threshold_years() -> u32 {
    100
}

fn default_include_media() -> bool {
    true
}

impl Default for PrivacyOverrides {
    fn default() -> Self {
        Self {
            private_xrefs: BTreeSet::new(),
            public_xrefs: BTreeSet::new(),
            presume_living_private: false,
            living_threshold_years: default_living_threshold_years(),
        }
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            include_media: default_include_media(),
            privacy_overrides: PrivacyOverrides::default(),
        }
    }
}

impl ImportOptions {
    pub fn with_policy(conflict_policy: ConflictPolicy) -> Self {
        Self {
            conflict_policy,
            ..Self::default()
        }
    }
}
