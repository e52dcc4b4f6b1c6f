//! Work items and contact candidates.
//!
//! A [`WorkItem`] is one unit of the fixed population the engine processes
//! end-to-end (here, one school district). Candidates flow through the
//! acquire → enrich → verify stages and the surviving set is persisted as a
//! [`ContactResult`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque work item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new item identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for ItemId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Resource key used for per-resource rate limiting (e.g. a hostname).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Create a new resource key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for ResourceKey {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// Processing status of a work item.
///
/// Transitions are forward-only: `Pending → Processing → {Completed, Failed}`.
/// An item found in `Processing` on startup belongs to a run that died
/// mid-item and is eligible for reprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of the fixed population the engine processes.
///
/// Identity (`id`, `resource_key`, `name`) is immutable; `status`, `error`,
/// and `processed_at` are owned by the progress store and mutated only
/// through its operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    /// Hostname (or other key) this item's outbound traffic is throttled by.
    pub resource_key: ResourceKey,
    /// Human-readable label (e.g. the district name).
    pub name: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO-8601 UTC timestamp of the last terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
}

impl WorkItem {
    /// Create a fresh pending item.
    #[must_use]
    pub fn new(
        id: impl Into<ItemId>,
        resource_key: impl Into<ResourceKey>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_key: resource_key.into(),
            name: name.into(),
            status: ItemStatus::Pending,
            error: None,
            processed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Verification outcome for a single candidate address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    /// Accepted by the downstream handshake.
    Verified,
    /// Permanently rejected.
    Invalid,
    /// Temporary "try again later" signal (greylist).
    TransientReject,
    /// Not verified (verification unavailable or skipped).
    Unverified,
}

impl VerifyStatus {
    /// Wire-format string for storage and export.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Invalid => "invalid",
            Self::TransientReject => "transient_reject",
            Self::Unverified => "unverified",
        }
    }
}

impl std::fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence attached to a candidate by its producing stage.
///
/// Ordered so that `High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Wire-format string for storage and export.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Which stage produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Extracted by the primary acquisition stage.
    Scraped,
    /// Pattern-based guess from the fallback stage.
    Pattern,
}

impl CandidateSource {
    /// Wire-format string for storage and export.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scraped => "scraped",
            Self::Pattern => "pattern",
        }
    }
}

/// A contact address candidate flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub address: String,
    pub confidence: Confidence,
    pub source: CandidateSource,
    pub verify_status: VerifyStatus,
}

impl Candidate {
    /// Create an unverified candidate.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        confidence: Confidence,
        source: CandidateSource,
    ) -> Self {
        Self {
            address: address.into(),
            confidence,
            source,
            verify_status: VerifyStatus::Unverified,
        }
    }
}

/// Persisted result of one item's pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactResult {
    pub item_id: ItemId,
    pub candidates: Vec<Candidate>,
    /// Highest-ranked usable candidate, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<Candidate>,
    /// True when the acquisition stage was blocked and pattern guesses
    /// were substituted.
    #[serde(default)]
    pub fallback_used: bool,
}
