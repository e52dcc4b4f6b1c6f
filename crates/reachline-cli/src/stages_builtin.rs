//! Built-in stage set backed by a local seed file.
//!
//! The engine core treats acquisition and verification as external
//! collaborators; this module ships a self-contained set so the binary
//! works end-to-end without network scrapers: acquisition serves contacts
//! recorded in the seed file (and reports `blocked` for items marked so),
//! the fallback stage derives pattern guesses from the item's hostname, and
//! verification is syntax-only.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use reachline_engine::stages::{
    AcquireStage, EnrichStage, FallbackStage, ItemLoader, PipelineStages, VerifyStage,
};
use reachline_types::error::StageError;
use reachline_types::item::{
    Candidate, CandidateSource, Confidence, VerifyStatus, WorkItem,
};

/// One entry in the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedItem {
    pub id: String,
    pub host: String,
    pub name: String,
    /// Known contact addresses served by the acquisition stage.
    #[serde(default)]
    pub contacts: Vec<String>,
    /// Simulate an anti-automation barrier for this item.
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    items: Vec<SeedItem>,
}

/// Parsed seed data shared by the loader and the acquisition stage.
#[derive(Debug, Default)]
pub struct Seed {
    items: Vec<SeedItem>,
    by_id: HashMap<String, SeedItem>,
}

impl Seed {
    /// Load and parse a seed YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
        let parsed: SeedFile =
            serde_yaml::from_str(&content).context("Failed to parse seed YAML")?;
        Ok(Self::new(parsed.items))
    }

    fn new(items: Vec<SeedItem>) -> Self {
        let by_id = items
            .iter()
            .map(|item| (item.id.clone(), item.clone()))
            .collect();
        Self { items, by_id }
    }
}

/// Loader yielding the seed file's population.
pub struct SeedLoader {
    seed: Arc<Seed>,
}

#[async_trait]
impl ItemLoader for SeedLoader {
    async fn load(&self) -> Result<Vec<WorkItem>, StageError> {
        Ok(self
            .seed
            .items
            .iter()
            .map(|entry| WorkItem::new(entry.id.clone(), entry.host.clone(), entry.name.clone()))
            .collect())
    }
}

/// Acquisition backed by the seed file's recorded contacts.
pub struct SeedAcquire {
    seed: Arc<Seed>,
}

#[async_trait]
impl AcquireStage for SeedAcquire {
    async fn acquire(&self, item: &WorkItem) -> Result<Vec<Candidate>, StageError> {
        let Some(entry) = self.seed.by_id.get(item.id.as_str()) else {
            return Err(StageError::internal(
                "UNKNOWN_ITEM",
                format!("item '{}' missing from seed data", item.id),
            ));
        };
        if entry.blocked {
            return Err(StageError::blocked(
                "SEED_BLOCKED",
                format!("item '{}' is marked blocked", item.id),
            ));
        }
        Ok(entry
            .contacts
            .iter()
            .map(|addr| Candidate::new(addr.clone(), Confidence::High, CandidateSource::Scraped))
            .collect())
    }
}

/// Pattern guesses derived from the item's hostname.
pub struct PatternFallback;

impl FallbackStage for PatternFallback {
    fn guess(&self, item: &WorkItem) -> Vec<Candidate> {
        let host = item
            .resource_key
            .as_str()
            .trim_start_matches("www.")
            .to_string();
        ["info", "contact", "office"]
            .iter()
            .map(|local| {
                Candidate::new(
                    format!("{local}@{host}"),
                    Confidence::Low,
                    CandidateSource::Pattern,
                )
            })
            .collect()
    }
}

/// Deduplicate and normalize candidate addresses; keep the strongest
/// duplicate.
pub struct DedupEnrich;

impl EnrichStage for DedupEnrich {
    fn enrich(&self, candidates: Vec<Candidate>, _item: &WorkItem) -> Vec<Candidate> {
        let mut best: HashMap<String, Candidate> = HashMap::new();
        for mut candidate in candidates {
            candidate.address = candidate.address.trim().to_ascii_lowercase();
            match best.get(&candidate.address) {
                Some(existing) if existing.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(candidate.address.clone(), candidate);
                }
            }
        }
        let mut result: Vec<Candidate> = best.into_values().collect();
        result.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| a.address.cmp(&b.address))
        });
        result
    }
}

/// Syntax-only verification: no handshake is bundled, so well-formed
/// addresses stay `unverified` and malformed ones are `invalid`.
pub struct SyntaxVerify;

#[async_trait]
impl VerifyStage for SyntaxVerify {
    async fn verify(&self, candidate: &Candidate) -> Result<VerifyStatus, StageError> {
        let addr = candidate.address.as_str();
        let well_formed = addr
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && domain.contains('.') && !domain.ends_with('.')
            });
        if well_formed {
            Ok(VerifyStatus::Unverified)
        } else {
            Ok(VerifyStatus::Invalid)
        }
    }
}

/// Wire the full built-in stage set from a seed file.
pub fn from_seed(seed: Seed) -> PipelineStages {
    let seed = Arc::new(seed);
    PipelineStages {
        loader: Arc::new(SeedLoader { seed: seed.clone() }),
        acquire: Arc::new(SeedAcquire { seed }),
        fallback: Arc::new(PatternFallback),
        enrich: Arc::new(DedupEnrich),
        verify: Arc::new(SyntaxVerify),
    }
}
