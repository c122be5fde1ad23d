//! The cross-round deduplication registry: a persistent map from
//! canonical key to screening status enforcing "review each paper at
//! most once per criteria version."

use crate::models::{Paper, PaperKey, RegistryEntry, RegistryStatus};
use crate::shared::errors::AppResult;
use crate::shared::utils::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Compute the canonical key for a paper: the highest-priority
/// identifier present, in the order `openalex_id > doi > arxiv_id >
/// normalized_title`. Used identically by in-harvest dedup and by the
/// registry, so the ordering invariant can't drift between call sites.
pub fn canonical_key(paper: &Paper) -> PaperKey {
    if let Some(id) = &paper.openalex_id {
        return PaperKey::OpenAlexId(id.clone());
    }
    if let Some(doi) = &paper.doi {
        return PaperKey::Doi(doi.clone());
    }
    if let Some(id) = &paper.arxiv_id {
        return PaperKey::ArxivId(id.clone());
    }
    PaperKey::NormalizedTitle(paper.normalized_title())
}

/// All alias keys a paper presents, in priority order. Used to populate
/// `RegistryEntry::paper_identifiers` so future lookups can match on any
/// of them, not only the primary key.
pub fn alias_keys(paper: &Paper) -> Vec<PaperKey> {
    let mut keys = Vec::new();
    if let Some(id) = &paper.openalex_id {
        keys.push(PaperKey::OpenAlexId(id.clone()));
    }
    if let Some(doi) = &paper.doi {
        keys.push(PaperKey::Doi(doi.clone()));
    }
    if let Some(id) = &paper.arxiv_id {
        keys.push(PaperKey::ArxivId(id.clone()));
    }
    keys.push(PaperKey::NormalizedTitle(paper.normalized_title()));
    keys
}

/// Result of a registry lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub status: RegistryStatus,
    pub matched_by: PaperKey,
}

/// The persisted registry, `review_registry.json`. Internally indexes
/// every alias key to its owning primary key so `lookup` is O(1) per
/// key tried rather than a linear scan over all entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewRegistry {
    entries: HashMap<PaperKey, RegistryEntry>,
    #[serde(default)]
    alias_index: HashMap<PaperKey, PaperKey>,
}

impl ReviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        write_json_atomic(path, self)
    }

    /// Walk a paper's keys in priority order; return the first matching
    /// entry, if any.
    pub fn lookup(&self, paper: &Paper) -> Option<Hit> {
        for key in alias_keys(paper) {
            if let Some(primary) = self.alias_index.get(&key) {
                if let Some(entry) = self.entries.get(primary) {
                    return Some(Hit { status: entry.status, matched_by: key });
                }
            }
        }
        None
    }

    /// Insert or replace the entry for `paper`'s canonical key.
    /// Idempotent: `upsert(p, s); upsert(p, s)` leaves the registry in
    /// the same state as a single call.
    pub fn upsert(&mut self, paper: &Paper, status: RegistryStatus, criteria_hash: &str, round: u32) {
        let primary = canonical_key(paper);
        let aliases = alias_keys(paper);
        for alias in &aliases {
            self.alias_index.insert(alias.clone(), primary.clone());
        }
        self.entries.insert(
            primary,
            RegistryEntry {
                status,
                criteria_hash: criteria_hash.to_string(),
                round,
                matched_by: None,
                paper_identifiers: aliases,
            },
        );
    }

    /// A paper is dedup-excludable only if a final-status entry exists
    /// under a *matching* criteria hash. When criteria change, prior
    /// `hard_exclude` entries become dedup-inert (the paper may
    /// re-enter review); `include`/`exclude` remain authoritative
    /// regardless of hash, since they represent human-equivalent
    /// decisions that should persist across criteria revisions.
    fn is_dedup_blocking(entry: &RegistryEntry, current_criteria_hash: &str) -> bool {
        match entry.status {
            RegistryStatus::Include | RegistryStatus::Exclude => true,
            RegistryStatus::HardExclude => entry.criteria_hash == current_criteria_hash,
            RegistryStatus::NeedsEnrichment | RegistryStatus::Error | RegistryStatus::TempDiscard => false,
        }
    }

    /// Partition `papers` into `(kept, removed)` against the registry
    /// under `current_criteria_hash`. `removed` entries also carry which
    /// key matched, for `dedup_report.json`.
    pub fn filter_candidates(
        &self,
        papers: Vec<Paper>,
        current_criteria_hash: &str,
    ) -> (Vec<Paper>, Vec<(Paper, PaperKey)>) {
        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for paper in papers {
            let blocking_hit = alias_keys(&paper).into_iter().find_map(|key| {
                self.alias_index
                    .get(&key)
                    .and_then(|primary| self.entries.get(primary))
                    .filter(|entry| Self::is_dedup_blocking(entry, current_criteria_hash))
                    .map(|_| key)
            });
            match blocking_hit {
                Some(key) => removed.push((paper, key)),
                None => kept.push(paper),
            }
        }
        (kept, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSource;

    fn paper_with_openalex(openalex_id: &str, title: &str) -> Paper {
        let mut p = Paper::new(title, PaperSource::OpenAlex, openalex_id);
        p.openalex_id = Some(openalex_id.to_string());
        p
    }

    #[test]
    fn test_canonical_key_priority() {
        let mut p = Paper::new("Some Title", PaperSource::Arxiv, "1706.03762");
        p.arxiv_id = Some("1706.03762".to_string());
        assert_eq!(canonical_key(&p), PaperKey::ArxivId("1706.03762".to_string()));

        p.doi = Some("10.1/xyz".to_string());
        assert_eq!(canonical_key(&p), PaperKey::Doi("10.1/xyz".to_string()));

        p.openalex_id = Some("W123".to_string());
        assert_eq!(canonical_key(&p), PaperKey::OpenAlexId("W123".to_string()));
    }

    #[test]
    fn test_upsert_idempotent() {
        let mut reg = ReviewRegistry::new();
        let p = paper_with_openalex("W123", "A Paper");
        reg.upsert(&p, RegistryStatus::Include, "hashA", 1);
        let after_one = reg.clone();
        reg.upsert(&p, RegistryStatus::Include, "hashA", 1);
        assert_eq!(
            serde_json::to_string(&after_one).unwrap(),
            serde_json::to_string(&reg).unwrap()
        );
    }

    #[test]
    fn test_registry_exclusion_respects_criteria_hash() {
        let mut reg = ReviewRegistry::new();
        let p = paper_with_openalex("W123", "A Paper");
        reg.upsert(&p, RegistryStatus::HardExclude, "hashA", 1);

        let (kept_a, removed_a) = reg.filter_candidates(vec![p.clone()], "hashA");
        assert!(kept_a.is_empty());
        assert_eq!(removed_a.len(), 1);

        let (kept_b, removed_b) = reg.filter_candidates(vec![p.clone()], "hashB");
        assert_eq!(kept_b.len(), 1);
        assert!(removed_b.is_empty());
    }

    #[test]
    fn test_include_entries_survive_criteria_change() {
        let mut reg = ReviewRegistry::new();
        let p = paper_with_openalex("W123", "A Paper");
        reg.upsert(&p, RegistryStatus::Include, "hashA", 1);

        let (kept, removed) = reg.filter_candidates(vec![p], "hashB");
        assert!(kept.is_empty());
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn test_lookup_matches_by_alias() {
        let mut reg = ReviewRegistry::new();
        let mut p = Paper::new("Some Paper", PaperSource::Arxiv, "1706.03762");
        p.arxiv_id = Some("1706.03762".to_string());
        p.openalex_id = Some("W999".to_string());
        reg.upsert(&p, RegistryStatus::Exclude, "hashA", 2);

        let mut lookup_by_doi_paper = Paper::new("Some Paper", PaperSource::SemanticScholar, "xyz");
        lookup_by_doi_paper.arxiv_id = Some("1706.03762".to_string());
        let hit = reg.lookup(&lookup_by_doi_paper).unwrap();
        assert_eq!(hit.status, RegistryStatus::Exclude);
    }
}
