//! Core data model: the entities persisted to the workspace.
//!
//! Titles and abstracts recorded at ingestion are immutable: `Paper`
//! exposes no mutator for `title` or `abstract_text` once constructed,
//! so the byte-identity invariant can't be violated by downstream code.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a `Paper` record originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSource {
    Arxiv,
    SemanticScholar,
    Dblp,
    OpenAlex,
    Manual,
}

/// The central entity. Identity is resolved by canonical-key priority
/// (`openalex_id > doi > arxiv_id > normalized_title`, see `registry`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub arxiv_id: Option<String>,
    pub doi: Option<String>,
    pub openalex_id: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
    pub landing_url: Option<String>,
    pub source: PaperSource,
    pub source_id: String,
}

impl Paper {
    pub fn new(title: impl Into<String>, source: PaperSource, source_id: impl Into<String>) -> Self {
        Self {
            arxiv_id: None,
            doi: None,
            openalex_id: None,
            title: title.into(),
            abstract_text: None,
            published_date: None,
            authors: Vec::new(),
            pdf_url: None,
            landing_url: None,
            source,
            source_id: source_id.into(),
        }
    }

    pub fn normalized_title(&self) -> String {
        crate::shared::utils::normalize_title(&self.title)
    }

    /// Extract a bare arXiv identifier from a URL or versioned form,
    /// e.g. `"https://arxiv.org/abs/1706.03762v2"` -> `"1706.03762"`,
    /// or an old-style id `"cs.CL/0001001v1"` -> `"cs.CL/0001001"`.
    pub fn extract_arxiv_id(raw: &str) -> String {
        let stripped = raw
            .trim_start_matches("https://arxiv.org/abs/")
            .trim_start_matches("http://arxiv.org/abs/")
            .trim_start_matches("https://arxiv.org/pdf/")
            .trim_start_matches("http://arxiv.org/pdf/");
        let re = regex::Regex::new(r"^(.*?)(v\d+)?$").unwrap();
        re.captures(stripped)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| stripped.to_string())
    }

    pub fn has_title_and_abstract(&self) -> bool {
        !self.title.trim().is_empty()
            && self.abstract_text.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// One row of the seed-candidate pool produced by the Seed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRow {
    pub arxiv_id: String,
    pub title: String,
    pub published_date: Option<NaiveDate>,
    pub filtered: bool,
    pub selected: bool,
}

/// `seed_selection.json`: the Seed stage's primary output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSelection {
    pub records_total: usize,
    pub records_after_filter: usize,
    pub cutoff_reason: Option<String>,
    pub cutoff_candidate: Option<CutoffCandidate>,
    pub selected_queries: Vec<String>,
    pub rows: Vec<SeedRow>,
}

/// The topic-namesake paper excluded by the "same-name" cutoff rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutoffCandidate {
    pub arxiv_id: String,
    pub title: String,
    pub published_date: NaiveDate,
    /// `published_date - 1 day`.
    pub cutoff_date: NaiveDate,
}

/// One leaf clause inside an inclusion/exclusion criteria group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaClause {
    pub text: String,
    pub rationale: String,
    pub source_urls: Vec<String>,
}

/// An AND-group (`required`) plus OR-groups of alternatives (`any_of`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CriteriaGroup {
    pub required: Vec<CriteriaClause>,
    pub any_of: Vec<Vec<CriteriaClause>>,
}

/// `criteria.json`: the Criteria stage's output, consumed by Review and
/// Snowball. Invariant: criteria text carries no time-based or hard
/// literal-string-match clauses — those are expressed as the typed
/// `cutoff_before_date` / `exclude_title` fields instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaDocument {
    pub topic_definition: String,
    pub summary: String,
    pub summary_topics: Vec<String>,
    pub inclusion_criteria: CriteriaGroup,
    pub exclusion_criteria: CriteriaGroup,
    pub exclude_title: Option<String>,
    pub cutoff_before_date: Option<NaiveDate>,
    /// Title substring that hard-discards a paper at Review time; the
    /// design-notes Open Question resolves the default to `"survey"`,
    /// kept configurable.
    pub skip_titles_containing: Option<String>,
    /// Not part of the formatter LLM's output schema — always recomputed
    /// by the Criteria stage after parsing, so absent on deserialization
    /// of a fresh formatter response.
    #[serde(default)]
    pub criteria_hash: String,
}

/// One filtered seed paper's detected keyword evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperKeywords {
    pub arxiv_id: String,
    pub detected_keywords: Vec<String>,
    pub evidence: Vec<String>,
}

/// `keywords.json`: the Keywords stage's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsPayload {
    pub topic: String,
    pub anchor_terms: Vec<String>,
    pub search_terms: std::collections::BTreeMap<String, Vec<String>>,
    pub papers: Vec<PaperKeywords>,
}

impl KeywordsPayload {
    pub fn total_term_count(&self) -> usize {
        self.search_terms.values().map(|v| v.len()).sum()
    }
}

/// Why a paper was hard-discarded before any LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    MissingMetadata,
    ExcludeTitle,
    CutoffBeforeDate,
    SurveyFilter,
    NonEnglish,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiscardReason::MissingMetadata => "missing_metadata",
            DiscardReason::ExcludeTitle => "exclude_title",
            DiscardReason::CutoffBeforeDate => "cutoff_before_date",
            DiscardReason::SurveyFilter => "survey_filter",
            DiscardReason::NonEnglish => "non_english",
        };
        write!(f, "{s}")
    }
}

/// Per-paper terminal decision from the Review stage. Normalized to the
/// terse tagged form; the reasoning trail lives in `derivation`, a
/// separate field on `ReviewResult` rather than embedded in the verdict
/// string (resolves the spec's second Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum Verdict {
    Include,
    Exclude,
    NeedsReeval,
    Discard(DiscardReason),
}

/// A single junior or senior reviewer's evaluation of one paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerEvaluation {
    pub reviewer: String,
    pub evaluation: i32,
    pub reasoning: String,
}

/// One row of `latte_review_results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub identifier: String,
    pub metadata: Paper,
    pub junior_evaluations: Vec<ReviewerEvaluation>,
    pub senior_evaluation: Option<ReviewerEvaluation>,
    pub final_verdict: Verdict,
    /// How the verdict was derived, e.g. `"junior_mean"`,
    /// `"senior_override"`.
    pub derivation: String,
}

/// The four kinds of identifier the registry can key on, in priority
/// order: `openalex_id > doi > arxiv_id > normalized_title`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PaperKey {
    OpenAlexId(String),
    Doi(String),
    ArxivId(String),
    NormalizedTitle(String),
}

/// The screening status recorded against a canonical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    Include,
    Exclude,
    HardExclude,
    NeedsEnrichment,
    Error,
    TempDiscard,
}

/// One entry in the cross-round deduplication registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub status: RegistryStatus,
    pub criteria_hash: String,
    pub round: u32,
    pub matched_by: Option<String>,
    pub paper_identifiers: Vec<PaperKey>,
}

/// Per-round summary statistics, persisted as `round_meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundMeta {
    pub round_index: u32,
    pub seed_count: usize,
    pub raw_count: usize,
    pub filtered_count: usize,
    pub dedup_removed: usize,
    pub for_review_count: usize,
    pub review_outcome: ReviewOutcome,
    pub started_at: chrono::DateTime<chrono::Local>,
    pub finished_at: chrono::DateTime<chrono::Local>,
    pub criteria_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub include: usize,
    pub exclude: usize,
    pub discard: usize,
    pub needs_eval: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_arxiv_id_strips_url_prefix() {
        assert_eq!(
            Paper::extract_arxiv_id("https://arxiv.org/abs/1706.03762"),
            "1706.03762"
        );
    }

    #[test]
    fn test_extract_arxiv_id_strips_version_suffix() {
        assert_eq!(Paper::extract_arxiv_id("1706.03762v2"), "1706.03762");
    }

    #[test]
    fn test_extract_arxiv_id_old_style() {
        assert_eq!(Paper::extract_arxiv_id("cs.CL/0001001v1"), "cs.CL/0001001");
    }

    #[test]
    fn test_paper_has_title_and_abstract() {
        let mut p = Paper::new("Attention Is All You Need", PaperSource::Arxiv, "1706.03762");
        assert!(!p.has_title_and_abstract());
        p.abstract_text = Some("We propose the Transformer...".to_string());
        assert!(p.has_title_and_abstract());
    }

    #[test]
    fn test_keywords_payload_total_term_count() {
        let mut search_terms = std::collections::BTreeMap::new();
        search_terms.insert("architecture".to_string(), vec!["attention".to_string(), "encoder".to_string()]);
        search_terms.insert("training".to_string(), vec!["pretraining".to_string()]);
        let payload = KeywordsPayload {
            topic: "transformers".to_string(),
            anchor_terms: vec!["transformer".to_string()],
            search_terms,
            papers: Vec::new(),
        };
        assert_eq!(payload.total_term_count(), 3);
    }

    #[test]
    fn test_discard_reason_display() {
        assert_eq!(DiscardReason::CutoffBeforeDate.to_string(), "cutoff_before_date");
    }
}
