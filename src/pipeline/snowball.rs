//! One round of citation snowballing: seed selection from the prior
//! round's inclusions, OpenAlex forward/backward citation expansion,
//! a hard date/language/metadata filter, registry dedup against every
//! prior round, LatteReview screening, and a registry update. Each
//! round's nine steps are sequential within this function; the outer
//! loop/while controller lives in `snowball_iterate`.

use crate::models::{CriteriaDocument, Paper, PaperKey, RegistryStatus, ReviewOutcome, RoundMeta, Verdict};
use crate::pipeline::review::{looks_english, review_papers};
use crate::registry::ReviewRegistry;
use crate::services::Services;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{normalize_title, write_csv_atomic, write_json_atomic};
use crate::workspace::WorkspaceLayout;
use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct SnowballOptions {
    /// Results per OpenAlex citation/reference query.
    pub per_page: usize,
    /// Lower bound on `published_date`, inclusive. `None` disables the
    /// lower bound.
    pub min_date: Option<NaiveDate>,
    /// Overrides `criteria.cutoff_before_date - 1 day` as the upper
    /// bound (exclusive) when set.
    pub max_date_override: Option<NaiveDate>,
}

impl Default for SnowballOptions {
    fn default() -> Self {
        Self { per_page: 50, min_date: None, max_date_override: None }
    }
}

/// A flattened, CSV-friendly projection of `Paper`. Column set and order
/// is the documented `snowball_for_review.csv` header: `id, title,
/// abstract, doi, url, pdf_url, year, openalex_id, arxiv_id`. `id` is the
/// same canonical-key priority chain as `registry::canonical_key`,
/// rendered as a bare string rather than the tagged `PaperKey` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnowballCsvRow {
    id: String,
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    doi: Option<String>,
    url: Option<String>,
    pdf_url: Option<String>,
    year: Option<i32>,
    openalex_id: Option<String>,
    arxiv_id: Option<String>,
}

impl From<&Paper> for SnowballCsvRow {
    fn from(p: &Paper) -> Self {
        Self {
            id: snowball_row_id(p),
            title: p.title.clone(),
            abstract_text: p.abstract_text.clone(),
            doi: p.doi.clone(),
            url: p.landing_url.clone(),
            pdf_url: p.pdf_url.clone(),
            year: p.published_date.map(|d| chrono::Datelike::year(&d)),
            openalex_id: p.openalex_id.clone(),
            arxiv_id: p.arxiv_id.clone(),
        }
    }
}

/// `openalex_id > doi > arxiv_id > normalized_title`, matching
/// `registry::canonical_key`'s priority order.
fn snowball_row_id(p: &Paper) -> String {
    p.openalex_id
        .clone()
        .or_else(|| p.doi.clone())
        .or_else(|| p.arxiv_id.clone())
        .unwrap_or_else(|| p.normalized_title())
}

/// The `candidates_for_review.json` schema: the subset of `Paper`
/// fields the Review stage actually needs, matching the documented
/// Snowball output shape rather than the full internal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CandidateForReview {
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    published_date: Option<NaiveDate>,
    doi: Option<String>,
    openalex_id: Option<String>,
    arxiv_id: Option<String>,
}

impl From<&Paper> for CandidateForReview {
    fn from(p: &Paper) -> Self {
        Self {
            title: p.title.clone(),
            abstract_text: p.abstract_text.clone(),
            published_date: p.published_date,
            doi: p.doi.clone(),
            openalex_id: p.openalex_id.clone(),
            arxiv_id: p.arxiv_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DedupReportEntry {
    title: String,
    matched_by: PaperKey,
}

/// Run round `round_index` in full: steps 1-8 of the Snowball
/// algorithm. Step 9 (stopping check) is the caller's responsibility —
/// it reads `round_index`, `raw_count`, and `review_outcome` off the
/// returned `RoundMeta`.
pub async fn run_round(
    services: &Services,
    layout: &WorkspaceLayout,
    criteria: &CriteriaDocument,
    options: &SnowballOptions,
    round_index: u32,
) -> AppResult<RoundMeta> {
    let started_at = Local::now();

    // Step 1: seed selection.
    let seeds = load_prior_inclusions(layout, round_index)?;
    write_csv_atomic(
        &layout.round_seeds_screening_included_csv(round_index),
        &seeds.iter().map(SnowballCsvRow::from).collect::<Vec<_>>(),
    )?;

    // Step 2: citation expansion.
    let mut raw_candidates = Vec::new();
    let mut seen = HashSet::new();
    for seed in &seeds {
        let Some(openalex_id) = resolve_openalex_id(services, seed).await? else {
            continue;
        };
        services.openalex_limiter.acquire().await;
        let citing = services.openalex.fetch_citing_works(&openalex_id, options.per_page).await.unwrap_or_default();
        services.openalex_limiter.acquire().await;
        let referenced = services.openalex.fetch_referenced_works(&openalex_id).await.unwrap_or_default();
        for paper in citing.into_iter().chain(referenced) {
            if seen.insert(crate::registry::canonical_key(&paper)) {
                raw_candidates.push(paper);
            }
        }
    }
    write_csv_atomic(
        &layout.round_snowball_results_raw_csv(round_index),
        &raw_candidates.iter().map(SnowballCsvRow::from).collect::<Vec<_>>(),
    )?;
    let raw_count = raw_candidates.len();

    // Step 3: hard filter.
    let max_date = options
        .max_date_override
        .or_else(|| criteria.cutoff_before_date.map(|d| d - Days::new(1)));
    let exclude_title = criteria.exclude_title.as_ref().map(|t| normalize_title(t));
    let filtered: Vec<Paper> = raw_candidates
        .into_iter()
        .filter(|p| p.has_title_and_abstract())
        .filter(|p| looks_english(p.abstract_text.as_deref().unwrap_or_default()))
        .filter(|p| exclude_title.as_deref() != Some(p.normalized_title().as_str()))
        .filter(|p| match (options.min_date, p.published_date) {
            (Some(min), Some(published)) => published >= min,
            (Some(_), None) => false,
            (None, _) => true,
        })
        .filter(|p| match (max_date, p.published_date) {
            (Some(max), Some(published)) => published < max,
            (Some(_), None) => false,
            (None, _) => true,
        })
        .collect();
    write_csv_atomic(
        &layout.round_snowball_results_csv(round_index),
        &filtered.iter().map(SnowballCsvRow::from).collect::<Vec<_>>(),
    )?;

    // Step 4: registry dedup.
    let mut registry = ReviewRegistry::load(&layout.review_registry_json())?;
    let filtered_count = filtered.len();
    let (kept, removed) = registry.filter_candidates(filtered, &criteria.criteria_hash);
    let dedup_report: Vec<DedupReportEntry> = removed
        .iter()
        .map(|(p, key)| DedupReportEntry { title: p.title.clone(), matched_by: key.clone() })
        .collect();
    write_json_atomic(&layout.round_dedup_report_json(round_index), &dedup_report)?;
    write_csv_atomic(
        &layout.round_snowball_for_review_csv(round_index),
        &kept.iter().map(SnowballCsvRow::from).collect::<Vec<_>>(),
    )?;

    // Step 5: candidates conversion.
    write_json_atomic(
        &layout.round_candidates_for_review_json(round_index),
        &kept.iter().map(CandidateForReview::from).collect::<Vec<_>>(),
    )?;
    let for_review_count = kept.len();

    // Step 6: review.
    let results = review_papers(services, criteria, kept).await?;
    write_json_atomic(&layout.round_latte_review_results_json(round_index), &results)?;

    // Step 7: registry update.
    let mut outcome = ReviewOutcome::default();
    for result in &results {
        let status = match &result.final_verdict {
            Verdict::Include => {
                outcome.include += 1;
                RegistryStatus::Include
            }
            Verdict::Exclude => {
                outcome.exclude += 1;
                RegistryStatus::Exclude
            }
            Verdict::NeedsReeval => {
                outcome.needs_eval += 1;
                RegistryStatus::NeedsEnrichment
            }
            Verdict::Discard(_) => {
                outcome.discard += 1;
                RegistryStatus::HardExclude
            }
        };
        registry.upsert(&result.metadata, status, &criteria.criteria_hash, round_index);
    }
    registry.save(&layout.review_registry_json())?;

    // Step 8: round meta.
    let meta = RoundMeta {
        round_index,
        seed_count: seeds.len(),
        raw_count,
        filtered_count,
        dedup_removed: removed.len(),
        for_review_count,
        review_outcome: outcome,
        started_at,
        finished_at: Local::now(),
        criteria_hash: criteria.criteria_hash.clone(),
    };
    write_json_atomic(&layout.round_meta_json(round_index), &meta)?;

    Ok(meta)
}

/// Resolve an `openalex_id` for `paper`: direct if present, else via
/// DOI lookup, else a last-resort title search.
async fn resolve_openalex_id(services: &Services, paper: &Paper) -> AppResult<Option<String>> {
    if let Some(id) = &paper.openalex_id {
        return Ok(Some(id.clone()));
    }
    if let Some(doi) = &paper.doi {
        if let Some(resolved) = services.openalex.resolve_by_doi(doi).await? {
            return Ok(resolved.openalex_id);
        }
    }
    let hits = services.openalex.search(&paper.title, 1).await.unwrap_or_default();
    Ok(hits.into_iter().next().and_then(|p| p.openalex_id))
}

/// Seeds for round N are the `include` verdicts of round N-1, or of
/// the base Review stage for round 1.
fn load_prior_inclusions(layout: &WorkspaceLayout, round_index: u32) -> AppResult<Vec<Paper>> {
    let path = if round_index <= 1 {
        layout.review_latte_results_json()
    } else {
        layout.round_latte_review_results_json(round_index - 1)
    };
    let bytes = std::fs::read(&path)
        .map_err(|e| AppError::UpstreamMissing(format!("{}: {e}", path.display())))?;
    let results: Vec<crate::models::ReviewResult> = serde_json::from_slice(&bytes)?;
    Ok(results
        .into_iter()
        .filter(|r| r.final_verdict == Verdict::Include)
        .map(|r| r.metadata)
        .collect())
}

pub async fn run(
    services: &Services,
    layout: &WorkspaceLayout,
    criteria: &CriteriaDocument,
    options: &SnowballOptions,
    round_index: u32,
    force: bool,
) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("snowball", &layout.round_meta_json(round_index), force, || async {
        let meta = run_round(services, layout, criteria, options, round_index).await?;
        let mut metrics = BTreeMap::new();
        metrics.insert("raw_count".to_string(), meta.raw_count.to_string());
        metrics.insert("for_review_count".to_string(), meta.for_review_count.to_string());
        metrics.insert("included".to_string(), meta.review_outcome.include.to_string());
        Ok((vec![layout.round_meta_json(round_index)], metrics))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSource;
    use chrono::NaiveDate;

    fn paper(title: &str, date: Option<NaiveDate>) -> Paper {
        let mut p = Paper::new(title, PaperSource::OpenAlex, "W1");
        p.abstract_text = Some("An abstract written in English.".to_string());
        p.published_date = date;
        p
    }

    #[test]
    fn test_csv_row_matches_documented_header_fields() {
        let mut p = paper("A Paper", NaiveDate::from_ymd_opt(2023, 1, 1));
        p.openalex_id = Some("W42".to_string());
        p.pdf_url = Some("https://example.org/a.pdf".to_string());
        let row = SnowballCsvRow::from(&p);
        assert_eq!(row.id, "W42");
        assert_eq!(row.year, Some(2023));
        assert_eq!(row.pdf_url.as_deref(), Some("https://example.org/a.pdf"));
    }

    #[test]
    fn test_csv_row_id_falls_back_to_normalized_title() {
        let p = paper("A Unique Title", None);
        let row = SnowballCsvRow::from(&p);
        assert_eq!(row.id, p.normalized_title());
    }

    #[test]
    fn test_candidate_for_review_keeps_only_documented_fields() {
        let p = paper("A Paper", NaiveDate::from_ymd_opt(2023, 1, 1));
        let candidate = CandidateForReview::from(&p);
        assert_eq!(candidate.title, "A Paper");
        assert_eq!(candidate.published_date, p.published_date);
    }

    #[tokio::test]
    async fn test_load_prior_inclusions_filters_to_include_verdict() {
        use crate::models::ReviewResult;

        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::for_topic(dir.path(), "topic");
        let results = vec![
            ReviewResult {
                identifier: "a".to_string(),
                metadata: paper("Included Paper", NaiveDate::from_ymd_opt(2023, 1, 1)),
                junior_evaluations: Vec::new(),
                senior_evaluation: None,
                final_verdict: Verdict::Include,
                derivation: "junior_mean".to_string(),
            },
            ReviewResult {
                identifier: "b".to_string(),
                metadata: paper("Excluded Paper", NaiveDate::from_ymd_opt(2023, 1, 1)),
                junior_evaluations: Vec::new(),
                senior_evaluation: None,
                final_verdict: Verdict::Exclude,
                derivation: "junior_mean".to_string(),
            },
        ];
        write_json_atomic(&layout.review_latte_results_json(), &results).unwrap();

        let seeds = load_prior_inclusions(&layout, 1).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].title, "Included Paper");
    }
}
