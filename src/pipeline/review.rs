//! Review stage: hard pre-filter bypassing the LLM entirely, then the
//! LatteReview two-round workflow over survivors.

use crate::models::{CriteriaDocument, DiscardReason, Paper, ReviewResult, Verdict};
use crate::pipeline::latte_review::{review_one, Reviewer};
use crate::registry::canonical_key;
use crate::services::Services;
use crate::shared::errors::AppResult;
use crate::shared::utils::write_json_atomic;
use crate::workspace::WorkspaceLayout;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Hard-discard rules, bypassing the LLM entirely. Pure and
/// independently testable per the "pre-filter is a pure function"
/// property.
pub fn hard_discard(paper: &Paper, criteria: &CriteriaDocument) -> Option<DiscardReason> {
    if !paper.has_title_and_abstract() {
        return Some(DiscardReason::MissingMetadata);
    }
    if let Some(exclude_title) = &criteria.exclude_title {
        if paper.normalized_title() == crate::shared::utils::normalize_title(exclude_title) {
            return Some(DiscardReason::ExcludeTitle);
        }
    }
    if let (Some(cutoff), Some(published)) = (criteria.cutoff_before_date, paper.published_date) {
        if published >= cutoff {
            return Some(DiscardReason::CutoffBeforeDate);
        }
    }
    if let Some(token) = &criteria.skip_titles_containing {
        if paper.title.to_lowercase().contains(&token.to_lowercase()) {
            return Some(DiscardReason::SurveyFilter);
        }
    }
    if !looks_english(paper.abstract_text.as_deref().unwrap_or_default()) {
        return Some(DiscardReason::NonEnglish);
    }
    None
}

/// A cheap heuristic: the ASCII-letter fraction of non-whitespace
/// characters must dominate. Not a language detector — good enough to
/// catch abstracts harvested in another script entirely.
pub(crate) fn looks_english(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let ascii_letters = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    letters == 0 || ascii_letters as f64 / letters as f64 > 0.6
}

/// Run the full Review pipeline (hard pre-filter + LatteReview) over
/// `papers`, preserving input order.
pub async fn review_papers(
    services: &Services,
    criteria: &CriteriaDocument,
    papers: Vec<Paper>,
) -> AppResult<Vec<ReviewResult>> {
    let junior_a = Reviewer::new("junior_nano", services.chat.clone(), format!("{}-nano", services.chat.default_model()));
    let junior_b = Reviewer::new("junior_mini", services.chat.clone(), format!("{}-mini", services.chat.default_model()));
    let senior = Reviewer::new("senior_lead", services.chat.clone(), services.chat.default_model().to_string());

    // `slots[i]` is `Some(discarded result)` for hard-discarded papers and
    // `None` for papers routed to the LLM, which `review_indices` tracks
    // by original position so the merge below preserves input order.
    let mut slots: Vec<Option<ReviewResult>> = Vec::with_capacity(papers.len());
    let mut to_review = Vec::new();
    let mut review_indices = Vec::new();

    for (i, paper) in papers.into_iter().enumerate() {
        match hard_discard(&paper, criteria) {
            Some(reason) => slots.push(Some(ReviewResult {
                identifier: paper.arxiv_id.clone().unwrap_or_else(|| paper.normalized_title()),
                metadata: paper,
                junior_evaluations: Vec::new(),
                senior_evaluation: None,
                final_verdict: Verdict::Discard(reason),
                derivation: "hard_prefilter".to_string(),
            })),
            None => {
                slots.push(None);
                review_indices.push(i);
                to_review.push(paper);
            }
        }
    }

    let concurrency = services.concurrency;
    let junior_a_ref = &junior_a;
    let junior_b_ref = &junior_b;
    let senior_ref = &senior;
    let reviewed = crate::services::concurrency::map_bounded(to_review, concurrency, move |paper: Paper| async move {
        review_one(junior_a_ref, junior_b_ref, senior_ref, criteria, &paper).await
    })
    .await;

    for (idx, result) in review_indices.into_iter().zip(reviewed.into_iter()) {
        slots[idx] = Some(result?);
    }

    Ok(slots.into_iter().map(|s| s.expect("every slot filled")).collect())
}

pub async fn run(services: &Services, layout: &WorkspaceLayout, force: bool) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("review", &layout.review_latte_results_json(), force, || async {
        execute(services, layout).await
    })
    .await
}

async fn execute(services: &Services, layout: &WorkspaceLayout) -> AppResult<(Vec<PathBuf>, BTreeMap<String, String>)> {
    let criteria: CriteriaDocument = {
        let bytes = std::fs::read(layout.criteria_json())
            .map_err(|e| crate::shared::errors::AppError::UpstreamMissing(format!("criteria.json: {e}")))?;
        serde_json::from_slice(&bytes)?
    };

    let mut papers = Vec::new();
    if let Ok(bytes) = std::fs::read(layout.harvest_arxiv_metadata_json()) {
        let records: Vec<crate::pipeline::harvest::HarvestRecord> = serde_json::from_slice(&bytes)?;
        papers.extend(records.into_iter().map(|r| r.metadata));
    }
    for source in ["semantic_scholar", "dblp", "openalex"] {
        if let Ok(bytes) = std::fs::read(layout.harvest_other_source_json(source)) {
            let source_papers: Vec<Paper> = serde_json::from_slice(&bytes)?;
            papers.extend(source_papers);
        }
    }

    let mut seen = HashSet::new();
    papers.retain(|p| seen.insert(canonical_key(p)));

    let results = review_papers(services, &criteria, papers).await?;
    write_json_atomic(&layout.review_latte_results_json(), &results)?;

    let mut metrics = BTreeMap::new();
    metrics.insert("reviewed_count".to_string(), results.len().to_string());
    metrics.insert(
        "included_count".to_string(),
        results.iter().filter(|r| r.final_verdict == Verdict::Include).count().to_string(),
    );

    Ok((vec![layout.review_latte_results_json()], metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CriteriaGroup, PaperSource};
    use chrono::NaiveDate;

    fn base_criteria() -> CriteriaDocument {
        CriteriaDocument {
            topic_definition: "topic".to_string(),
            summary: String::new(),
            summary_topics: Vec::new(),
            inclusion_criteria: CriteriaGroup::default(),
            exclusion_criteria: CriteriaGroup::default(),
            exclude_title: None,
            cutoff_before_date: None,
            skip_titles_containing: Some("survey".to_string()),
            criteria_hash: "hash".to_string(),
        }
    }

    fn base_paper() -> Paper {
        let mut p = Paper::new("A Paper About Things", PaperSource::Arxiv, "2401.00001");
        p.abstract_text = Some("This paper studies things in English.".to_string());
        p.published_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        p
    }

    #[test]
    fn test_hard_discard_missing_abstract() {
        let mut p = base_paper();
        p.abstract_text = None;
        assert_eq!(hard_discard(&p, &base_criteria()), Some(DiscardReason::MissingMetadata));
    }

    #[test]
    fn test_hard_discard_survey_filter() {
        let mut p = base_paper();
        p.title = "A Survey of Things".to_string();
        assert_eq!(hard_discard(&p, &base_criteria()), Some(DiscardReason::SurveyFilter));
    }

    #[test]
    fn test_hard_discard_cutoff_before_date() {
        let mut criteria = base_criteria();
        criteria.cutoff_before_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let p = base_paper();
        assert_eq!(hard_discard(&p, &criteria), Some(DiscardReason::CutoffBeforeDate));
    }

    #[test]
    fn test_hard_discard_passes_clean_paper() {
        assert_eq!(hard_discard(&base_paper(), &base_criteria()), None);
    }

    #[test]
    fn test_hard_discard_exclude_title_matches_normalized() {
        let mut criteria = base_criteria();
        criteria.exclude_title = Some("A Paper About Things!".to_string());
        assert_eq!(hard_discard(&base_paper(), &criteria), Some(DiscardReason::ExcludeTitle));
    }
}
