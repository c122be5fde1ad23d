//! Integration tests for the named scenarios: one test per scenario,
//! built from the same building blocks the pipeline stages call
//! through (no live network or LLM calls).

use async_trait::async_trait;
use chrono::NaiveDate;
use slr_discovery::models::{
    CriteriaDocument, CriteriaGroup, DiscardReason, Paper, PaperSource, RegistryStatus, Verdict,
};
use slr_discovery::pipeline::latte_review::{derive_verdict, needs_escalation};
use slr_discovery::pipeline::review::{hard_discard, review_papers};
use slr_discovery::pipeline::seed::{apply_cutoff, SeedRewriteLoop, SeedRewriteState};
use slr_discovery::pipeline::snowball_iterate::{should_stop, SnowballIterateOptions, StoppingMode};
use slr_discovery::registry::{canonical_key, ReviewRegistry};
use slr_discovery::services::chat::{Attachment, ChatConfig, ChatService, Message};
use slr_discovery::services::metadata::{ArxivGateway, DblpSource, OpenAlexSource, SemanticScholarSource};
use slr_discovery::services::pdf::RsrppPdfReader;
use slr_discovery::services::rate_limit::RateLimiter;
use slr_discovery::services::Services;
use slr_discovery::shared::errors::AppResult;
use std::sync::Arc;

fn paper(title: &str, published: Option<NaiveDate>) -> Paper {
    let mut p = Paper::new(title, PaperSource::Arxiv, title);
    p.published_date = published;
    p
}

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

/// A `ChatService` that panics if ever called, for asserting "the LLM
/// is not invoked" in a hard-discard scenario.
struct PanicsIfCalled;

#[async_trait]
impl ChatService for PanicsIfCalled {
    fn default_model(&self) -> &str {
        "panics-if-called"
    }

    async fn complete(&self, _messages: &[Message], _config: &ChatConfig, _attachments: &[Attachment]) -> AppResult<String> {
        panic!("chat service must not be invoked for a hard-discarded paper");
    }
}

fn services_with_chat(chat: Arc<dyn ChatService>) -> Services {
    Services {
        chat,
        arxiv: ArxivGateway::new(),
        semantic_scholar: Arc::new(SemanticScholarSource::new()),
        dblp: Arc::new(DblpSource::new()),
        openalex: Arc::new(OpenAlexSource::new(None)),
        pdf: Arc::new(RsrppPdfReader::new()),
        arxiv_limiter: RateLimiter::arxiv(),
        semantic_scholar_limiter: RateLimiter::semantic_scholar(false),
        dblp_limiter: RateLimiter::dblp(),
        openalex_limiter: RateLimiter::openalex(),
        concurrency: 4,
    }
}

/// Scenario A (happy path seed): the initial query returns only the
/// same-name paper, so the cutoff rule strips the pool to empty and
/// records the `"2024-08-31"` cutoff date; the rewrite loop then
/// succeeds on its first attempt once it proposes a narrower phrase
/// that surfaces a non-same-name paper published before the cutoff.
#[test]
fn scenario_a_seed_rewrite_recovers_after_cutoff_empties_pool() {
    let topic = "Discrete Audio Tokens: More Than a Survey!";
    let initial = vec![paper(topic, NaiveDate::from_ymd_opt(2024, 9, 1))];

    let (candidates, cutoff) = apply_cutoff(initial, topic);
    assert!(candidates.is_empty());
    let cutoff = cutoff.expect("same-name paper becomes the cutoff candidate");
    assert_eq!(cutoff.cutoff_date, NaiveDate::from_ymd_opt(2024, 8, 31).unwrap());

    let mut loop_state = SeedRewriteLoop::new(topic, 3);
    let rewritten = vec![paper("Discrete Audio Tokens for Synthesis", NaiveDate::from_ymd_opt(2024, 6, 1))];
    let (rewritten_candidates, _) = apply_cutoff(rewritten, topic);
    loop_state.record_attempt(vec!["discrete audio tokens".to_string()], rewritten_candidates.len());

    assert_eq!(loop_state.state, SeedRewriteState::Success);
    assert_eq!(loop_state.history.len(), 1);
    assert_eq!(rewritten_candidates.len(), 1);
}

/// Scenario B (seed rewrite exhaustion): with `max_attempts = 1`, a
/// rewrite that again returns only the same-name paper exhausts
/// immediately, recording exactly one history entry.
#[test]
fn scenario_b_seed_rewrite_exhausts_at_max_attempts() {
    let topic = "Discrete Audio Tokens: More Than a Survey!";
    let mut loop_state = SeedRewriteLoop::new(topic, 1);

    let rewritten = vec![paper(topic, NaiveDate::from_ymd_opt(2024, 9, 1))];
    let (rewritten_candidates, _) = apply_cutoff(rewritten, topic);
    loop_state.record_attempt(vec!["discrete audio tokens".to_string()], rewritten_candidates.len());

    assert_eq!(loop_state.state, SeedRewriteState::Exhausted);
    assert_eq!(loop_state.history.len(), 1);
    assert_eq!(loop_state.history[0].attempt, 1);
}

/// Scenario C (review hard-discard): a paper published after the
/// criteria's `cutoff_before_date` is discarded before any LLM call —
/// `review_papers` is run against a `ChatService` that panics if
/// invoked, and the run still succeeds.
#[tokio::test]
async fn scenario_c_cutoff_discard_never_calls_the_llm() {
    let mut criteria = base_criteria();
    criteria.cutoff_before_date = NaiveDate::from_ymd_opt(2024, 8, 31);

    let mut p = paper("A Paper About Things", NaiveDate::from_ymd_opt(2025, 6, 1));
    p.abstract_text = Some("An abstract written entirely in English.".to_string());
    assert_eq!(hard_discard(&p, &criteria), Some(DiscardReason::CutoffBeforeDate));

    let services = services_with_chat(Arc::new(PanicsIfCalled));
    let results = review_papers(&services, &criteria, vec![p]).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].final_verdict, Verdict::Discard(DiscardReason::CutoffBeforeDate));
    assert_eq!(results[0].derivation, "hard_prefilter");
}

/// Scenario D (senior escalation): junior scores of 5 and 2 disagree
/// enough to trigger the senior; a senior score of 4 includes the
/// paper, a senior score of 3 leaves it needing re-evaluation.
#[test]
fn scenario_d_senior_escalation_outcomes() {
    assert!(needs_escalation(5, 2));

    let (verdict_include, derivation) = derive_verdict(5, 2, Some(4));
    assert_eq!(verdict_include, Verdict::Include);
    assert_eq!(derivation, "senior_override");

    let (verdict_needs_reeval, _) = derive_verdict(5, 2, Some(3));
    assert_eq!(verdict_needs_reeval, Verdict::NeedsReeval);
}

/// Scenario E (snowball registry dedup): round 1 includes paper X
/// under `openalex_id = W123`. A round-2 candidate whose DOI resolves
/// to the same `openalex_id` is recognized as the same paper and
/// dropped, with the dedup report naming `openalex_id` as the match.
#[test]
fn scenario_e_registry_dedups_round_two_candidate_by_resolved_openalex_id() {
    let mut registry = ReviewRegistry::new();

    let mut paper_x = Paper::new("Paper X", PaperSource::OpenAlex, "W123");
    paper_x.openalex_id = Some("W123".to_string());
    registry.upsert(&paper_x, RegistryStatus::Include, "criteria-hash", 1);

    let mut round_two_candidate = Paper::new("Paper X (via citation)", PaperSource::Arxiv, "2401.00099");
    round_two_candidate.doi = Some("10.1000/xyz".to_string());
    round_two_candidate.openalex_id = Some("W123".to_string());

    let (kept, removed) = registry.filter_candidates(vec![round_two_candidate], "criteria-hash");
    assert!(kept.is_empty(), "the resolved duplicate must not reach snowball_for_review.csv");
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].1, canonical_key(&paper_x));
}

/// Scenario F (while-mode termination): after round 3 the raw count
/// (220) crosses `stop_raw_threshold` (200), so the controller
/// terminates before a fourth round runs.
#[test]
fn scenario_f_while_mode_terminates_on_raw_threshold_crossing() {
    use slr_discovery::models::{ReviewOutcome, RoundMeta};

    let options = SnowballIterateOptions {
        mode: StoppingMode::While,
        max_rounds: 10,
        stop_raw_threshold: 200,
        stop_included_threshold: 999,
        ..Default::default()
    };

    let round_three = RoundMeta {
        round_index: 3,
        seed_count: 40,
        raw_count: 220,
        filtered_count: 180,
        dedup_removed: 30,
        for_review_count: 150,
        review_outcome: ReviewOutcome { include: 20, exclude: 100, discard: 10, needs_eval: 20 },
        started_at: chrono::Local::now(),
        finished_at: chrono::Local::now(),
        criteria_hash: "hash".to_string(),
    };

    assert!(should_stop(&options, &round_three, 45));
}
