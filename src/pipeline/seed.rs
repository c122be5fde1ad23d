//! Seed stage: query arXiv for surveys matching the topic, apply the
//! same-name cutoff rule, optionally engage `SeedRewriteLoop`, download
//! PDFs for the top-K survivors.

use crate::models::{CutoffCandidate, Paper, SeedRow, SeedSelection};
use crate::prompts::{PromptTemplates, TemplateRenderer};
use crate::services::metadata::arxiv::ArxivGateway;
use crate::services::Services;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{normalize_title, write_json_atomic};
use crate::workspace::WorkspaceLayout;
use chrono::Days;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    TokenAnd,
    CoreTokenOr,
    ExactPhrase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Ti,
    All,
}

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub anchor_mode: AnchorMode,
    pub scope: Scope,
    pub max_results: usize,
    pub download_top_k: usize,
    pub seed_rewrite_enabled: bool,
    pub seed_rewrite_max_attempts: u32,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            anchor_mode: AnchorMode::TokenAnd,
            scope: Scope::Ti,
            max_results: 200,
            download_top_k: 10,
            seed_rewrite_enabled: true,
            seed_rewrite_max_attempts: 3,
        }
    }
}

const DOCTYPE_TERMS: &[&str] = &[
    "survey",
    "review",
    "overview",
    "systematic review",
    "tutorial",
    "mapping study",
    "scoping review",
];

/// Derive the base anchor variants for a topic: the topic itself plus
/// a speech/spoken swap when applicable. Singular/plural and acronym
/// derivation are intentionally conservative (no external dictionary
/// dependency) — only the speech<->spoken swap named by the spec is
/// implemented generically; richer morphology is left to the
/// seed-rewrite loop, which can supply arbitrary LLM-proposed phrases.
pub fn anchor_variants(topic: &str) -> Vec<String> {
    let mut variants = vec![topic.to_string()];
    if topic.to_lowercase().contains("speech") {
        variants.push(topic.to_lowercase().replace("speech", "spoken"));
    } else if topic.to_lowercase().contains("spoken") {
        variants.push(topic.to_lowercase().replace("spoken", "speech"));
    }
    variants
}

/// Build the initial arXiv boolean query:
/// `(anchor OR ...) AND (doctype OR ...)`.
pub fn build_seed_query(topic: &str) -> arxiv_tools::QueryParams {
    ArxivGateway::build_and_query(
        anchor_variants(topic),
        DOCTYPE_TERMS.iter().map(|s| s.to_string()).collect(),
    )
}

/// Apply the same-name cutoff rule: any paper whose normalized title
/// exactly matches the normalized topic is pulled out as the
/// `cutoff_candidate`; its `published_date - 1 day` becomes the cutoff
/// date, and all remaining records published on/after that date are
/// removed.
pub fn apply_cutoff(records: Vec<Paper>, topic: &str) -> (Vec<Paper>, Option<CutoffCandidate>) {
    let normalized_topic = normalize_title(topic);
    let mut cutoff_candidate = None;
    let mut remaining = Vec::new();

    for paper in records {
        if paper.normalized_title() == normalized_topic && cutoff_candidate.is_none() {
            if let Some(published) = paper.published_date {
                let cutoff_date = published - Days::new(1);
                cutoff_candidate = Some(CutoffCandidate {
                    arxiv_id: paper.arxiv_id.clone().unwrap_or_default(),
                    title: paper.title.clone(),
                    published_date: published,
                    cutoff_date,
                });
            }
            continue;
        }
        remaining.push(paper);
    }

    let filtered = match &cutoff_candidate {
        Some(candidate) => remaining
            .into_iter()
            .filter(|p| p.published_date.is_none_or(|d| d < candidate.cutoff_date))
            .collect(),
        None => remaining,
    };

    (filtered, cutoff_candidate)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteAttempt {
    pub attempt: u32,
    pub phrases: Vec<String>,
    pub result_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedRewriteState {
    Prompting,
    Querying,
    Filtering,
    Success,
    Retry,
    Exhausted,
}

/// `prompting -> querying -> filtering -> {success | retry | exhausted}`.
/// The prompt-building function below takes `history` as a required
/// parameter, so omitting it (and risking the LLM repeating a prior
/// empty-result phrase) is a compile error, not a runtime discipline.
pub struct SeedRewriteLoop {
    pub topic: String,
    pub max_attempts: u32,
    pub history: Vec<RewriteAttempt>,
    pub state: SeedRewriteState,
}

impl SeedRewriteLoop {
    pub fn new(topic: impl Into<String>, max_attempts: u32) -> Self {
        Self { topic: topic.into(), max_attempts, history: Vec::new(), state: SeedRewriteState::Prompting }
    }

    pub fn build_prompt(&self) -> AppResult<String> {
        let mut values = BTreeMap::new();
        values.insert("topic".to_string(), self.topic.clone());
        values.insert("history".to_string(), render_history(&self.history));
        TemplateRenderer::render(PromptTemplates::seed_rewrite(), &values)
    }

    /// Record one attempt's outcome and advance the state machine.
    pub fn record_attempt(&mut self, phrases: Vec<String>, remaining_after_cutoff: usize) {
        let attempt_no = self.history.len() as u32 + 1;
        self.history.push(RewriteAttempt { attempt: attempt_no, phrases, result_count: remaining_after_cutoff });

        if remaining_after_cutoff >= 1 {
            self.state = SeedRewriteState::Success;
        } else if attempt_no >= self.max_attempts {
            self.state = SeedRewriteState::Exhausted;
        } else {
            self.state = SeedRewriteState::Retry;
        }
    }
}

fn render_history(history: &[RewriteAttempt]) -> String {
    if history.is_empty() {
        return "(no prior attempts)".to_string();
    }
    history
        .iter()
        .map(|a| format!("attempt {}: {:?} -> {} results", a.attempt, a.phrases, a.result_count))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Execute the Seed stage end to end against live services.
pub async fn run(services: &Services, layout: &WorkspaceLayout, topic: &str, options: &SeedOptions, force: bool) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("seed", &layout.seed_selection_json(), force, || async {
        execute(services, layout, topic, options).await
    })
    .await
}

async fn execute(
    services: &Services,
    layout: &WorkspaceLayout,
    topic: &str,
    options: &SeedOptions,
) -> AppResult<(Vec<std::path::PathBuf>, BTreeMap<String, String>)> {
    services.arxiv_limiter.acquire().await;
    let query = build_seed_query(topic);
    let records = services.arxiv.query(query, options.max_results).await?;
    let records_total = records.len();
    write_json_atomic(&layout.seed_arxiv_json(), &records)?;

    let (mut candidates, cutoff_candidate) = apply_cutoff(records, topic);

    if candidates.is_empty() && options.seed_rewrite_enabled {
        let mut loop_state = SeedRewriteLoop::new(topic, options.seed_rewrite_max_attempts);
        loop {
            let prompt = loop_state.build_prompt()?;
            let messages = vec![crate::services::chat::Message::user(prompt)];
            let config = crate::services::chat::ChatConfig::default();
            let raw = services.chat.complete(&messages, &config, &[]).await?;
            let phrases: Vec<String> = raw.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).take(3).collect();

            services.arxiv_limiter.acquire().await;
            let rewritten_query = ArxivGateway::build_and_query(phrases.clone(), DOCTYPE_TERMS.iter().map(|s| s.to_string()).collect());
            let rewritten_records = services.arxiv.query(rewritten_query, options.max_results).await?;
            let (rewritten_candidates, _) = apply_cutoff(rewritten_records, topic);

            loop_state.record_attempt(phrases, rewritten_candidates.len());
            match loop_state.state {
                SeedRewriteState::Success => {
                    candidates = rewritten_candidates;
                    break;
                }
                SeedRewriteState::Exhausted => {
                    write_json_atomic(&layout.seed_rewrite_json(), &loop_state.history)?;
                    return Err(AppError::SeedRewriteExhausted { attempts: loop_state.history.len() as u32 });
                }
                SeedRewriteState::Retry => continue,
                _ => unreachable!(),
            }
        }
        write_json_atomic(&layout.seed_rewrite_json(), &loop_state.history)?;
    }

    if candidates.is_empty() {
        return Err(AppError::CutoffRemovedAll);
    }

    candidates.sort_by(|a, b| b.published_date.cmp(&a.published_date));
    let selected: Vec<Paper> = candidates.into_iter().take(options.download_top_k).collect();

    let rows: Vec<SeedRow> = selected
        .iter()
        .map(|p| SeedRow {
            arxiv_id: p.arxiv_id.clone().unwrap_or_default(),
            title: p.title.clone(),
            published_date: p.published_date,
            filtered: false,
            selected: true,
        })
        .collect();

    let selection = SeedSelection {
        records_total,
        records_after_filter: rows.len(),
        cutoff_reason: cutoff_candidate.as_ref().map(|_| "same_name_topic_match".to_string()),
        cutoff_candidate,
        selected_queries: vec![topic.to_string()],
        rows,
    };

    write_json_atomic(&layout.seed_selection_json(), &selection)?;

    let download_results = download_pdfs(&selected, &layout.seed_arxiv_raw_dir()).await;
    write_json_atomic(&layout.seed_download_results_json(), &download_results)?;

    let mut metrics = BTreeMap::new();
    metrics.insert("records_total".to_string(), records_total.to_string());
    metrics.insert("records_after_filter".to_string(), selection.records_after_filter.to_string());
    metrics.insert(
        "downloads_ok".to_string(),
        download_results.iter().filter(|d| d.status == "ok").count().to_string(),
    );

    Ok(
        (
            vec![layout.seed_selection_json(), layout.seed_download_results_json()],
            metrics,
        ),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    pub arxiv_id: String,
    pub pdf_url: Option<String>,
    pub local_path: Option<std::path::PathBuf>,
    pub status: String,
    pub error: Option<String>,
}

/// Download each paper's PDF into `dest_dir`, one file per paper. A
/// single paper's download failure is recorded, not propagated — the
/// Seed stage's primary output is the selection, not a complete PDF set.
async fn download_pdfs(papers: &[Paper], dest_dir: &std::path::Path) -> Vec<DownloadResult> {
    if let Err(e) = std::fs::create_dir_all(dest_dir) {
        return papers
            .iter()
            .map(|p| DownloadResult {
                arxiv_id: p.arxiv_id.clone().unwrap_or_default(),
                pdf_url: p.pdf_url.clone(),
                local_path: None,
                status: "error".to_string(),
                error: Some(e.to_string()),
            })
            .collect();
    }

    let client = reqwest::Client::new();
    let mut results = Vec::with_capacity(papers.len());
    for paper in papers {
        let arxiv_id = paper.arxiv_id.clone().unwrap_or_default();
        let Some(pdf_url) = &paper.pdf_url else {
            results.push(DownloadResult {
                arxiv_id,
                pdf_url: None,
                local_path: None,
                status: "error".to_string(),
                error: Some("no pdf_url on record".to_string()),
            });
            continue;
        };

        let dest = dest_dir.join(format!("{}.pdf", arxiv_id.replace('/', "_")));
        match client.get(pdf_url).send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.bytes().await {
                Ok(bytes) => match std::fs::write(&dest, &bytes) {
                    Ok(()) => results.push(DownloadResult {
                        arxiv_id,
                        pdf_url: Some(pdf_url.clone()),
                        local_path: Some(dest),
                        status: "ok".to_string(),
                        error: None,
                    }),
                    Err(e) => results.push(DownloadResult {
                        arxiv_id,
                        pdf_url: Some(pdf_url.clone()),
                        local_path: None,
                        status: "error".to_string(),
                        error: Some(e.to_string()),
                    }),
                },
                Err(e) => results.push(DownloadResult {
                    arxiv_id,
                    pdf_url: Some(pdf_url.clone()),
                    local_path: None,
                    status: "error".to_string(),
                    error: Some(e.to_string()),
                }),
            },
            Err(e) => results.push(DownloadResult {
                arxiv_id,
                pdf_url: Some(pdf_url.clone()),
                local_path: None,
                status: "error".to_string(),
                error: Some(e.to_string()),
            }),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSource;
    use chrono::NaiveDate;

    fn paper(title: &str, date: Option<NaiveDate>) -> Paper {
        let mut p = Paper::new(title, PaperSource::Arxiv, title);
        p.published_date = date;
        p
    }

    #[test]
    fn test_apply_cutoff_same_name_excluded_and_dated() {
        let topic = "Discrete Audio Tokens: More Than a Survey!";
        let same_name = paper(topic, NaiveDate::from_ymd_opt(2024, 9, 1));
        let records = vec![same_name];
        let (remaining, cutoff) = apply_cutoff(records, topic);
        assert!(remaining.is_empty());
        let cutoff = cutoff.unwrap();
        assert_eq!(cutoff.published_date, NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        assert_eq!(cutoff.cutoff_date, NaiveDate::from_ymd_opt(2024, 8, 31).unwrap());
    }

    #[test]
    fn test_apply_cutoff_removes_papers_on_or_after_cutoff() {
        let topic = "X: A Survey";
        let same_name = paper(topic, NaiveDate::from_ymd_opt(2024, 9, 1));
        let before = paper("Other Paper", NaiveDate::from_ymd_opt(2024, 8, 1));
        let on_cutoff = paper("Another Paper", NaiveDate::from_ymd_opt(2024, 8, 31));
        let (remaining, _) = apply_cutoff(vec![same_name, before, on_cutoff], topic);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "Other Paper");
    }

    #[test]
    fn test_no_cutoff_candidate_keeps_all() {
        let topic = "Some Topic";
        let a = paper("Unrelated Paper A", NaiveDate::from_ymd_opt(2024, 1, 1));
        let b = paper("Unrelated Paper B", NaiveDate::from_ymd_opt(2023, 1, 1));
        let (remaining, cutoff) = apply_cutoff(vec![a, b], topic);
        assert_eq!(remaining.len(), 2);
        assert!(cutoff.is_none());
    }

    #[test]
    fn test_seed_rewrite_loop_success_transition() {
        let mut loop_state = SeedRewriteLoop::new("topic", 3);
        assert!(loop_state.build_prompt().unwrap().contains("no prior attempts"));
        loop_state.record_attempt(vec!["a phrase".to_string()], 2);
        assert_eq!(loop_state.state, SeedRewriteState::Success);
    }

    #[test]
    fn test_seed_rewrite_loop_exhausted_after_max_attempts() {
        let mut loop_state = SeedRewriteLoop::new("topic", 1);
        loop_state.record_attempt(vec!["a phrase".to_string()], 0);
        assert_eq!(loop_state.state, SeedRewriteState::Exhausted);
        assert_eq!(loop_state.history.len(), 1);
    }

    #[test]
    fn test_seed_rewrite_loop_retries_before_exhaustion() {
        let mut loop_state = SeedRewriteLoop::new("topic", 3);
        loop_state.record_attempt(vec!["a phrase".to_string()], 0);
        assert_eq!(loop_state.state, SeedRewriteState::Retry);
        let prompt = loop_state.build_prompt().unwrap();
        assert!(prompt.contains("attempt 1"));
    }

    #[tokio::test]
    async fn test_download_pdfs_records_error_when_pdf_url_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = paper("No PDF Paper", NaiveDate::from_ymd_opt(2024, 1, 1));
        p.arxiv_id = Some("2401.00001".to_string());
        let results = download_pdfs(&[p], dir.path()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, "error");
        assert!(results[0].local_path.is_none());
    }
}
