//! Filter-Seed stage: binary LLM screening of each seed paper's
//! title+abstract, with a lenient fallback pass and PDF directory
//! curation.

use crate::models::Paper;
use crate::prompts::{PromptTemplates, TemplateRenderer};
use crate::services::chat::{ChatConfig, Message};
use crate::services::concurrency::map_bounded;
use crate::services::Services;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::write_json_atomic;
use crate::workspace::WorkspaceLayout;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FilterSeedOptions {
    pub k_min: usize,
    pub keywords_hint: Option<String>,
}

impl Default for FilterSeedOptions {
    fn default() -> Self {
        Self { k_min: 5, keywords_hint: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningDecision {
    pub decision: String,
    pub reason: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningRecord {
    pub arxiv_id: String,
    pub title: String,
    pub decision: ScreeningDecision,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedIds {
    pub selected: Vec<String>,
    pub rejected: Vec<String>,
}

/// Render the strict (or lenient) filter-seed prompt and parse the
/// LLM's binary decision. Parse failure is fatal for that paper — no
/// silent fallback at the per-unit level.
async fn screen_one(
    services: &Services,
    topic: &str,
    paper: &Paper,
    keywords_hint: &str,
    lenient: bool,
) -> AppResult<ScreeningDecision> {
    let template = if lenient { PromptTemplates::filter_seed_lenient() } else { PromptTemplates::filter_seed_strict() };
    let mut values = BTreeMap::new();
    values.insert("topic".to_string(), topic.to_string());
    values.insert("title".to_string(), paper.title.clone());
    values.insert("abstract".to_string(), paper.abstract_text.clone().unwrap_or_default());
    values.insert("keywords_hint".to_string(), keywords_hint.to_string());
    let prompt = TemplateRenderer::render(template, &values)?;

    let messages = vec![Message::user(prompt)];
    let config = ChatConfig::default();
    let value = services.chat.complete_json(&messages, &config, &[]).await?;

    let decision = value
        .get("decision")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::ParseError("filter-seed response missing decision".to_string()))?
        .to_string();
    let reason = value.get("reason").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let confidence = value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0);

    if decision != "yes" && decision != "no" {
        return Err(AppError::ParseError(format!("filter-seed decision not yes/no: {decision}")));
    }

    Ok(ScreeningDecision { decision, reason, confidence })
}

pub async fn run(
    services: &Services,
    layout: &WorkspaceLayout,
    topic: &str,
    options: &FilterSeedOptions,
    force: bool,
) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("filter-seed", &layout.seed_llm_screening_json(), force, || async {
        execute(services, layout, topic, options).await
    })
    .await
}

async fn execute(
    services: &Services,
    layout: &WorkspaceLayout,
    topic: &str,
    options: &FilterSeedOptions,
) -> AppResult<(Vec<std::path::PathBuf>, BTreeMap<String, String>)> {
    let selection: crate::models::SeedSelection = {
        let bytes = std::fs::read(layout.seed_selection_json())
            .map_err(|e| AppError::UpstreamMissing(format!("seed_selection.json: {e}")))?;
        serde_json::from_slice(&bytes)?
    };
    let raw_papers: Vec<Paper> = {
        let bytes = std::fs::read(layout.seed_arxiv_json())
            .map_err(|e| AppError::UpstreamMissing(format!("arxiv.json: {e}")))?;
        serde_json::from_slice(&bytes)?
    };

    let selected_ids: HashSet<String> =
        selection.rows.iter().filter(|r| r.selected).map(|r| r.arxiv_id.clone()).collect();
    let papers: Vec<Paper> = raw_papers
        .into_iter()
        .filter(|p| p.arxiv_id.as_deref().is_some_and(|id| selected_ids.contains(id)))
        .collect();

    let keywords_hint = options.keywords_hint.clone().unwrap_or_default();
    let concurrency = services.concurrency;

    let strict_results: Vec<AppResult<ScreeningDecision>> = map_bounded(papers.clone(), concurrency, {
        let topic = topic.to_string();
        let keywords_hint = keywords_hint.clone();
        move |paper: Paper| {
            let topic = topic.clone();
            let keywords_hint = keywords_hint.clone();
            async move { screen_one(services, &topic, &paper, &keywords_hint, false).await }
        }
    })
    .await;

    let mut records = Vec::with_capacity(papers.len());
    for (paper, result) in papers.iter().zip(strict_results.into_iter()) {
        let decision = result?;
        records.push(ScreeningRecord {
            arxiv_id: paper.arxiv_id.clone().unwrap_or_default(),
            title: paper.title.clone(),
            decision,
            fallback_used: false,
        });
    }

    let selected_count = records.iter().filter(|r| r.decision.decision == "yes").count();

    if selected_count < options.k_min {
        let rejected_indices: Vec<usize> =
            records.iter().enumerate().filter(|(_, r)| r.decision.decision == "no").map(|(i, _)| i).collect();
        let rejected_papers: Vec<Paper> = rejected_indices.iter().map(|&i| papers[i].clone()).collect();

        let lenient_results: Vec<AppResult<ScreeningDecision>> = map_bounded(rejected_papers, concurrency, {
            let topic = topic.to_string();
            let keywords_hint = keywords_hint.clone();
            move |paper: Paper| {
                let topic = topic.clone();
                let keywords_hint = keywords_hint.clone();
                async move { screen_one(services, &topic, &paper, &keywords_hint, true).await }
            }
        })
        .await;

        for (idx, result) in rejected_indices.into_iter().zip(lenient_results.into_iter()) {
            let decision = result?;
            records[idx].decision = decision;
            records[idx].fallback_used = true;
        }
    }

    let selected: Vec<String> =
        records.iter().filter(|r| r.decision.decision == "yes").map(|r| r.arxiv_id.clone()).collect();
    let rejected: Vec<String> =
        records.iter().filter(|r| r.decision.decision == "no").map(|r| r.arxiv_id.clone()).collect();

    write_json_atomic(&layout.seed_llm_screening_json(), &records)?;
    let selected_ids_out = SelectedIds { selected: selected.clone(), rejected };
    write_json_atomic(&layout.seed_selected_ids_json(), &selected_ids_out)?;

    curate_ta_filtered(&layout.seed_arxiv_raw_dir(), &layout.seed_ta_filtered_dir(), &selected)?;

    let mut metrics = BTreeMap::new();
    metrics.insert("selected_count".to_string(), selected.len().to_string());
    metrics.insert("fallback_triggered".to_string(), (selected_count < options.k_min).to_string());

    Ok((vec![layout.seed_llm_screening_json(), layout.seed_selected_ids_json()], metrics))
}

/// Copy selected PDFs into `ta_filtered/`, and remove any PDF already
/// there whose arXiv id is no longer in `selected` (a prior run's
/// survivor that this run's screening rejected).
fn curate_ta_filtered(raw_dir: &Path, filtered_dir: &Path, selected: &[String]) -> AppResult<()> {
    std::fs::create_dir_all(filtered_dir)?;
    let selected_set: HashSet<&str> = selected.iter().map(|s| s.as_str()).collect();

    for id in selected {
        let filename = format!("{}.pdf", id.replace('/', "_"));
        let src = raw_dir.join(&filename);
        if src.exists() {
            std::fs::copy(&src, filtered_dir.join(&filename))?;
        }
    }

    if filtered_dir.exists() {
        for entry in std::fs::read_dir(filtered_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let id = stem.replace('_', "/");
            if !selected_set.contains(id.as_str()) && !selected_set.contains(stem) {
                std::fs::remove_file(&path)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curate_ta_filtered_copies_selected_and_removes_stale() {
        let raw = tempfile::tempdir().unwrap();
        let filtered = tempfile::tempdir().unwrap();

        std::fs::write(raw.path().join("2401.00001.pdf"), b"a").unwrap();
        std::fs::write(raw.path().join("2401.00002.pdf"), b"b").unwrap();
        std::fs::write(filtered.path().join("2401.00099.pdf"), b"stale").unwrap();

        curate_ta_filtered(raw.path(), filtered.path(), &["2401.00001".to_string()]).unwrap();

        assert!(filtered.path().join("2401.00001.pdf").exists());
        assert!(!filtered.path().join("2401.00002.pdf").exists());
        assert!(!filtered.path().join("2401.00099.pdf").exists());
    }

    #[test]
    fn test_selected_ids_serde_roundtrip() {
        let ids = SelectedIds { selected: vec!["a".to_string()], rejected: vec!["b".to_string()] };
        let json = serde_json::to_string(&ids).unwrap();
        let back: SelectedIds = serde_json::from_str(&json).unwrap();
        assert_eq!(back.selected, vec!["a".to_string()]);
    }
}
