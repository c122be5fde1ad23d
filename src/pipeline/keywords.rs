//! Keywords stage: extract anchor_terms and categorized search_terms
//! from the filtered seed PDFs.

use crate::models::{KeywordsPayload, PaperKeywords, SeedSelection};
use crate::prompts::{PromptTemplates, TemplateRenderer};
use crate::services::chat::{Attachment, ChatConfig, Message};
use crate::services::pdf::infer_arxiv_id_from_filename;
use crate::services::Services;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{normalize_title, write_json_atomic};
use crate::workspace::WorkspaceLayout;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct KeywordsOptions {
    pub max_pdfs: usize,
    pub max_queries: usize,
    pub category_list: Vec<String>,
}

impl Default for KeywordsOptions {
    fn default() -> Self {
        Self {
            max_pdfs: 10,
            max_queries: 60,
            category_list: vec!["architecture".to_string(), "training".to_string(), "evaluation".to_string(), "dataset".to_string()],
        }
    }
}

#[derive(serde::Deserialize)]
struct PartialExtraction {
    #[serde(default)]
    anchor_terms: Vec<String>,
    #[serde(default)]
    search_terms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    detected_keywords: Vec<String>,
    /// Quoted spans from the PDF supporting each `detected_keywords`
    /// entry, per §4.4's "detected_keywords + evidence" output shape.
    #[serde(default)]
    evidence: Vec<String>,
}

pub async fn run(
    services: &Services,
    layout: &WorkspaceLayout,
    topic: &str,
    options: &KeywordsOptions,
    force: bool,
) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("keywords", &layout.keywords_json(), force, || async {
        execute(services, layout, topic, options).await
    })
    .await
}

async fn execute(
    services: &Services,
    layout: &WorkspaceLayout,
    topic: &str,
    options: &KeywordsOptions,
) -> AppResult<(Vec<PathBuf>, BTreeMap<String, String>)> {
    let mut pdf_paths: Vec<PathBuf> = std::fs::read_dir(layout.seed_ta_filtered_dir())
        .map_err(|e| AppError::UpstreamMissing(format!("ta_filtered/: {e}")))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("pdf"))
        .collect();
    pdf_paths.sort();
    pdf_paths.truncate(options.max_pdfs);

    let anchor_variants_str = crate::pipeline::seed::anchor_variants(topic).join(", ");
    let category_list = options.category_list.join(", ");

    let seed_titles: BTreeMap<String, String> = {
        let bytes = std::fs::read(layout.seed_selection_json())
            .map_err(|e| AppError::UpstreamMissing(format!("seed_selection.json: {e}")))?;
        let selection: SeedSelection = serde_json::from_slice(&bytes)?;
        selection.rows.into_iter().map(|row| (row.arxiv_id, row.title)).collect()
    };

    let mut partials = Vec::with_capacity(pdf_paths.len());
    let mut per_paper = Vec::with_capacity(pdf_paths.len());

    for pdf_path in &pdf_paths {
        let arxiv_id = infer_arxiv_id_from_filename(pdf_path)
            .ok_or_else(|| AppError::ValidationError(format!("cannot infer arXiv id from {}", pdf_path.display())))?;

        let canonical = services.arxiv.fetch_by_id(&arxiv_id).await?;

        if let Some(seed_title) = seed_titles.get(&arxiv_id) {
            if !titles_match(seed_title, &canonical.title) {
                return Err(AppError::ValidationError(format!(
                    "canonical metadata title for {arxiv_id} does not match seed_selection.json verbatim"
                )));
            }
        }

        let metadata_block = format!("title: {}\nabstract: {}", canonical.title, canonical.abstract_text.clone().unwrap_or_default());
        let mut values = BTreeMap::new();
        values.insert("topic_hint".to_string(), topic.to_string());
        values.insert("anchor_variants".to_string(), anchor_variants_str.clone());
        values.insert("category_list".to_string(), category_list.clone());
        values.insert("metadata_block".to_string(), metadata_block);
        let prompt = TemplateRenderer::render(PromptTemplates::generate_search_terms(), &values)?;

        let messages = vec![Message::user(prompt)];
        let config = ChatConfig::default();
        let attachments = vec![Attachment { path: pdf_path.clone() }];
        let value = services.chat.complete_json(&messages, &config, &attachments).await?;
        let partial: PartialExtraction = serde_json::from_value(value)?;

        per_paper.push(PaperKeywords {
            arxiv_id,
            detected_keywords: partial.detected_keywords.clone(),
            evidence: partial.evidence.clone(),
        });
        partials.push(partial);
    }

    let (anchor_terms, search_terms) = if partials.len() > 1 {
        match aggregate(services, &partials).await {
            Ok(merged) => merged,
            Err(_) => merge_keywords_deterministic(&partials, options.max_queries),
        }
    } else if let Some(only) = partials.into_iter().next() {
        (only.anchor_terms, only.search_terms)
    } else {
        (Vec::new(), BTreeMap::new())
    };

    let (anchor_terms, search_terms) = postprocess(anchor_terms, search_terms, options.max_queries);

    let payload = KeywordsPayload {
        topic: topic.to_string(),
        anchor_terms,
        search_terms,
        papers: per_paper,
    };
    write_json_atomic(&layout.keywords_json(), &payload)?;

    let mut metrics = BTreeMap::new();
    metrics.insert("pdfs_processed".to_string(), pdf_paths.len().to_string());
    metrics.insert("total_term_count".to_string(), payload.total_term_count().to_string());

    Ok((vec![layout.keywords_json()], metrics))
}

async fn aggregate(services: &Services, partials: &[PartialExtraction]) -> AppResult<(Vec<String>, BTreeMap<String, Vec<String>>)> {
    let payloads_block = partials
        .iter()
        .map(|p| serde_json::json!({"anchor_terms": p.anchor_terms, "search_terms": p.search_terms}).to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let mut values = BTreeMap::new();
    values.insert("partial_payloads".to_string(), payloads_block);
    let prompt = TemplateRenderer::render(PromptTemplates::aggregate_search_terms(), &values)?;

    let messages = vec![Message::user(prompt)];
    let config = ChatConfig::default();
    let value = services.chat.complete_json(&messages, &config, &[]).await?;
    let merged: PartialExtraction = serde_json::from_value(value)?;
    Ok((merged.anchor_terms, merged.search_terms))
}

/// Union all partial search_terms per category, dedupe
/// case-insensitively, union anchor_terms, cap total count. The one
/// documented non-LLM fallback permitted when aggregation fails to
/// parse.
pub fn merge_keywords_deterministic(
    partials: &[PartialExtraction],
    max_queries: usize,
) -> (Vec<String>, BTreeMap<String, Vec<String>>) {
    let mut anchor_seen = BTreeSet::new();
    let mut anchor_terms = Vec::new();
    for partial in partials {
        for term in &partial.anchor_terms {
            if anchor_seen.insert(term.to_lowercase()) {
                anchor_terms.push(term.clone());
            }
        }
    }

    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut seen: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for partial in partials {
        for (category, terms) in &partial.search_terms {
            let entry = merged.entry(category.clone()).or_default();
            let seen_entry = seen.entry(category.clone()).or_default();
            for term in terms {
                if seen_entry.insert(term.to_lowercase()) {
                    entry.push(term.clone());
                }
            }
        }
    }

    cap_total(&mut merged, max_queries);
    (anchor_terms, merged)
}

/// Whether a seed-recorded title and a freshly-fetched canonical title
/// refer to the same paper, up to the same normalization used for
/// cutoff/dedup matching elsewhere in the pipeline.
fn titles_match(seed_title: &str, canonical_title: &str) -> bool {
    normalize_title(seed_title) == normalize_title(canonical_title)
}

fn cap_total(search_terms: &mut BTreeMap<String, Vec<String>>, max_queries: usize) {
    let mut total: usize = search_terms.values().map(|v| v.len()).sum();
    'outer: while total > max_queries {
        for terms in search_terms.values_mut() {
            if terms.pop().is_some() {
                total -= 1;
                if total <= max_queries {
                    break 'outer;
                }
            }
        }
    }
}

/// Normalize terms: underscores to spaces, drop anything longer than
/// three words, dedupe case-insensitively, cap total count.
fn postprocess(
    anchor_terms: Vec<String>,
    search_terms: BTreeMap<String, Vec<String>>,
    max_queries: usize,
) -> (Vec<String>, BTreeMap<String, Vec<String>>) {
    let clean = |term: &str| term.replace('_', " ").trim().to_string();

    let mut anchor_seen = BTreeSet::new();
    let anchor_terms: Vec<String> = anchor_terms
        .into_iter()
        .map(|t| clean(&t))
        .filter(|t| !t.is_empty())
        .filter(|t| anchor_seen.insert(t.to_lowercase()))
        .collect();

    let mut normalized: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (category, terms) in search_terms {
        let mut seen = BTreeSet::new();
        let cleaned: Vec<String> = terms
            .into_iter()
            .map(|t| clean(&t))
            .filter(|t| !t.is_empty() && t.split_whitespace().count() <= 3)
            .filter(|t| seen.insert(t.to_lowercase()))
            .collect();
        if !cleaned.is_empty() {
            normalized.insert(category, cleaned);
        }
    }

    cap_total(&mut normalized, max_queries);
    (anchor_terms, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(anchor: &[&str], terms: &[(&str, &[&str])]) -> PartialExtraction {
        PartialExtraction {
            anchor_terms: anchor.iter().map(|s| s.to_string()).collect(),
            search_terms: terms.iter().map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect())).collect(),
            detected_keywords: Vec::new(),
            evidence: Vec::new(),
        }
    }

    #[test]
    fn test_titles_match_ignores_case_and_punctuation() {
        assert!(titles_match("Discrete Audio Tokens!", "discrete audio tokens"));
        assert!(!titles_match("Discrete Audio Tokens", "A Different Paper"));
    }

    #[test]
    fn test_merge_keywords_deterministic_dedupes_case_insensitively() {
        let a = partial(&["Diffusion"], &[("architecture", &["Attention", "encoder"])]);
        let b = partial(&["diffusion"], &[("architecture", &["attention", "decoder"])]);
        let (anchors, terms) = merge_keywords_deterministic(&[a, b], 100);
        assert_eq!(anchors, vec!["Diffusion".to_string()]);
        assert_eq!(terms["architecture"], vec!["Attention".to_string(), "encoder".to_string(), "decoder".to_string()]);
    }

    #[test]
    fn test_merge_keywords_deterministic_caps_total() {
        let a = partial(&[], &[("architecture", &["a", "b", "c", "d"])]);
        let (_, terms) = merge_keywords_deterministic(&[a], 2);
        let total: usize = terms.values().map(|v| v.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_postprocess_rejects_long_phrases_and_underscores() {
        let mut terms = BTreeMap::new();
        terms.insert("architecture".to_string(), vec!["self_attention".to_string(), "a very long four word phrase".to_string()]);
        let (_, out) = postprocess(Vec::new(), terms, 100);
        assert_eq!(out["architecture"], vec!["self attention".to_string()]);
    }
}
