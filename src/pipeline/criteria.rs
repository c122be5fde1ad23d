//! Criteria stage: synthesize `criteria.json` from a two-phase LLM
//! research+format workflow, hashed with SHA-256 over a canonicalized
//! JSON serialization for the registry's criteria-hash guard.

use crate::models::CriteriaDocument;
use crate::prompts::{PromptTemplates, TemplateRenderer};
use crate::services::chat::{Attachment, ChatConfig, Message};
use crate::services::Services;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::write_json_atomic;
use crate::workspace::WorkspaceLayout;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaMode {
    Web,
    PdfAndWeb,
}

#[derive(Debug, Clone)]
pub struct CriteriaOptions {
    pub mode: CriteriaMode,
    pub recency_hint: String,
    pub background_pdf: Option<PathBuf>,
}

impl Default for CriteriaOptions {
    fn default() -> Self {
        Self { mode: CriteriaMode::Web, recency_hint: String::new(), background_pdf: None }
    }
}

pub async fn run(
    services: &Services,
    layout: &WorkspaceLayout,
    topic: &str,
    options: &CriteriaOptions,
    force: bool,
) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("criteria", &layout.criteria_json(), force, || async {
        execute(services, layout, topic, options).await
    })
    .await
}

async fn execute(
    services: &Services,
    layout: &WorkspaceLayout,
    topic: &str,
    options: &CriteriaOptions,
) -> AppResult<(Vec<PathBuf>, BTreeMap<String, String>)> {
    let mut background = String::new();
    let mut attachments = Vec::new();
    if options.mode == CriteriaMode::PdfAndWeb {
        if let Some(pdf_path) = &options.background_pdf {
            let extracted = services.pdf.extract(&pdf_path.display().to_string()).await?;
            background = extracted.plain_text;
            attachments.push(Attachment { path: pdf_path.clone() });
        }
    }

    let mut research_values = BTreeMap::new();
    research_values.insert("topic".to_string(), topic.to_string());
    research_values.insert("recency_hint".to_string(), options.recency_hint.clone());
    research_values.insert("background".to_string(), background);
    let research_prompt = TemplateRenderer::render(PromptTemplates::criteria_research(), &research_values)?;

    let mut research_config = ChatConfig::default();
    research_config.enable_web_search = true;
    let research_messages = vec![Message::user(research_prompt)];
    let notes = services.chat.complete(&research_messages, &research_config, &attachments).await?;
    write_json_atomic(&layout.criteria_raw_notes_json(), &serde_json::json!({"notes": notes}))?;

    let mut format_values = BTreeMap::new();
    format_values.insert("notes".to_string(), notes);
    let format_prompt = TemplateRenderer::render(PromptTemplates::criteria_format(), &format_values)?;

    let format_config = ChatConfig::default();
    let format_messages = vec![Message::user(format_prompt)];
    let value = services.chat.complete_json(&format_messages, &format_config, &[]).await?;

    let mut document: CriteriaDocument = serde_json::from_value(value)
        .map_err(|e| AppError::ParseError(format!("criteria formatter response did not match schema: {e}")))?;

    if document.inclusion_criteria.required.is_empty()
        || !document.inclusion_criteria.required[0].text.contains(document.topic_definition.trim())
    {
        return Err(AppError::ValidationError(
            "inclusion_criteria.required[0] must quote topic_definition verbatim".to_string(),
        ));
    }

    document.criteria_hash = compute_criteria_hash(&document)?;
    write_json_atomic(&layout.criteria_json(), &document)?;

    let mut metrics = BTreeMap::new();
    metrics.insert("criteria_hash".to_string(), document.criteria_hash.clone());

    Ok((vec![layout.criteria_json()], metrics))
}

/// Hash the document's content (excluding the hash field itself) under a
/// canonical, key-sorted JSON serialization: `serde_json::Map` preserves
/// insertion order, so this walks through a `BTreeMap` re-serialization
/// before hashing to make the digest independent of field order.
pub fn compute_criteria_hash(document: &CriteriaDocument) -> AppResult<String> {
    let mut value = serde_json::to_value(document)?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("criteria_hash");
    }
    let canonical = canonicalize(&value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<&String, &serde_json::Value> = map.iter().collect();
            let parts: Vec<String> = sorted.iter().map(|(k, v)| format!("{:?}:{}", k, canonicalize(v))).collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CriteriaClause, CriteriaGroup};

    fn sample_document() -> CriteriaDocument {
        CriteriaDocument {
            topic_definition: "diffusion models for audio".to_string(),
            summary: "summary".to_string(),
            summary_topics: vec!["audio".to_string()],
            inclusion_criteria: CriteriaGroup {
                required: vec![CriteriaClause {
                    text: "papers about diffusion models for audio".to_string(),
                    rationale: "core topic".to_string(),
                    source_urls: Vec::new(),
                }],
                any_of: Vec::new(),
            },
            exclusion_criteria: CriteriaGroup::default(),
            exclude_title: None,
            cutoff_before_date: None,
            skip_titles_containing: Some("survey".to_string()),
            criteria_hash: String::new(),
        }
    }

    #[test]
    fn test_compute_criteria_hash_is_deterministic() {
        let doc = sample_document();
        let a = compute_criteria_hash(&doc).unwrap();
        let b = compute_criteria_hash(&doc).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_compute_criteria_hash_changes_with_content() {
        let mut doc = sample_document();
        let original = compute_criteria_hash(&doc).unwrap();
        doc.summary = "a different summary".to_string();
        let changed = compute_criteria_hash(&doc).unwrap();
        assert_ne!(original, changed);
    }

    #[test]
    fn test_compute_criteria_hash_ignores_existing_hash_field() {
        let mut doc = sample_document();
        doc.criteria_hash = "stale".to_string();
        let a = compute_criteria_hash(&doc).unwrap();
        doc.criteria_hash = "different-stale".to_string();
        let b = compute_criteria_hash(&doc).unwrap();
        assert_eq!(a, b);
    }
}
