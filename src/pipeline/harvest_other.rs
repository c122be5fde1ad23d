//! Harvest-Other stage: parallel fan-out across Semantic Scholar, DBLP,
//! and OpenAlex, each gated by its own rate limiter. A single source's
//! retry exhaustion does not fail the whole stage — its absence is
//! recorded in `metrics.sources_failed` rather than silently dropped.

use crate::models::{KeywordsPayload, Paper};
use crate::services::Services;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::write_json_atomic;
use crate::workspace::WorkspaceLayout;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct HarvestOtherOptions {
    pub max_results_per_source: usize,
}

impl Default for HarvestOtherOptions {
    fn default() -> Self {
        Self { max_results_per_source: 50 }
    }
}

pub async fn run(
    services: &Services,
    layout: &WorkspaceLayout,
    options: &HarvestOtherOptions,
    force: bool,
) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("harvest-other", &layout.harvest_other_source_json("openalex"), force, || async {
        execute(services, layout, options).await
    })
    .await
}

async fn execute(
    services: &Services,
    layout: &WorkspaceLayout,
    options: &HarvestOtherOptions,
) -> AppResult<(Vec<PathBuf>, BTreeMap<String, String>)> {
    let keywords: KeywordsPayload = {
        let bytes = std::fs::read(layout.keywords_json())
            .map_err(|e| AppError::UpstreamMissing(format!("keywords.json: {e}")))?;
        serde_json::from_slice(&bytes)?
    };
    let query_text = keywords.anchor_terms.join(" ");
    if query_text.is_empty() {
        return Err(AppError::ValidationError("no anchor terms to search with".to_string()));
    }

    // The three upstreams are independent services with independent
    // rate limiters, so they are queried concurrently rather than in
    // sequence, per the stage's documented "parallel harvest" contract.
    let semantic_scholar_call = async {
        services.semantic_scholar_limiter.acquire().await;
        services.semantic_scholar.search(&query_text, options.max_results_per_source).await
    };
    let dblp_call = async {
        services.dblp_limiter.acquire().await;
        services.dblp.search(&query_text, options.max_results_per_source).await
    };
    let openalex_call = async {
        services.openalex_limiter.acquire().await;
        services.openalex.search(&query_text, options.max_results_per_source).await
    };
    let (semantic_scholar_result, dblp_result, openalex_result) =
        tokio::join!(semantic_scholar_call, dblp_call, openalex_call);

    let mut outputs = Vec::new();
    let mut sources_failed = Vec::new();
    let mut total = 0usize;

    for (name, result) in [
        ("semantic_scholar", semantic_scholar_result),
        ("dblp", dblp_result),
        ("openalex", openalex_result),
    ] {
        match result {
            Ok(papers) => {
                total += papers.len();
                outputs.push(persist_source(layout, name, &papers)?);
            }
            Err(e) => sources_failed.push(format!("{name}: {e}")),
        }
    }

    if outputs.is_empty() {
        return Err(AppError::ExternalHttpError(format!(
            "all Harvest-Other sources failed: {}",
            sources_failed.join("; ")
        )));
    }

    let mut metrics = BTreeMap::new();
    metrics.insert("records_harvested".to_string(), total.to_string());
    metrics.insert("sources_failed".to_string(), sources_failed.join(";"));

    Ok((outputs, metrics))
}

fn persist_source(layout: &WorkspaceLayout, source: &str, papers: &[Paper]) -> AppResult<PathBuf> {
    let path = layout.harvest_other_source_json(source);
    write_json_atomic(&path, papers)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_other_options_default() {
        assert_eq!(HarvestOtherOptions::default().max_results_per_source, 50);
    }
}
