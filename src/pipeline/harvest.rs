//! Harvest stage: execute anchor x search_term boolean queries against
//! arXiv, deduplicating within the harvest via the same canonical-key
//! priority the registry uses.

use crate::models::{KeywordsPayload, Paper};
use crate::registry::canonical_key;
use crate::services::metadata::arxiv::ArxivGateway;
use crate::services::Services;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::write_json_atomic;
use crate::workspace::WorkspaceLayout;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub top_k_per_query: usize,
    pub max_terms_per_category: usize,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self { top_k_per_query: 50, max_terms_per_category: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRecord {
    pub anchor: String,
    pub search_term: String,
    pub search_record: String,
    pub metadata: Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CategoryCoverage {
    pub terms_queried: usize,
    pub results_returned: usize,
    pub results_after_dedup: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryPlan {
    pub coverage: BTreeMap<String, CategoryCoverage>,
}

pub async fn run(
    services: &Services,
    layout: &WorkspaceLayout,
    options: &HarvestOptions,
    force: bool,
) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("harvest", &layout.harvest_arxiv_metadata_json(), force, || async {
        execute(services, layout, options).await
    })
    .await
}

async fn execute(
    services: &Services,
    layout: &WorkspaceLayout,
    options: &HarvestOptions,
) -> AppResult<(Vec<PathBuf>, BTreeMap<String, String>)> {
    let keywords: KeywordsPayload = {
        let bytes = std::fs::read(layout.keywords_json())
            .map_err(|e| AppError::UpstreamMissing(format!("keywords.json: {e}")))?;
        serde_json::from_slice(&bytes)?
    };

    let mut records: Vec<HarvestRecord> = Vec::new();
    let mut seen_keys: HashSet<crate::models::PaperKey> = HashSet::new();
    let mut plan = QueryPlan::default();

    for (category, terms) in &keywords.search_terms {
        let capped_terms: Vec<&String> = terms.iter().take(options.max_terms_per_category).collect();
        let coverage = plan.coverage.entry(category.clone()).or_default();
        coverage.terms_queried = capped_terms.len();

        for term in capped_terms {
            services.arxiv_limiter.acquire().await;
            let query = ArxivGateway::build_and_query(keywords.anchor_terms.clone(), vec![term.clone()]);
            let results = services.arxiv.query(query, options.top_k_per_query).await?;
            coverage.results_returned += results.len();

            for metadata in results {
                let key = canonical_key(&metadata);
                if seen_keys.insert(key) {
                    coverage.results_after_dedup += 1;
                    records.push(HarvestRecord {
                        anchor: keywords.anchor_terms.first().cloned().unwrap_or_default(),
                        search_term: term.clone(),
                        search_record: format!("{category}:{term}"),
                        metadata,
                    });
                }
            }
        }
    }

    write_json_atomic(&layout.harvest_query_plan_json(), &plan)?;
    write_json_atomic(&layout.harvest_arxiv_metadata_json(), &records)?;

    let mut metrics = BTreeMap::new();
    metrics.insert("records_harvested".to_string(), records.len().to_string());
    metrics.insert("categories".to_string(), plan.coverage.len().to_string());

    Ok((vec![layout.harvest_arxiv_metadata_json(), layout.harvest_query_plan_json()], metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_plan_default_coverage_is_empty() {
        let plan = QueryPlan::default();
        assert!(plan.coverage.is_empty());
    }

    #[test]
    fn test_harvest_options_defaults() {
        let opts = HarvestOptions::default();
        assert_eq!(opts.top_k_per_query, 50);
        assert_eq!(opts.max_terms_per_category, 20);
    }
}
