//! arXiv Atom API gateway. Exposes the structured boolean-query surface
//! Seed and Harvest need, rather than only the generic `MetadataSource`
//! free-text search.

use crate::models::{Paper, PaperSource};
use crate::shared::errors::{AppError, AppResult};
use arxiv_tools::{ArXiv, Paper as ArxivPaper, QueryParams, SortBy, SortOrder};
use chrono::NaiveDate;

#[derive(Debug, Clone, Default)]
pub struct ArxivGateway;

impl ArxivGateway {
    pub fn new() -> Self {
        Self
    }

    /// Run a pre-built boolean `QueryParams`, paginating up to
    /// `max_results`, sorted by submission date descending.
    pub async fn query(&self, query: QueryParams, max_results: usize) -> AppResult<Vec<Paper>> {
        let papers = ArXiv::from_args(query)
            .max_results(max_results as u64)
            .sort_by(SortBy::SubmittedDate)
            .sort_order(SortOrder::Descending)
            .query()
            .await;
        Ok(papers.into_iter().map(Self::convert).collect())
    }

    /// Fetch a single paper's canonical metadata by arXiv id, used by
    /// the Keywords stage to validate LLM-extracted titles/abstracts
    /// verbatim against the source of record.
    pub async fn fetch_by_id(&self, arxiv_id: &str) -> AppResult<Paper> {
        let papers = ArXiv::from_id_list(vec![arxiv_id]).query().await;
        papers
            .into_iter()
            .next()
            .map(Self::convert)
            .ok_or_else(|| AppError::UpstreamMissing(format!("arXiv paper not found: {arxiv_id}")))
    }

    /// Build `(anchor_a OR anchor_b ...) AND (term)`, the shape Harvest
    /// uses for each `(anchor, category, term)` tuple and Seed uses for
    /// `(anchor OR ...) AND (doctype OR ...)`.
    pub fn build_and_query(anchor_group: Vec<String>, other_group: Vec<String>) -> QueryParams {
        let anchors: Vec<QueryParams> = anchor_group.into_iter().map(|a| QueryParams::all(&a)).collect();
        let others: Vec<QueryParams> = other_group.into_iter().map(|t| QueryParams::all(&t)).collect();

        let anchor_clause = if anchors.len() == 1 {
            anchors.into_iter().next().unwrap()
        } else {
            QueryParams::or(anchors)
        };
        let other_clause = if others.len() == 1 {
            others.into_iter().next().unwrap()
        } else {
            QueryParams::or(others)
        };
        QueryParams::and(vec![anchor_clause, other_clause])
    }

    fn convert(p: ArxivPaper) -> Paper {
        let arxiv_id = Paper::extract_arxiv_id(&p.id);
        let mut paper = Paper::new(p.title.clone(), PaperSource::Arxiv, arxiv_id.clone());
        paper.arxiv_id = Some(arxiv_id);
        paper.abstract_text = Some(p.summary);
        paper.authors = p.authors.into_iter().map(|a| a.name).collect();
        paper.pdf_url = Some(format!("https://arxiv.org/pdf/{}", paper.arxiv_id.clone().unwrap()));
        paper.landing_url = Some(p.id);
        paper.published_date = NaiveDate::parse_from_str(&p.published[..10.min(p.published.len())], "%Y-%m-%d").ok();
        paper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_query_single_terms() {
        // smoke test: building the query must not panic and must combine
        // exactly one anchor clause with one term clause.
        let _q = ArxivGateway::build_and_query(vec!["diffusion models".to_string()], vec!["survey".to_string()]);
    }

    #[test]
    fn test_build_and_query_multi_terms() {
        let _q = ArxivGateway::build_and_query(
            vec!["diffusion models".to_string(), "diffusion model".to_string()],
            vec!["survey".to_string(), "review".to_string()],
        );
    }
}
