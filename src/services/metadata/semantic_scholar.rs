//! Semantic Scholar Graph v1 source, backed by the `ss-tools` crate.

use crate::models::{Paper, PaperSource};
use crate::services::metadata::MetadataSource;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use ss_tools::structs::Paper as SsPaper;
use ss_tools::{QueryParams as SsQueryParams, SemanticScholar};

pub struct SemanticScholarSource {
    client: SemanticScholar,
    retry_count: u64,
    wait_time: u64,
}

impl SemanticScholarSource {
    pub fn new() -> Self {
        Self { client: SemanticScholar::new(), retry_count: 3, wait_time: 1 }
    }

    pub fn with_retry_config(mut self, retry_count: u64, wait_time: u64) -> Self {
        self.retry_count = retry_count;
        self.wait_time = wait_time;
        self
    }

    pub async fn fetch_citations(&self, paper_id: &str) -> AppResult<Vec<Paper>> {
        let mut params = SsQueryParams::default();
        params.paper_id(paper_id);
        let mut client = self.client.clone();
        let response = client
            .query_paper_citations(params, self.retry_count, self.wait_time)
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("Semantic Scholar citations failed: {e}")))?;
        Ok(response.data.into_iter().filter_map(|rd| rd.citing_paper).map(Self::convert).collect())
    }

    pub async fn fetch_references(&self, paper_id: &str) -> AppResult<Vec<Paper>> {
        let mut params = SsQueryParams::default();
        params.paper_id(paper_id);
        let mut client = self.client.clone();
        let response = client
            .query_paper_references(params, self.retry_count, self.wait_time)
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("Semantic Scholar references failed: {e}")))?;
        Ok(response.data.into_iter().filter_map(|rd| rd.citing_paper).map(Self::convert).collect())
    }

    fn convert(p: SsPaper) -> Paper {
        let mut paper = Paper::new(p.title.unwrap_or_default(), PaperSource::SemanticScholar, p.paper_id.clone().unwrap_or_default());
        paper.doi = p.external_ids.as_ref().and_then(|e| e.doi.clone());
        paper.abstract_text = p.abstract_text;
        paper.authors = p.authors.unwrap_or_default().into_iter().filter_map(|a| a.name).collect();
        paper.pdf_url = p.open_access_pdf.and_then(|o| o.url);
        paper.landing_url = p.url;
        paper.published_date = p
            .publication_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());
        paper
    }
}

impl Default for SemanticScholarSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataSource for SemanticScholarSource {
    fn name(&self) -> &'static str {
        "semantic_scholar"
    }

    async fn search(&self, query_text: &str, max_results: usize) -> AppResult<Vec<Paper>> {
        let mut params = SsQueryParams::default();
        params.query_text(query_text);
        params.limit(max_results as u64);
        let mut client = self.client.clone();
        let papers = client
            .query_papers_by_title(params, self.retry_count, self.wait_time)
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("Semantic Scholar search failed: {e}")))?;
        Ok(papers.into_iter().map(Self::convert).collect())
    }
}
