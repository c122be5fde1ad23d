//! DBLP publication search, hand-rolled over `reqwest` + the public
//! JSON search API (`https://dblp.org/search/publ/api`). No existing
//! crate in the dependency stack wraps DBLP.

use crate::models::{Paper, PaperSource};
use crate::services::metadata::MetadataSource;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub struct DblpSource {
    client: Client,
    base_url: String,
}

impl DblpSource {
    pub fn new() -> Self {
        Self { client: Client::new(), base_url: "https://dblp.org/search/publ/api".to_string() }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for DblpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct DblpEnvelope {
    result: DblpResult,
}

#[derive(Deserialize)]
struct DblpResult {
    hits: DblpHits,
}

#[derive(Deserialize)]
struct DblpHits {
    #[serde(default)]
    hit: Vec<DblpHit>,
}

#[derive(Deserialize)]
struct DblpHit {
    info: DblpInfo,
}

#[derive(Deserialize)]
struct DblpInfo {
    title: Option<String>,
    doi: Option<String>,
    year: Option<String>,
    url: Option<String>,
    #[serde(default)]
    authors: Option<DblpAuthors>,
}

#[derive(Deserialize)]
struct DblpAuthors {
    #[serde(default)]
    author: DblpAuthorList,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DblpAuthorList {
    One(DblpAuthor),
    Many(Vec<DblpAuthor>),
    None,
}

impl Default for DblpAuthorList {
    fn default() -> Self {
        DblpAuthorList::None
    }
}

#[derive(Deserialize)]
struct DblpAuthor {
    #[serde(rename = "text")]
    name: String,
}

#[async_trait]
impl MetadataSource for DblpSource {
    fn name(&self) -> &'static str {
        "dblp"
    }

    async fn search(&self, query_text: &str, max_results: usize) -> AppResult<Vec<Paper>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query_text),
                ("format", "json"),
                ("h", &max_results.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("DBLP request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited("DBLP rate limited".to_string()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("failed to read DBLP response: {e}")))?;
        if !status.is_success() {
            return Err(AppError::ExternalHttpError(format!("DBLP error ({status}): {body}")));
        }

        let envelope: DblpEnvelope =
            serde_json::from_str(&body).map_err(|e| AppError::ParseError(format!("failed to parse DBLP response: {e}")))?;

        Ok(envelope
            .result
            .hits
            .hit
            .into_iter()
            .map(|h| Self::convert(h.info))
            .collect())
    }
}

impl DblpSource {
    fn convert(info: DblpInfo) -> Paper {
        let title = info.title.unwrap_or_default();
        let source_id = info.url.clone().unwrap_or_else(|| title.clone());
        let mut paper = Paper::new(title, PaperSource::Dblp, source_id);
        paper.doi = info.doi;
        paper.landing_url = info.url;
        paper.published_date = info
            .year
            .and_then(|y| chrono::NaiveDate::from_ymd_opt(y.parse().ok()?, 1, 1));
        paper.authors = match info.authors.map(|a| a.author) {
            Some(DblpAuthorList::One(a)) => vec![a.name],
            Some(DblpAuthorList::Many(list)) => list.into_iter().map(|a| a.name).collect(),
            _ => Vec::new(),
        };
        paper
    }
}
