//! OpenAlex Works API source, hand-rolled over `reqwest`. Used both by
//! Harvest-Other (generic search) and by the Snowball controller for
//! forward-citation and backward-reference traversal.

use crate::models::{Paper, PaperSource};
use crate::services::metadata::MetadataSource;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

pub struct OpenAlexSource {
    client: Client,
    base_url: String,
    /// Sent as the `mailto` parameter to use OpenAlex's polite pool.
    contact_email: Option<String>,
}

impl OpenAlexSource {
    pub fn new(contact_email: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.openalex.org".to_string(),
            contact_email,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn mailto_param(&self) -> Vec<(&str, &str)> {
        match &self.contact_email {
            Some(email) => vec![("mailto", email.as_str())],
            None => vec![],
        }
    }

    async fn fetch_works(&self, filter: &str, per_page: usize) -> AppResult<Vec<OpenAlexWork>> {
        let mut query = vec![("filter", filter.to_string()), ("per-page", per_page.to_string())];
        for (k, v) in self.mailto_param() {
            query.push((k, v.to_string()));
        }
        let response = self
            .client
            .get(format!("{}/works", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("OpenAlex request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited("OpenAlex rate limited".to_string()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("failed to read OpenAlex response: {e}")))?;
        if !status.is_success() {
            return Err(AppError::ExternalHttpError(format!("OpenAlex error ({status}): {body}")));
        }
        let envelope: OpenAlexEnvelope =
            serde_json::from_str(&body).map_err(|e| AppError::ParseError(format!("failed to parse OpenAlex response: {e}")))?;
        Ok(envelope.results)
    }

    /// Resolve a canonical OpenAlex work id for `doi`, if known.
    pub async fn resolve_by_doi(&self, doi: &str) -> AppResult<Option<Paper>> {
        let works = self.fetch_works(&format!("doi:{doi}"), 1).await?;
        Ok(works.into_iter().next().map(Self::convert))
    }

    /// Works that cite `openalex_id` (forward citations).
    pub async fn fetch_citing_works(&self, openalex_id: &str, per_page: usize) -> AppResult<Vec<Paper>> {
        let works = self.fetch_works(&format!("cites:{openalex_id}"), per_page).await?;
        Ok(works.into_iter().map(Self::convert).collect())
    }

    /// Works referenced by `openalex_id` (backward references). OpenAlex
    /// exposes `referenced_works` on the work record itself rather than
    /// as a filter, so this fetches the work and resolves each id.
    pub async fn fetch_referenced_works(&self, openalex_id: &str) -> AppResult<Vec<Paper>> {
        let id = openalex_id.trim_start_matches("https://openalex.org/");
        let response = self
            .client
            .get(format!("{}/works/{}", self.base_url, id))
            .query(&self.mailto_param())
            .send()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("OpenAlex request failed: {e}")))?;
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("failed to read OpenAlex response: {e}")))?;
        let work: OpenAlexWork =
            serde_json::from_str(&body).map_err(|e| AppError::ParseError(format!("failed to parse OpenAlex work: {e}")))?;

        let mut referenced = Vec::new();
        for ref_id in work.referenced_works.iter().take(200) {
            if let Some(paper) = self.resolve_by_id(ref_id).await? {
                referenced.push(paper);
            }
        }
        Ok(referenced)
    }

    async fn resolve_by_id(&self, openalex_id: &str) -> AppResult<Option<Paper>> {
        let id = openalex_id.trim_start_matches("https://openalex.org/");
        let response = self
            .client
            .get(format!("{}/works/{}", self.base_url, id))
            .query(&self.mailto_param())
            .send()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("OpenAlex request failed: {e}")))?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str::<OpenAlexWork>(&body).ok().map(Self::convert))
    }

    fn convert(w: OpenAlexWork) -> Paper {
        let mut paper = Paper::new(w.title.unwrap_or_default(), PaperSource::OpenAlex, w.id.clone());
        paper.openalex_id = Some(w.id);
        paper.doi = w.doi;
        paper.abstract_text = w.abstract_inverted_index.map(|idx| reconstruct_abstract(&idx));
        paper.authors = w
            .authorships
            .into_iter()
            .map(|a| a.author.display_name)
            .collect();
        paper.landing_url = w.primary_location.and_then(|l| l.landing_page_url);
        paper.published_date = w.publication_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());
        paper
    }
}

/// OpenAlex stores abstracts as an inverted index (`word -> [positions]`)
/// to keep the response payload small; reconstruct the plain text by
/// placing each word at its recorded positions.
fn reconstruct_abstract(index: &std::collections::HashMap<String, Vec<u32>>) -> String {
    let mut slots: Vec<(u32, &str)> = Vec::new();
    for (word, positions) in index {
        for &pos in positions {
            slots.push((pos, word.as_str()));
        }
    }
    slots.sort_by_key(|(pos, _)| *pos);
    slots.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl MetadataSource for OpenAlexSource {
    fn name(&self) -> &'static str {
        "openalex"
    }

    async fn search(&self, query_text: &str, max_results: usize) -> AppResult<Vec<Paper>> {
        let works = self
            .fetch_works(&format!("title.search:{}", urlencoding::encode(query_text)), max_results)
            .await?;
        Ok(works.into_iter().map(Self::convert).collect())
    }
}

#[derive(Deserialize)]
struct OpenAlexEnvelope {
    results: Vec<OpenAlexWork>,
}

#[derive(Deserialize)]
struct OpenAlexWork {
    id: String,
    title: Option<String>,
    doi: Option<String>,
    publication_date: Option<String>,
    #[serde(default)]
    authorships: Vec<OpenAlexAuthorship>,
    abstract_inverted_index: Option<std::collections::HashMap<String, Vec<u32>>>,
    primary_location: Option<OpenAlexLocation>,
    #[serde(default)]
    referenced_works: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAlexAuthorship {
    author: OpenAlexAuthor,
}

#[derive(Deserialize)]
struct OpenAlexAuthor {
    display_name: String,
}

#[derive(Deserialize)]
struct OpenAlexLocation {
    landing_page_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruct_abstract_orders_by_position() {
        let mut idx = std::collections::HashMap::new();
        idx.insert("Transformers".to_string(), vec![0]);
        idx.insert("are".to_string(), vec![1]);
        idx.insert("powerful".to_string(), vec![2]);
        assert_eq!(reconstruct_abstract(&idx), "Transformers are powerful");
    }
}
