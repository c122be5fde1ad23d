//! `MetadataSource`: the capability abstracting external metadata APIs.
//! Harvest-Other fans out over one implementation per source; arXiv is
//! also used directly by Seed/Harvest for structured boolean queries
//! (see `arxiv::ArxivGateway`), which is a richer surface than this
//! trait exposes.

pub mod arxiv;
pub mod dblp;
pub mod openalex;
pub mod semantic_scholar;

pub use arxiv::ArxivGateway;
pub use dblp::DblpSource;
pub use openalex::OpenAlexSource;
pub use semantic_scholar::SemanticScholarSource;

use crate::shared::errors::AppResult;
use async_trait::async_trait;

/// A single free-text metadata search used by the Harvest-Other stage.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query_text: &str, max_results: usize) -> AppResult<Vec<crate::models::Paper>>;
}
