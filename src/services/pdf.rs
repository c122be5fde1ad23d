//! `PdfReader`: the capability abstracting PDF text extraction, backed
//! by `rsrpp`. Out of scope per the purpose statement — the pipeline
//! only needs extracted plain text and section titles.

use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use futures::FutureExt;
use rsrpp::config::ParserConfig;
use rsrpp::parser::{pages2sections, parse};
use std::panic::AssertUnwindSafe;
use std::path::Path;

/// One section of extracted PDF text.
#[derive(Debug, Clone)]
pub struct PdfSection {
    pub title: String,
    pub content: String,
}

/// The full result of extracting a PDF.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub sections: Vec<PdfSection>,
    pub plain_text: String,
}

#[async_trait]
pub trait PdfReader: Send + Sync {
    async fn extract(&self, path_or_url: &str) -> AppResult<PdfText>;
}

/// `rsrpp`-backed implementation. Wraps the parse call in
/// `catch_unwind` since `rsrpp` is known to panic on malformed input
/// rather than returning an error.
#[derive(Debug, Clone, Default)]
pub struct RsrppPdfReader {
    pub verbose: bool,
}

impl RsrppPdfReader {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PdfReader for RsrppPdfReader {
    async fn extract(&self, path_or_url: &str) -> AppResult<PdfText> {
        let mut parser_config = ParserConfig::new();

        let parse_result = AssertUnwindSafe(parse(path_or_url, &mut parser_config, self.verbose))
            .catch_unwind()
            .await;

        let pages = match parse_result {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => return Err(AppError::ParseError(format!("PDF parse failed: {e}"))),
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic during PDF extraction".to_string());
                return Err(AppError::ParseError(format!("PDF extraction panicked: {msg}")));
            }
        };

        let sections = pages2sections(&pages, &parser_config);
        let paper_sections: Vec<PdfSection> = sections
            .iter()
            .map(|s| PdfSection { title: s.title.clone(), content: s.get_text() })
            .collect();
        let plain_text = paper_sections.iter().map(|s| s.content.clone()).collect::<Vec<_>>().join("\n\n");

        if parser_config.clean_files().is_err() {
            tracing::warn!("failed to clean up temporary PDF extraction files");
        }

        Ok(PdfText { sections: paper_sections, plain_text })
    }
}

/// Infer a bare arXiv id from a downloaded PDF's filename, per the
/// Keywords stage's algorithm: regex `(\d{4}\.\d{4,5})(v\d+)?`.
pub fn infer_arxiv_id_from_filename(path: &Path) -> Option<String> {
    let name = path.file_stem()?.to_str()?;
    let re = regex::Regex::new(r"(\d{4}\.\d{4,5})(v\d+)?").unwrap();
    re.captures(name).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_infer_arxiv_id_from_filename() {
        assert_eq!(
            infer_arxiv_id_from_filename(&PathBuf::from("1706.03762v2.pdf")),
            Some("1706.03762".to_string())
        );
        assert_eq!(
            infer_arxiv_id_from_filename(&PathBuf::from("1706.03762.pdf")),
            Some("1706.03762".to_string())
        );
    }

    #[test]
    fn test_infer_arxiv_id_from_filename_no_match() {
        assert_eq!(infer_arxiv_id_from_filename(&PathBuf::from("notes.pdf")), None);
    }
}
