//! # SLR Discovery
//!
//! A staged, resumable pipeline for systematic literature review
//! discovery: seed selection from arXiv surveys, LLM-screened keyword
//! extraction, multi-source metadata harvesting, criteria synthesis,
//! multi-reviewer LatteReview screening, and citation snowballing with
//! cross-round deduplication.
//!
//! Every stage reads and writes through [`workspace::WorkspaceLayout`]
//! and is independently resumable: re-running a stage whose primary
//! output already exists is a no-op unless `--force` is passed (see
//! [`pipeline::runner`]).

pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod services;
pub mod shared;
pub mod workspace;

pub use shared::config::Config;
pub use shared::errors::{AppError, AppResult};
pub use workspace::WorkspaceLayout;
