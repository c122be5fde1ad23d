//! The nine-stage discovery pipeline. Each submodule owns one stage's
//! algorithm and persists its outputs through `WorkspaceLayout`; `runner`
//! holds the shared existence-check/`--force`/atomic-write contract.

pub mod criteria;
pub mod filter_seed;
pub mod harvest;
pub mod harvest_other;
pub mod keywords;
pub mod latte_review;
pub mod review;
pub mod runner;
pub mod seed;
pub mod snowball;
pub mod snowball_iterate;
