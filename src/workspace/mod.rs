//! Typed path accessors over a topic's workspace directory, replacing
//! string-concatenated paths throughout the pipeline (design notes §9).

use crate::shared::utils::slugify;
use std::path::{Path, PathBuf};

/// The on-disk layout under `workspaces/<slug>/...` (see the data-model
/// section). Every stage computes its paths through this type; no stage
/// builds a path by hand.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Resolve `root/<slug(topic)>`, creating nothing yet — workspaces
    /// are created lazily the first time a stage writes into them.
    pub fn for_topic(workspace_root: impl AsRef<Path>, topic: &str) -> Self {
        Self { root: workspace_root.as_ref().join(slugify(topic)) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- seed/ ---
    pub fn seed_arxiv_json(&self) -> PathBuf {
        self.root.join("seed/queries/arxiv.json")
    }
    pub fn seed_rewrite_json(&self) -> PathBuf {
        self.root.join("seed/queries/seed_rewrite.json")
    }
    pub fn seed_selection_json(&self) -> PathBuf {
        self.root.join("seed/queries/seed_selection.json")
    }
    pub fn seed_arxiv_raw_dir(&self) -> PathBuf {
        self.root.join("seed/downloads/arxiv_raw")
    }
    pub fn seed_ta_filtered_dir(&self) -> PathBuf {
        self.root.join("seed/downloads/ta_filtered")
    }
    pub fn seed_download_results_json(&self) -> PathBuf {
        self.root.join("seed/downloads/download_results.json")
    }
    pub fn seed_llm_screening_json(&self) -> PathBuf {
        self.root.join("seed/filters/llm_screening.json")
    }
    pub fn seed_selected_ids_json(&self) -> PathBuf {
        self.root.join("seed/filters/selected_ids.json")
    }

    // --- keywords/ ---
    pub fn keywords_json(&self) -> PathBuf {
        self.root.join("keywords/keywords.json")
    }
    pub fn keywords_usage_json(&self, tag: &str) -> PathBuf {
        self.root.join(format!("keywords/usage_{tag}.json"))
    }

    // --- harvest/ ---
    pub fn harvest_arxiv_metadata_json(&self) -> PathBuf {
        self.root.join("harvest/arxiv_metadata.json")
    }
    pub fn harvest_query_plan_json(&self) -> PathBuf {
        self.root.join("harvest/query_plan.json")
    }
    pub fn harvest_other_source_json(&self, source: &str) -> PathBuf {
        self.root.join(format!("harvest/other_sources/{source}.json"))
    }

    // --- criteria/ ---
    pub fn criteria_json(&self) -> PathBuf {
        self.root.join("criteria/criteria.json")
    }
    pub fn criteria_raw_notes_json(&self) -> PathBuf {
        self.root.join("criteria/raw_notes.json")
    }

    // --- review/ ---
    pub fn review_latte_results_json(&self) -> PathBuf {
        self.root.join("review/latte_review_results.json")
    }

    // --- snowball_rounds/ ---
    pub fn review_registry_json(&self) -> PathBuf {
        self.root.join("snowball_rounds/review_registry.json")
    }
    pub fn final_included_json(&self) -> PathBuf {
        self.root.join("snowball_rounds/final_included.json")
    }
    pub fn final_included_csv(&self) -> PathBuf {
        self.root.join("snowball_rounds/final_included.csv")
    }
    pub fn round_dir(&self, round: u32) -> PathBuf {
        self.root.join(format!("snowball_rounds/round_{round:02}"))
    }
    pub fn round_seeds_screening_included_csv(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("seeds_screening_included.csv")
    }
    pub fn round_snowball_results_raw_csv(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("snowball_results_raw.csv")
    }
    pub fn round_snowball_results_csv(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("snowball_results.csv")
    }
    pub fn round_snowball_for_review_csv(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("snowball_for_review.csv")
    }
    pub fn round_candidates_for_review_json(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("candidates_for_review.json")
    }
    pub fn round_latte_review_results_json(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("latte_review_results.json")
    }
    pub fn round_meta_json(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("round_meta.json")
    }
    pub fn round_dedup_report_json(&self, round: u32) -> PathBuf {
        self.round_dir(round).join("dedup_report.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_layout_slugifies_topic() {
        let layout = WorkspaceLayout::for_topic("workspaces", "Discrete Audio Tokens: A Survey!");
        assert_eq!(
            layout.root(),
            Path::new("workspaces/discrete_audio_tokens_a_survey")
        );
    }

    #[test]
    fn test_round_dir_zero_padded() {
        let layout = WorkspaceLayout::for_topic("workspaces", "topic");
        assert_eq!(
            layout.round_dir(3),
            Path::new("workspaces/topic/snowball_rounds/round_03")
        );
    }
}
