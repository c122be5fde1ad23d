//! The outer Snowball controller: drives round after round of
//! `snowball::run_round` until a stopping condition fires, then unions
//! every round's `include` verdicts into `final_included.{json,csv}`.

use crate::models::{CriteriaDocument, RoundMeta, Verdict};
use crate::pipeline::snowball::{run_round, SnowballOptions};
use crate::registry::canonical_key;
use crate::services::Services;
use crate::shared::errors::AppResult;
use crate::shared::utils::{write_csv_atomic, write_json_atomic};
use crate::workspace::WorkspaceLayout;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingMode {
    /// Run exactly `max_rounds` rounds.
    Loop,
    /// Run until `raw_count >= stop_raw_threshold` OR
    /// `cumulative_included >= stop_included_threshold`, bounded above
    /// by `max_rounds` either way.
    While,
}

#[derive(Debug, Clone)]
pub struct SnowballIterateOptions {
    pub mode: StoppingMode,
    pub max_rounds: u32,
    pub stop_raw_threshold: usize,
    pub stop_included_threshold: usize,
    pub round: SnowballOptions,
}

impl Default for SnowballIterateOptions {
    fn default() -> Self {
        Self {
            mode: StoppingMode::Loop,
            max_rounds: 3,
            stop_raw_threshold: usize::MAX,
            stop_included_threshold: usize::MAX,
            round: SnowballOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FinalIncludedRow {
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    published_date: Option<chrono::NaiveDate>,
    doi: Option<String>,
    openalex_id: Option<String>,
    arxiv_id: Option<String>,
}

impl From<&crate::models::Paper> for FinalIncludedRow {
    fn from(p: &crate::models::Paper) -> Self {
        Self {
            title: p.title.clone(),
            abstract_text: p.abstract_text.clone(),
            published_date: p.published_date,
            doi: p.doi.clone(),
            openalex_id: p.openalex_id.clone(),
            arxiv_id: p.arxiv_id.clone(),
        }
    }
}

/// Evaluate whether round `meta` should be the last one run, per
/// `options.mode`. `cumulative_included` is the running total across
/// every round completed so far, including `meta`'s own round.
pub fn should_stop(options: &SnowballIterateOptions, meta: &RoundMeta, cumulative_included: usize) -> bool {
    if meta.round_index >= options.max_rounds {
        return true;
    }
    match options.mode {
        StoppingMode::Loop => false,
        StoppingMode::While => {
            meta.raw_count >= options.stop_raw_threshold || cumulative_included >= options.stop_included_threshold
        }
    }
}

/// Drive rounds 1..=max_rounds until `should_stop` fires, then write
/// the union of every round's (plus the base Review's) `include`
/// verdicts to `final_included.{json,csv}`.
pub async fn run(
    services: &Services,
    layout: &WorkspaceLayout,
    criteria: &CriteriaDocument,
    options: &SnowballIterateOptions,
) -> AppResult<Vec<RoundMeta>> {
    let mut metas = Vec::new();
    let mut cumulative_included = 0usize;
    let mut round_index = 1u32;

    loop {
        let meta = run_round(services, layout, criteria, &options.round, round_index).await?;
        cumulative_included += meta.review_outcome.include;
        let stop = should_stop(options, &meta, cumulative_included);
        metas.push(meta);
        if stop {
            break;
        }
        round_index += 1;
    }

    write_final_included(layout, round_index)?;
    Ok(metas)
}

fn write_final_included(layout: &WorkspaceLayout, last_round: u32) -> AppResult<()> {
    let mut seen = HashSet::new();
    let mut included = Vec::new();

    if let Ok(bytes) = std::fs::read(layout.review_latte_results_json()) {
        let results: Vec<crate::models::ReviewResult> = serde_json::from_slice(&bytes)?;
        for result in results {
            if result.final_verdict == Verdict::Include && seen.insert(canonical_key(&result.metadata)) {
                included.push(result.metadata);
            }
        }
    }
    for round in 1..=last_round {
        if let Ok(bytes) = std::fs::read(layout.round_latte_review_results_json(round)) {
            let results: Vec<crate::models::ReviewResult> = serde_json::from_slice(&bytes)?;
            for result in results {
                if result.final_verdict == Verdict::Include && seen.insert(canonical_key(&result.metadata)) {
                    included.push(result.metadata);
                }
            }
        }
    }

    write_json_atomic(&layout.final_included_json(), &included)?;
    write_csv_atomic(
        &layout.final_included_csv(),
        &included.iter().map(FinalIncludedRow::from).collect::<Vec<_>>(),
    )?;
    Ok(())
}

pub async fn run_stage(
    services: &Services,
    layout: &WorkspaceLayout,
    criteria: &CriteriaDocument,
    options: &SnowballIterateOptions,
    force: bool,
) -> crate::pipeline::runner::StageResult {
    crate::pipeline::runner::run_stage("snowball-iterate", &layout.final_included_json(), force, || async {
        let metas = run(services, layout, criteria, options).await?;
        let mut metrics = std::collections::BTreeMap::new();
        metrics.insert("rounds_run".to_string(), metas.len().to_string());
        metrics.insert(
            "cumulative_included".to_string(),
            metas.iter().map(|m| m.review_outcome.include).sum::<usize>().to_string(),
        );
        let outputs: Vec<PathBuf> = vec![layout.final_included_json(), layout.final_included_csv()];
        Ok((outputs, metrics))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewOutcome;
    use chrono::Local;

    fn meta(round_index: u32, raw_count: usize, include: usize) -> RoundMeta {
        RoundMeta {
            round_index,
            seed_count: 1,
            raw_count,
            filtered_count: raw_count,
            dedup_removed: 0,
            for_review_count: raw_count,
            review_outcome: ReviewOutcome { include, exclude: 0, discard: 0, needs_eval: 0 },
            started_at: Local::now(),
            finished_at: Local::now(),
            criteria_hash: "hash".to_string(),
        }
    }

    #[test]
    fn test_loop_mode_stops_only_at_max_rounds() {
        let options = SnowballIterateOptions { mode: StoppingMode::Loop, max_rounds: 3, ..Default::default() };
        assert!(!should_stop(&options, &meta(1, 1000, 1000), 1000));
        assert!(!should_stop(&options, &meta(2, 1000, 2000), 2000));
        assert!(should_stop(&options, &meta(3, 1000, 3000), 3000));
    }

    #[test]
    fn test_while_mode_stops_on_raw_threshold() {
        let options = SnowballIterateOptions {
            mode: StoppingMode::While,
            max_rounds: 10,
            stop_raw_threshold: 200,
            stop_included_threshold: 999,
            ..Default::default()
        };
        assert!(!should_stop(&options, &meta(1, 50, 10), 10));
        assert!(!should_stop(&options, &meta(2, 90, 20), 30));
        assert!(should_stop(&options, &meta(3, 220, 5), 35));
    }

    #[test]
    fn test_while_mode_stops_on_included_threshold() {
        let options = SnowballIterateOptions {
            mode: StoppingMode::While,
            max_rounds: 10,
            stop_raw_threshold: 99999,
            stop_included_threshold: 50,
            ..Default::default()
        };
        assert!(!should_stop(&options, &meta(1, 10, 20), 20));
        assert!(should_stop(&options, &meta(2, 10, 40), 60));
    }

    #[test]
    fn test_while_mode_always_bounded_by_max_rounds() {
        let options = SnowballIterateOptions {
            mode: StoppingMode::While,
            max_rounds: 2,
            stop_raw_threshold: 99999,
            stop_included_threshold: 99999,
            ..Default::default()
        };
        assert!(!should_stop(&options, &meta(1, 10, 5), 5));
        assert!(should_stop(&options, &meta(2, 10, 5), 10));
    }
}
