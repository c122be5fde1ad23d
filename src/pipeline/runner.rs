//! The Workspace & Stage Runner: the existence-check / `--force` /
//! atomic-write contract every stage is run through.

use crate::shared::errors::AppError;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    pub outputs: Vec<std::path::PathBuf>,
    pub metrics: BTreeMap<String, String>,
    pub error: Option<(String, String)>,
}

impl StageResult {
    pub fn skipped(stage: &str, outputs: Vec<std::path::PathBuf>) -> Self {
        Self { stage: stage.to_string(), status: StageStatus::Skipped, outputs, metrics: BTreeMap::new(), error: None }
    }

    pub fn completed(stage: &str, outputs: Vec<std::path::PathBuf>, metrics: BTreeMap<String, String>) -> Self {
        Self { stage: stage.to_string(), status: StageStatus::Completed, outputs, metrics, error: None }
    }

    pub fn failed(stage: &str, error: &AppError) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::Failed,
            outputs: Vec::new(),
            metrics: BTreeMap::new(),
            error: Some((error.error_class().to_string(), error.to_string())),
        }
    }

    /// Process exit code contract: 0 for `completed`/`skipped`, non-zero
    /// for `failed`.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            StageStatus::Completed | StageStatus::Skipped => 0,
            StageStatus::Failed => 1,
        }
    }

    /// The user-visible failure line: "{stage}: {error_class}: {cause}".
    pub fn describe(&self) -> String {
        match &self.error {
            Some((class, cause)) => format!("{}: {}: {}", self.stage, class, cause),
            None => format!("{}: {:?}", self.stage, self.status),
        }
    }
}

/// Run `stage_name`'s primary output existence check, `--force`
/// override, and atomic execution in one place so every stage gets the
/// identical idempotence contract.
pub async fn run_stage<F, Fut>(
    stage_name: &str,
    primary_output: &Path,
    force: bool,
    body: F,
) -> StageResult
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(Vec<std::path::PathBuf>, BTreeMap<String, String>), AppError>>,
{
    if primary_output.exists() && !force {
        return StageResult::skipped(stage_name, vec![primary_output.to_path_buf()]);
    }

    match body().await {
        Ok((outputs, metrics)) => StageResult::completed(stage_name, outputs, metrics),
        Err(e) => StageResult::failed(stage_name, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_run_stage_skips_when_output_exists() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        std::fs::write(&output, "{}").unwrap();
        let calls = AtomicU32::new(0);

        let result = run_stage("seed", &output, false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok((vec![], BTreeMap::new())) }
        })
        .await;

        assert_eq!(result.status, StageStatus::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_stage_force_reruns() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        std::fs::write(&output, "{}").unwrap();

        let result = run_stage("seed", &output, true, || async { Ok((vec![output.clone()], BTreeMap::new())) }).await;

        assert_eq!(result.status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_stage_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing.json");

        let result: StageResult = run_stage("seed", &output, false, || async {
            Err(AppError::CutoffRemovedAll)
        })
        .await;

        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.exit_code(), 1);
        assert!(result.describe().contains("CutoffRemovedAll"));
    }
}
