//! The two-round LatteReview workflow: two independent junior reviewers
//! in round A, a conditional senior reviewer in round B, and pure
//! verdict-derivation functions so the "derivation is a pure function of
//! (junior_A, junior_B, senior?)" property has one directly-testable
//! implementation site.

use crate::models::{CriteriaDocument, Paper, ReviewResult, ReviewerEvaluation, Verdict};
use crate::prompts::{PromptTemplates, TemplateRenderer};
use crate::services::chat::{ChatConfig, ChatService, Message};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::retry::{retry_with_policy, RetryPolicy};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named reviewer: which `ChatService` + model it speaks through.
pub struct Reviewer {
    pub name: String,
    pub chat: Arc<dyn ChatService>,
    pub model: String,
}

impl Reviewer {
    pub fn new(name: impl Into<String>, chat: Arc<dyn ChatService>, model: impl Into<String>) -> Self {
        Self { name: name.into(), chat, model: model.into() }
    }

    async fn evaluate(&self, template: &'static str, values: &BTreeMap<String, String>) -> AppResult<ReviewerEvaluation> {
        let prompt = TemplateRenderer::render(template, values)?;
        let messages = vec![Message::user(prompt)];
        let config = ChatConfig { model: self.model.clone(), ..ChatConfig::default() };

        let policy = RetryPolicy::default_external();
        let chat = self.chat.clone();
        let value = retry_with_policy(policy, || {
            let chat = chat.clone();
            let messages = messages.clone();
            let config = config.clone();
            async move { chat.complete_json(&messages, &config, &[]).await }
        })
        .await?;

        let evaluation = value
            .get("evaluation")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AppError::ParseError("review response missing evaluation".to_string()))? as i32;
        let reasoning = value.get("reasoning").and_then(|v| v.as_str()).unwrap_or_default().to_string();

        Ok(ReviewerEvaluation { reviewer: self.name.clone(), evaluation, reasoning })
    }
}

fn junior_values(criteria: &CriteriaDocument, paper: &Paper) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    values.insert("topic_definition".to_string(), criteria.topic_definition.clone());
    values.insert("inclusion_criteria".to_string(), format!("{:?}", criteria.inclusion_criteria));
    values.insert("exclusion_criteria".to_string(), format!("{:?}", criteria.exclusion_criteria));
    values.insert("title".to_string(), paper.title.clone());
    values.insert("abstract".to_string(), paper.abstract_text.clone().unwrap_or_default());
    values
}

/// `|eval_A - eval_B| >= 2` OR both scored exactly 3.
pub fn needs_escalation(a: i32, b: i32) -> bool {
    (a - b).abs() >= 2 || (a == 3 && b == 3)
}

/// Verdict thresholds: `>= 4` include, `<= 2` exclude, else
/// needs_reeval. Uses the senior's score when round B ran; otherwise the
/// junior mean, rounded half-up.
pub fn derive_verdict(junior_a: i32, junior_b: i32, senior: Option<i32>) -> (Verdict, String) {
    let (score, derivation) = match senior {
        Some(s) => (s, "senior_override".to_string()),
        None => {
            let mean = (junior_a + junior_b) as f64 / 2.0;
            ((mean + 0.5).floor() as i32, "junior_mean".to_string())
        }
    };

    let verdict = if score >= 4 {
        Verdict::Include
    } else if score <= 2 {
        Verdict::Exclude
    } else {
        Verdict::NeedsReeval
    };
    (verdict, derivation)
}

/// Run the full two-round workflow for one paper: both juniors in
/// parallel, then the senior iff escalation triggers.
pub async fn review_one(
    junior_a: &Reviewer,
    junior_b: &Reviewer,
    senior: &Reviewer,
    criteria: &CriteriaDocument,
    paper: &Paper,
) -> AppResult<ReviewResult> {
    let values = junior_values(criteria, paper);
    let template = PromptTemplates::junior_review();

    let (eval_a, eval_b) = tokio::try_join!(
        junior_a.evaluate(template, &values),
        junior_b.evaluate(template, &values)
    )?;

    let senior_evaluation = if needs_escalation(eval_a.evaluation, eval_b.evaluation) {
        let mut senior_values = values.clone();
        senior_values.insert("junior_a_reasoning".to_string(), eval_a.reasoning.clone());
        senior_values.insert("junior_b_reasoning".to_string(), eval_b.reasoning.clone());
        Some(senior.evaluate(PromptTemplates::senior_review(), &senior_values).await?)
    } else {
        None
    };

    let (final_verdict, derivation) =
        derive_verdict(eval_a.evaluation, eval_b.evaluation, senior_evaluation.as_ref().map(|e| e.evaluation));

    Ok(ReviewResult {
        identifier: paper.arxiv_id.clone().or_else(|| paper.doi.clone()).unwrap_or_else(|| paper.normalized_title()),
        metadata: paper.clone(),
        junior_evaluations: vec![eval_a, eval_b],
        senior_evaluation,
        final_verdict,
        derivation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_escalation_on_large_disagreement() {
        assert!(needs_escalation(5, 2));
        assert!(needs_escalation(1, 4));
    }

    #[test]
    fn test_needs_escalation_on_double_three() {
        assert!(needs_escalation(3, 3));
    }

    #[test]
    fn test_no_escalation_on_close_agreement() {
        assert!(!needs_escalation(4, 5));
        assert!(!needs_escalation(2, 2));
    }

    #[test]
    fn test_derive_verdict_uses_senior_override() {
        let (verdict, derivation) = derive_verdict(5, 1, Some(2));
        assert_eq!(verdict, Verdict::Exclude);
        assert_eq!(derivation, "senior_override");
    }

    #[test]
    fn test_derive_verdict_junior_mean_rounds_half_up() {
        let (verdict, derivation) = derive_verdict(4, 3, None);
        assert_eq!(verdict, Verdict::Include);
        assert_eq!(derivation, "junior_mean");
    }

    #[test]
    fn test_derive_verdict_needs_reeval_midband() {
        let (verdict, _) = derive_verdict(3, 4, None);
        assert_eq!(verdict, Verdict::NeedsReeval);
    }
}
