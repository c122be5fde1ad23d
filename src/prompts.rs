//! Prompt templates and the `<<placeholder>>` rendering protocol.
//!
//! Bodies are opaque, named strings per the purpose statement; this
//! module formalizes how placeholders inside them are filled (design
//! notes §9): a `TemplateRenderer` takes a template and a name->value
//! map and errors on unused-required or unknown placeholders, rather
//! than silently leaving `<<placeholder>>` tokens in the rendered text.

use crate::shared::errors::{AppError, AppResult};
use std::collections::BTreeMap;

/// Fills `<<name>>` placeholders in a template string.
pub struct TemplateRenderer;

impl TemplateRenderer {
    /// Render `template`, substituting every `<<key>>` occurrence with
    /// `values[key]`. Errors if the template references a placeholder
    /// absent from `values`, or if `values` supplies a key the template
    /// never references (both directions of drift are caught).
    pub fn render(template: &str, values: &BTreeMap<String, String>) -> AppResult<String> {
        let re = regex::Regex::new(r"<<([a-zA-Z0-9_]+)>>").unwrap();
        let mut used = std::collections::HashSet::new();
        let mut missing = Vec::new();

        let rendered = re.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            used.insert(key.to_string());
            match values.get(key) {
                Some(v) => v.clone(),
                None => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        });

        if !missing.is_empty() {
            return Err(AppError::ValidationError(format!(
                "template references unknown placeholders: {}",
                missing.join(", ")
            )));
        }

        let unused: Vec<&String> = values.keys().filter(|k| !used.contains(*k)).collect();
        if !unused.is_empty() {
            return Err(AppError::ValidationError(format!(
                "unused required placeholder values: {:?}",
                unused
            )));
        }

        Ok(rendered.to_string())
    }
}

/// Named prompt bodies. Text content is a stand-in for the real,
/// externally-authored prompts (out of scope per the purpose
/// statement); only the placeholder names and call sites matter.
pub struct PromptTemplates;

impl PromptTemplates {
    pub fn seed_rewrite() -> &'static str {
        "Given the research topic <<topic>>, and the following prior \
         attempts that returned no usable candidates:\n<<history>>\n\
         Propose 1-3 short English noun phrases that better capture the \
         topic without repeating any prior attempt."
    }

    pub fn filter_seed_strict() -> &'static str {
        "Topic: <<topic>>\nTitle: <<title>>\nAbstract: <<abstract>>\n\
         <<keywords_hint>>\nDoes this paper survey the topic above? \
         Respond with strict JSON: {\"decision\": \"yes\"|\"no\", \
         \"reason\": string, \"confidence\": float}."
    }

    pub fn filter_seed_lenient() -> &'static str {
        "Topic: <<topic>>\nTitle: <<title>>\nAbstract: <<abstract>>\n\
         <<keywords_hint>>\nDoes this paper relate to the topic above, \
         even if it is not itself a survey? Respond with strict JSON: \
         {\"decision\": \"yes\"|\"no\", \"reason\": string, \
         \"confidence\": float}."
    }

    pub fn generate_search_terms() -> &'static str {
        "Topic hint: <<topic_hint>>\nAnchor variants: <<anchor_variants>>\n\
         Categories: <<category_list>>\nMetadata: <<metadata_block>>\n\
         Extract anchor_terms and categorized search_terms as strict \
         JSON."
    }

    pub fn aggregate_search_terms() -> &'static str {
        "Merge the following partial keyword extractions into one \
         consistent payload:\n<<partial_payloads>>"
    }

    pub fn criteria_research() -> &'static str {
        "Research the inclusion/exclusion boundary for systematic \
         literature reviews on <<topic>>. Recency hint: <<recency_hint>>. \
         <<background>>\nProduce free-text research notes."
    }

    pub fn criteria_format() -> &'static str {
        "Given these research notes:\n<<notes>>\nFormat strict JSON \
         matching the CriteriaDocument schema. required[0] of \
         inclusion_criteria must quote the topic_definition verbatim. \
         Do not include time-based or literal title-match clauses."
    }

    pub fn junior_review() -> &'static str {
        "Topic definition: <<topic_definition>>\nInclusion criteria: \
         <<inclusion_criteria>>\nExclusion criteria: <<exclusion_criteria>>\n\
         Title: <<title>>\nAbstract: <<abstract>>\nEvaluate 1-5 and \
         explain. Respond with strict JSON: {\"evaluation\": int, \
         \"reasoning\": string}."
    }

    pub fn senior_review() -> &'static str {
        "Two junior reviewers disagreed or were both uncertain on this \
         paper.\nTopic definition: <<topic_definition>>\nInclusion \
         criteria: <<inclusion_criteria>>\nExclusion criteria: \
         <<exclusion_criteria>>\nTitle: <<title>>\nAbstract: <<abstract>>\n\
         Junior A: <<junior_a_reasoning>>\nJunior B: <<junior_b_reasoning>>\n\
         Evaluate 1-5 and explain. Respond with strict JSON: \
         {\"evaluation\": int, \"reasoning\": string}."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholder() {
        let mut values = BTreeMap::new();
        values.insert("topic".to_string(), "diffusion models".to_string());
        let rendered = TemplateRenderer::render("Topic: <<topic>>", &values).unwrap();
        assert_eq!(rendered, "Topic: diffusion models");
    }

    #[test]
    fn test_render_errors_on_unknown_placeholder() {
        let values = BTreeMap::new();
        let err = TemplateRenderer::render("Topic: <<topic>>", &values);
        assert!(err.is_err());
    }

    #[test]
    fn test_render_errors_on_unused_value() {
        let mut values = BTreeMap::new();
        values.insert("topic".to_string(), "x".to_string());
        values.insert("unused".to_string(), "y".to_string());
        let err = TemplateRenderer::render("Topic: <<topic>>", &values);
        assert!(err.is_err());
    }

    #[test]
    fn test_seed_rewrite_prompt_requires_history_placeholder() {
        assert!(PromptTemplates::seed_rewrite().contains("<<history>>"));
    }
}
