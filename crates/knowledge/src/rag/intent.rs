//! Intent classification.

use crate::catalog::PartyCatalog;
use crate::rag::{complete_within, strip_code_fence};
use crate::types::{History, Intent, Question};
use planes_core::logging::preview_for_log;
use planes_core::AppResult;
use planes_llm::{LlmClient, LlmRequest};
use planes_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Classifies a question into one `Intent`. Never fails: any problem yields `Unclear`.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    catalog: Arc<PartyCatalog>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        prompt: PromptDefinition,
        catalog: Arc<PartyCatalog>,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
            catalog,
            timeout,
        }
    }

    #[tracing::instrument(name = "classify_intent", skip_all)]
    pub async fn classify(&self, question: &Question, history: &History) -> Intent {
        let intent = match self.request_intent(question, history).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                tracing::warn!("Classifier returned an unknown intent, using unclear");
                Intent::Unclear
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), "Intent classification failed: {}", e);
                Intent::Unclear
            }
        };

        let intent = self.apply_comparison_guard(question, intent);
        tracing::info!(intent = %intent, "Classified question");
        intent
    }

    async fn request_intent(
        &self,
        question: &Question,
        history: &History,
    ) -> AppResult<Option<Intent>> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.as_str().to_string());
        if let Some(rendered) = history.render() {
            variables.insert("history".to_string(), rendered);
        }

        let built = build_prompt(&self.prompt, &variables)?;
        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(0.0)
            .with_max_tokens(50)
            .with_schema(intent_schema());
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let raw = complete_within(self.llm.as_ref(), &request, self.timeout, "intent classification")
            .await?;
        tracing::debug!(raw = %preview_for_log(&raw, 80), "Classifier output");

        Ok(parse_intent(&raw))
    }

    /// A general-plan verdict naming several parties is a comparison.
    fn apply_comparison_guard(&self, question: &Question, intent: Intent) -> Intent {
        if intent == Intent::PartyGeneralPlan && self.catalog.mentions(question.as_str()).len() >= 2
        {
            tracing::debug!("Several parties named, reclassifying as general_comparison");
            return Intent::GeneralComparison;
        }
        intent
    }
}

/// Output schema: an object with one `intent` field from the closed set.
pub fn intent_schema() -> serde_json::Value {
    let names: Vec<&str> = Intent::ALL.iter().map(|i| i.as_str()).collect();
    serde_json::json!({
        "type": "object",
        "properties": {
            "intent": { "type": "string", "enum": names }
        },
        "required": ["intent"],
        "additionalProperties": false
    })
}

/// Accepts `{"intent": "..."}`, a JSON string, or the bare name.
pub fn parse_intent(raw: &str) -> Option<Intent> {
    let raw = strip_code_fence(raw);
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .get("intent")
            .and_then(|v| v.as_str())
            .and_then(Intent::parse),
        Ok(serde_json::Value::String(value)) => Intent::parse(&value),
        _ => Intent::parse(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intent_variants() {
        assert_eq!(parse_intent(r#"{"intent": "specific_party"}"#), Some(Intent::SpecificParty));
        assert_eq!(parse_intent("\"metadata_query\""), Some(Intent::MetadataQuery));
        assert_eq!(parse_intent("general_comparison\n"), Some(Intent::GeneralComparison));
        assert_eq!(
            parse_intent("```json\n{\"intent\":\"party_general_plan\"}\n```"),
            Some(Intent::PartyGeneralPlan)
        );
        assert_eq!(parse_intent(r#"{"intent": "opinion"}"#), None);
        assert_eq!(parse_intent(r#"{"other": "unclear"}"#), None);
    }

    #[test]
    fn test_schema_lists_all_intents() {
        let schema = intent_schema();
        let values = schema["properties"]["intent"]["enum"].as_array().unwrap();
        assert_eq!(values.len(), Intent::ALL.len());
        assert_eq!(schema["additionalProperties"], false);
    }
}
