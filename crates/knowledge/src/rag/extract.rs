//! Party extraction.

use crate::catalog::PartyCatalog;
use crate::rag::{complete_within, strip_code_fence};
use crate::types::Question;
use planes_core::logging::preview_for_log;
use planes_core::AppResult;
use planes_llm::{LlmClient, LlmRequest};
use planes_prompt::{build_prompt, PromptDefinition};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Extracts the catalog parties a question refers to. Never fails: any problem yields an empty set.
pub struct PartyExtractor {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    catalog: Arc<PartyCatalog>,
    timeout: Duration,
}

impl PartyExtractor {
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

    #[tracing::instrument(name = "extract_parties", skip_all)]
    pub async fn extract(&self, question: &Question) -> BTreeSet<String> {
        match self.request_parties(question).await {
            Ok(parties) => {
                tracing::info!(parties = ?parties, "Extracted parties");
                parties
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), "Party extraction failed: {}", e);
                BTreeSet::new()
            }
        }
    }

    async fn request_parties(&self, question: &Question) -> AppResult<BTreeSet<String>> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.as_str().to_string());
        variables.insert("parties".to_string(), self.catalog.prompt_listing());

        let built = build_prompt(&self.prompt, &variables)?;
        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(0.0)
            .with_max_tokens(100)
            .with_schema(parties_schema(&self.catalog));
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let raw = complete_within(self.llm.as_ref(), &request, self.timeout, "party extraction")
            .await?;
        tracing::debug!(raw = %preview_for_log(&raw, 80), "Extractor output");

        Ok(parse_party_codes(&raw, &self.catalog))
    }
}

/// Output schema: `{"parties": [...]}` restricted to catalog codes.
pub fn parties_schema(catalog: &PartyCatalog) -> serde_json::Value {
    let codes: Vec<&str> = catalog.codes().collect();
    serde_json::json!({
        "type": "object",
        "properties": {
            "parties": {
                "type": "array",
                "items": { "type": "string", "enum": codes }
            }
        },
        "required": ["parties"],
        "additionalProperties": false
    })
}

/// Lenient parse of extractor output into catalog codes.
///
/// Accepts a JSON array, `{"parties": [...]}`, a comma list or `NINGUNO`.
/// Unknown codes are dropped.
pub fn parse_party_codes(raw: &str, catalog: &PartyCatalog) -> BTreeSet<String> {
    let raw = strip_code_fence(raw);

    let candidates: Vec<String> = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => strings(&items),
        Ok(serde_json::Value::Object(map)) => map
            .get("parties")
            .and_then(|v| v.as_array())
            .map(|items| strings(items))
            .unwrap_or_default(),
        Ok(serde_json::Value::String(value)) => split_list(&value),
        _ => split_list(raw),
    };

    candidates
        .iter()
        .filter_map(|code| catalog.normalize(code))
        .map(str::to_string)
        .collect()
}

fn strings(items: &[serde_json::Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    if value.trim().eq_ignore_ascii_case("ninguno") {
        return Vec::new();
    }
    value
        .split(|c: char| c == ',' || c == '\n' || c == ';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
