//! Prompts command handler.
//!
//! Lists the prompt definitions the pipeline will use, marking workspace
//! overrides and reporting overrides that fail to load.

use clap::Args;
use planes_core::{config::AppConfig, AppError, AppResult};
use planes_prompt::{is_overridden, list_prompts, load_prompt};

/// List built-in prompts and workspace overrides
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PromptsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing prompts command");

        let mut entries = Vec::new();
        for id in list_prompts(&config.workspace)? {
            let source = if is_overridden(&config.workspace, &id) {
                "override"
            } else {
                "built-in"
            };
            let (title, error) = match load_prompt(&config.workspace, &id) {
                Ok(definition) => (Some(definition.title), None),
                Err(e) => {
                    tracing::warn!(prompt = %id, "Prompt failed to load: {}", e);
                    (None, Some(e.to_string()))
                }
            };
            entries.push(serde_json::json!({
                "id": id,
                "source": source,
                "title": title,
                "error": error,
            }));
        }

        if self.json {
            let json = serde_json::to_string_pretty(&entries)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        for entry in &entries {
            let detail = entry["title"]
                .as_str()
                .map(str::to_string)
                .or_else(|| entry["error"].as_str().map(|e| format!("error: {}", e)))
                .unwrap_or_default();
            println!(
                "{:<18} {:<9} {}",
                entry["id"].as_str().unwrap_or_default(),
                entry["source"].as_str().unwrap_or_default(),
                detail
            );
        }

        Ok(())
    }
}
