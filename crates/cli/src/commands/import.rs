//! Import command handler.
//!
//! Embeds passages from a JSONL file and writes them to the passage store.
//! Each line is `{"text", "party", "docId", "position", "fileName"?}`.

use clap::Args;
use planes_core::{config::AppConfig, AppError, AppResult};
use planes_knowledge::import::DEFAULT_BATCH_SIZE;
use planes_knowledge::{create_provider, import_jsonl, load_catalog, open_store};
use std::path::PathBuf;

/// Embed and store passages from a JSONL file
#[derive(Args, Debug)]
pub struct ImportCommand {
    /// JSONL file with one passage per line
    pub file: PathBuf,

    /// Passages embedded per request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ImportCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing import command");
        tracing::debug!("Import options: {:?}", self);

        if !self.file.exists() {
            return Err(AppError::InvalidInput(format!(
                "Import file does not exist: {:?}",
                self.file
            )));
        }

        let catalog = load_catalog(config)?;
        let embedder = create_provider(&config.embedding)?;
        let store = open_store(config).await?;

        let stats = import_jsonl(
            &self.file,
            &catalog,
            embedder.as_ref(),
            store.as_ref(),
            self.batch_size,
        )
        .await?;

        if self.json {
            let json = serde_json::to_string_pretty(&stats)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            println!("Read:                    {}", stats.read);
            println!("Imported:                {}", stats.imported);
            println!("Skipped (unknown party): {}", stats.skipped_unknown_party);
            println!("Skipped (invalid):       {}", stats.skipped_invalid);
        }

        Ok(())
    }
}
