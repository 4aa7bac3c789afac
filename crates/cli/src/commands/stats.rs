//! Stats command handler.
//!
//! Shows what the passage store holds and how the pipeline is configured.

use clap::Args;
use planes_core::{config::AppConfig, AppError, AppResult};
use planes_knowledge::{load_catalog, open_store};

/// Show passage store statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let store = open_store(config).await?;
        let passages = store.count().await?;
        let catalog = load_catalog(config)?;

        if self.json {
            let output = serde_json::json!({
                "store": {
                    "backend": store.backend_name(),
                    "path": config.store_path(),
                    "table": config.store.table,
                    "passages": passages
                },
                "embedding": {
                    "provider": config.embedding.provider,
                    "model": config.embedding.model,
                    "dimensions": config.embedding.dimensions
                },
                "generation": {
                    "provider": config.provider,
                    "model": config.model
                },
                "parties": catalog.len()
            });

            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            println!("Store:      {} ({:?})", store.backend_name(), config.store_path());
            println!("Passages:   {}", passages);
            println!(
                "Embedding:  {} / {} ({} dims)",
                config.embedding.provider, config.embedding.model, config.embedding.dimensions
            );
            println!("Generation: {} / {}", config.provider, config.model);
            println!("Parties:    {}", catalog.len());
        }

        Ok(())
    }
}
