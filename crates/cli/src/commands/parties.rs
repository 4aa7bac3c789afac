//! Parties command handler.

use clap::Args;
use planes_core::{config::AppConfig, AppError, AppResult};
use planes_knowledge::load_catalog;

/// List the registered parties
#[derive(Args, Debug)]
pub struct PartiesCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PartiesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing parties command");

        let catalog = load_catalog(config)?;

        if self.json {
            let json = serde_json::to_string_pretty(catalog.parties())
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        for party in catalog.parties() {
            println!("{:<6} {} ({})", party.abbreviation, party.name, party.candidate);
        }
        println!();
        println!("{} parties", catalog.len());

        Ok(())
    }
}
