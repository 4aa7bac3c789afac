//! Passage import from pre-chunked JSONL files.
//!
//! One passage per line: `{"text", "party", "docId", "position", "fileName"?}`.

use crate::catalog::PartyCatalog;
use crate::embeddings::EmbeddingProvider;
use crate::store::PassageStore;
use crate::types::{EmbeddedPassage, PassageRecord};
use planes_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Default number of passages embedded per request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Counts from one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    /// Non-empty lines read
    pub read: usize,
    pub imported: usize,
    /// Lines whose party is not in the catalog
    pub skipped_unknown_party: usize,
    /// Lines that failed to parse or had empty text
    pub skipped_invalid: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PassageInput {
    text: String,
    party: String,
    doc_id: String,
    position: u32,
    #[serde(default)]
    file_name: Option<String>,
}

/// Parse JSONL passages, normalizing party codes against the catalog.
pub fn parse_jsonl<R: BufRead>(
    reader: R,
    catalog: &PartyCatalog,
) -> AppResult<(Vec<PassageRecord>, ImportStats)> {
    let mut stats = ImportStats::default();
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            AppError::Knowledge(format!("Failed to read line {}: {}", line_num + 1, e))
        })?;
        if line.trim().is_empty() {
            continue;
        }
        stats.read += 1;

        let input: PassageInput = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", line_num + 1, e);
                stats.skipped_invalid += 1;
                continue;
            }
        };

        if input.text.trim().is_empty() {
            stats.skipped_invalid += 1;
            continue;
        }

        let Some(party) = catalog.normalize(&input.party) else {
            tracing::warn!(
                "Skipping line {}: unknown party '{}'",
                line_num + 1,
                input.party
            );
            stats.skipped_unknown_party += 1;
            continue;
        };

        records.push(PassageRecord {
            text: input.text,
            party: party.to_string(),
            doc_id: input.doc_id,
            position: input.position,
            file_name: input.file_name,
        });
    }

    Ok((records, stats))
}

/// Embed and upsert every valid passage of a JSONL file.
pub async fn import_jsonl(
    path: &Path,
    catalog: &PartyCatalog,
    embedder: &dyn EmbeddingProvider,
    store: &dyn PassageStore,
    batch_size: usize,
) -> AppResult<ImportStats> {
    let file = File::open(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to open {:?}: {}", path, e)))?;
    let (records, mut stats) = parse_jsonl(BufReader::new(file), catalog)?;

    tracing::info!(
        passages = records.len(),
        embedder = embedder.provider_name(),
        store = store.backend_name(),
        "Importing passages from {:?}",
        path
    );

    for batch in records.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(AppError::Knowledge(format!(
                "Embedding provider returned {} vectors for {} passages",
                embeddings.len(),
                batch.len()
            )));
        }

        let passages: Vec<EmbeddedPassage> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(record, embedding)| EmbeddedPassage { record, embedding })
            .collect();

        stats.imported += store.upsert(&passages).await?;
        tracing::debug!(imported = stats.imported, "Imported batch");
    }

    Ok(stats)
}
