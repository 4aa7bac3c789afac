//! LanceDB-backed passage store.

use crate::store::{cosine_similarity, PartyFilter, PassageStore};
use crate::types::{EmbeddedPassage, Passage, PassageRecord};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use planes_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Passage store persisted in a LanceDB table.
pub struct LanceDbStore {
    table: Table,
    embedding_dim: usize,
}

impl LanceDbStore {
    /// Open the table at `db_path`, creating the database and table if missing.
    pub async fn open(db_path: &Path, table_name: &str, embedding_dim: usize) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create store directory: {}", e))
            })?;
        }

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.iter().any(|name| name == table_name) {
            conn.open_table(table_name)
                .execute()
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to open table: {}", e)))?
        } else {
            let schema = Self::create_schema(embedding_dim);
            let empty_batch = RecordBatch::new_empty(schema.clone());

            conn.create_table(
                table_name,
                RecordBatchIterator::new(vec![Ok(empty_batch)], schema),
            )
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to create table: {}", e)))?
        };

        tracing::debug!(table = table_name, "Opened LanceDB store at {:?}", db_path);

        Ok(Self {
            table,
            embedding_dim,
        })
    }

    fn create_schema(embedding_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("position", DataType::UInt32, false),
            Field::new("party", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("file_name", DataType::Utf8, true),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    embedding_dim as i32,
                ),
                false,
            ),
        ]))
    }

    fn check_dimension(&self, embedding: &[f32]) -> AppResult<()> {
        if embedding.len() != self.embedding_dim {
            return Err(AppError::Knowledge(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.embedding_dim,
                embedding.len()
            )));
        }
        Ok(())
    }

    /// Convert passages to a single Arrow RecordBatch.
    fn passages_to_batch(&self, passages: &[EmbeddedPassage]) -> AppResult<RecordBatch> {
        let schema = Self::create_schema(self.embedding_dim);

        let mut values = Vec::with_capacity(passages.len() * self.embedding_dim);
        for passage in passages {
            self.check_dimension(&passage.embedding)?;
            values.extend_from_slice(&passage.embedding);
        }

        let records = passages.iter().map(|p| &p.record);
        let doc_ids = StringArray::from_iter_values(records.clone().map(|r| r.doc_id.as_str()));
        let positions = UInt32Array::from_iter_values(records.clone().map(|r| r.position));
        let parties = StringArray::from_iter_values(records.clone().map(|r| r.party.as_str()));
        let texts = StringArray::from_iter_values(records.clone().map(|r| r.text.as_str()));
        let file_names: StringArray = records.map(|r| r.file_name.as_deref()).collect();

        let embeddings = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.embedding_dim as i32,
            Arc::new(Float32Array::from(values)),
            None,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to build embedding column: {}", e)))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(doc_ids),
                Arc::new(positions),
                Arc::new(parties),
                Arc::new(texts),
                Arc::new(file_names),
                Arc::new(embeddings),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create RecordBatch: {}", e)))
    }

    /// Read one row back as a record plus its stored embedding.
    fn row_to_record(batch: &RecordBatch, row: usize) -> AppResult<(PassageRecord, Vec<f32>)> {
        let position = batch
            .column_by_name("position")
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
            .ok_or_else(|| AppError::Knowledge("Invalid position column".to_string()))?
            .value(row);

        let file_names = string_column(batch, "file_name")?;
        let file_name = (!file_names.is_null(row)).then(|| file_names.value(row).to_string());

        let embedding_list = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| AppError::Knowledge("Invalid embedding column".to_string()))?;
        let embedding_ref = embedding_list.value(row);
        let embedding = embedding_ref
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::Knowledge("Invalid embedding values".to_string()))?
            .values()
            .to_vec();

        let record = PassageRecord {
            text: string_column(batch, "text")?.value(row).to_string(),
            party: string_column(batch, "party")?.value(row).to_string(),
            doc_id: string_column(batch, "doc_id")?.value(row).to_string(),
            position,
            file_name,
        };

        Ok((record, embedding))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
}

/// Predicate matching every `(doc_id, position)` key of the given passages.
fn key_predicate(passages: &[EmbeddedPassage]) -> String {
    let mut by_doc: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for passage in passages {
        by_doc
            .entry(passage.record.doc_id.as_str())
            .or_default()
            .push(passage.record.position);
    }

    by_doc
        .into_iter()
        .map(|(doc_id, positions)| {
            let positions: Vec<String> = positions.iter().map(|p| p.to_string()).collect();
            format!(
                "(doc_id = '{}' AND position IN ({}))",
                doc_id.replace('\'', "''"),
                positions.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait::async_trait]
impl PassageStore for LanceDbStore {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&PartyFilter>,
        limit: usize,
    ) -> AppResult<Vec<Passage>> {
        self.check_dimension(embedding)?;

        let mut query = self
            .table
            .query()
            .nearest_to(embedding.to_vec())
            .map_err(|e| AppError::Retrieval(format!("Failed to create query: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(filter) = filter {
            query = query.only_if(filter.to_sql());
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to collect results: {}", e)))?;

        let mut passages = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                match Self::row_to_record(batch, row) {
                    Ok((record, stored)) => {
                        let score = cosine_similarity(embedding, &stored);
                        passages.push(record.into_passage(score));
                    }
                    Err(e) => tracing::warn!("Skipping unreadable row {}: {}", row, e),
                }
            }
        }

        passages.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.position.cmp(&b.position))
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        passages.truncate(limit);

        tracing::debug!(
            results = passages.len(),
            limit,
            filtered = filter.is_some(),
            "LanceDB search complete"
        );

        Ok(passages)
    }

    async fn upsert(&self, passages: &[EmbeddedPassage]) -> AppResult<usize> {
        if passages.is_empty() {
            return Ok(0);
        }

        let batch = self.passages_to_batch(passages)?;

        self.table
            .delete(&key_predicate(passages))
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to replace passages: {}", e)))?;

        let schema = batch.schema();
        self.table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to add passages: {}", e)))?;

        tracing::debug!("Upserted {} passages into LanceDB", passages.len());
        Ok(passages.len())
    }

    async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))
    }
}
