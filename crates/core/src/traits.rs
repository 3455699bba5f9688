use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::models::{BulkReport, ChunkRecord, RetrievalQuery, ScoredChunk};

/// The chunk index as the rest of the crate sees it.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Creates the index when missing; an existing index is left untouched.
    async fn ensure_index(&self) -> Result<(), IndexError>;

    /// Per-record rejections land in the report, never abort the batch.
    async fn bulk_upsert(&self, records: &[ChunkRecord]) -> Result<BulkReport, IndexError>;

    /// Returns how many chunks were removed; zero is a valid outcome.
    async fn delete_by_document_name(&self, document_name: &str) -> Result<u64, IndexError>;

    async fn list_document_names(&self) -> Result<BTreeSet<String>, IndexError>;

    /// Hits come back in backend rank order.
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<ScoredChunk>, IndexError>;
}
