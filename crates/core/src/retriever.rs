use tracing::{debug, warn};

use crate::embeddings::EmbeddingBackend;
use crate::error::RetrievalError;
use crate::models::{RetrievalQuery, RetrievalSettings, ScoredChunk};
use crate::traits::ChunkIndex;

/// Falls back to lexical-only search when embedding is unavailable.
pub struct HybridRetriever<S, E> {
    index: S,
    embedder: Option<E>,
}

impl<S, E> HybridRetriever<S, E>
where
    S: ChunkIndex,
    E: EmbeddingBackend,
{
    pub fn new(index: S, embedder: Option<E>) -> Self {
        Self { index, embedder }
    }

    pub async fn retrieve(
        &self,
        query_text: &str,
        settings: &RetrievalSettings,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        settings.validate()?;

        let text = query_text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let vector = if settings.use_hybrid_search {
            self.query_vector(text).await
        } else {
            None
        };

        let query = RetrievalQuery {
            text: text.to_string(),
            vector,
            k: settings.num_results,
        };

        let mut chunks = self.index.search(&query).await?;
        chunks.truncate(settings.num_results);

        debug!(
            query = %text,
            hybrid = query.vector.is_some(),
            results = chunks.len(),
            "retrieval complete"
        );

        Ok(chunks)
    }

    async fn query_vector(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;

        match embedder.embed(&[text.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => {
                warn!("embedding backend returned no vector, falling back to lexical search");
                None
            }
            Err(error) => {
                warn!(reason = %error, "query embedding failed, falling back to lexical search");
                None
            }
        }
    }
}
