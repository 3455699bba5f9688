use async_trait::async_trait;

use crate::error::ModelUnavailableError;

/// One vector per input, in input order, of the fixed deployment dimension.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelUnavailableError>;
}
