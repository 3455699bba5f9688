use async_trait::async_trait;

use crate::error::{GenerationError, ModelUnavailableError};
use crate::models::ChatTurn;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub think: bool,
}

/// Pull-based fragment sequence; `Ok(None)` once the backend reports completion.
#[async_trait]
pub trait TokenStream: Send {
    async fn next_fragment(&mut self) -> Result<Option<String>, GenerationError>;
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// An unreachable backend fails here; mid-stream trouble surfaces
    /// through the returned stream.
    async fn start_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<Box<dyn TokenStream>, ModelUnavailableError>;
}
