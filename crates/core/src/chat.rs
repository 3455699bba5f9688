use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embeddings::EmbeddingBackend;
use crate::error::{ConfigError, GenerationError};
use crate::generation::{GenerationBackend, GenerationRequest, TokenStream};
use crate::models::{ChatTurn, RetrievalSettings, ScoredChunk};
use crate::retriever::HybridRetriever;
use crate::traits::ChunkIndex;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for a private document library. Ground your answers \
     in the provided document excerpts when they are relevant, and say plainly when \
     the library does not cover the question.";

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: Uuid,
    pub history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChatEngine<S, E, G> {
    retriever: HybridRetriever<S, E>,
    generator: G,
    system_prompt: String,
    read_timeout: Duration,
}

impl<S, E, G> ChatEngine<S, E, G>
where
    S: ChunkIndex,
    E: EmbeddingBackend,
    G: GenerationBackend,
{
    pub fn new(retriever: HybridRetriever<S, E>, generator: G) -> Self {
        Self {
            retriever,
            generator,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Runs one turn. Failures past validation never lose the user's turn.
    pub async fn send<'a>(
        &self,
        session: &'a mut ChatSession,
        prompt: &str,
        settings: &RetrievalSettings,
    ) -> Result<ResponseStream<'a>, ConfigError> {
        settings.validate()?;

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "prompt",
                details: "must not be empty".to_string(),
            });
        }

        session.history.push(ChatTurn::user(prompt));

        let context = match self.retriever.retrieve(prompt, settings).await {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(reason = %error, "retrieval failed, answering without context");
                Vec::new()
            }
        };

        let request = GenerationRequest {
            system: compose_system_prompt(&self.system_prompt, &context),
            turns: session.history.clone(),
            temperature: settings.temperature,
            think: settings.show_reasoning,
        };

        info!(
            session = %session.id,
            context_chunks = context.len(),
            "starting generation turn"
        );

        let mut fault = None;
        let tokens = match self.generator.start_generation(request).await {
            Ok(stream) => Some(stream),
            Err(error) => {
                warn!(reason = %error, "generation backend unavailable");
                fault = Some(GenerationError::Unavailable(error));
                None
            }
        };

        Ok(ResponseStream {
            history: &mut session.history,
            tokens,
            read_timeout: self.read_timeout,
            buffer: String::new(),
            truncated: false,
            fault,
            appended: false,
        })
    }
}

fn compose_system_prompt(base: &str, context: &[ScoredChunk]) -> String {
    if context.is_empty() {
        return base.to_string();
    }

    let mut prompt = String::from(base);
    prompt.push_str("\n\nExcerpts from the document library:\n");
    for chunk in context {
        prompt.push_str(&format!(
            "\n[source: {}]\n{}\n",
            chunk.document_name, chunk.text
        ));
    }
    prompt
}

/// However the turn ends, the accumulated text lands in history exactly once.
pub struct ResponseStream<'a> {
    history: &'a mut Vec<ChatTurn>,
    tokens: Option<Box<dyn TokenStream>>,
    read_timeout: Duration,
    buffer: String,
    truncated: bool,
    fault: Option<GenerationError>,
    appended: bool,
}

impl ResponseStream<'_> {
    pub async fn next_fragment(&mut self) -> Result<Option<String>, GenerationError> {
        if self.appended {
            return Ok(None);
        }

        if let Some(fault) = self.fault.take() {
            self.finish();
            return Err(fault);
        }

        let tokens = match self.tokens.as_mut() {
            Some(tokens) => tokens,
            None => {
                self.finish();
                return Ok(None);
            }
        };

        match timeout(self.read_timeout, tokens.next_fragment()).await {
            Ok(Ok(Some(fragment))) => {
                self.buffer.push_str(&fragment);
                Ok(Some(fragment))
            }
            Ok(Ok(None)) => {
                self.finish();
                Ok(None)
            }
            Ok(Err(error)) => {
                self.truncated = true;
                self.finish();
                Err(error)
            }
            Err(_) => {
                self.truncated = true;
                let waited = self.read_timeout;
                self.finish();
                Err(GenerationError::Timeout { waited })
            }
        }
    }

    pub fn response_text(&self) -> &str {
        &self.buffer
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn finish(&mut self) {
        if self.appended {
            return;
        }
        self.appended = true;
        self.tokens = None;
        self.history.push(ChatTurn::assistant(self.buffer.clone()));
    }
}

impl Drop for ResponseStream<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
