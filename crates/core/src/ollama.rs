use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::embeddings::EmbeddingBackend;
use crate::error::{GenerationError, ModelUnavailableError};
use crate::generation::{GenerationBackend, GenerationRequest, TokenStream};
use crate::models::Role;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// One Ollama server serving both the chat model and the embedding model.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

static SHARED_CLIENT: OnceCell<OllamaClient> = OnceCell::const_new();

// a failed init leaves the slot empty, so the next caller retries
pub async fn shared_client(
    config: &OllamaConfig,
) -> Result<&'static OllamaClient, ModelUnavailableError> {
    SHARED_CLIENT
        .get_or_try_init(|| OllamaClient::connect(config.clone()))
        .await
}

impl OllamaClient {
    pub async fn connect(config: OllamaConfig) -> Result<Self, ModelUnavailableError> {
        url::Url::parse(&config.endpoint).map_err(|error| ModelUnavailableError {
            backend: "ollama",
            endpoint: config.endpoint.clone(),
            reason: format!("endpoint is not a valid url: {error}"),
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| ModelUnavailableError {
                backend: "ollama",
                endpoint: config.endpoint.clone(),
                reason: error.to_string(),
            })?;

        let instance = Self { client, config };
        instance.ensure_model(&instance.config.chat_model).await?;
        instance
            .ensure_model(&instance.config.embedding_model)
            .await?;
        instance.verify_embedding_dimension().await?;

        Ok(instance)
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn unavailable(&self, backend: &'static str, reason: String) -> ModelUnavailableError {
        ModelUnavailableError {
            backend,
            endpoint: self.config.endpoint.clone(),
            reason,
        }
    }

    async fn ensure_model(&self, model: &str) -> Result<(), ModelUnavailableError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.endpoint))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|error| self.unavailable("ollama", error.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(
                "ollama",
                format!("listing models returned {}", response.status()),
            ));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|error| self.unavailable("ollama", error.to_string()))?;

        if tags.models.iter().any(|tag| model_matches(&tag.name, model)) {
            return Ok(());
        }

        info!(model, "model not present on the server, pulling");

        let response = self
            .client
            .post(format!("{}/api/pull", self.config.endpoint))
            .json(&json!({"model": model, "stream": false}))
            .send()
            .await
            .map_err(|error| self.unavailable("ollama", error.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(
                "ollama",
                format!("pulling {model} returned {}", response.status()),
            ));
        }

        info!(model, "model pulled");
        Ok(())
    }

    async fn verify_embedding_dimension(&self) -> Result<(), ModelUnavailableError> {
        let probe = self.embed(&["dimension probe".to_string()]).await?;
        let got = probe.first().map(Vec::len).unwrap_or(0);

        if got != self.config.embedding_dimension {
            return Err(self.unavailable(
                "embedding",
                format!(
                    "model {} returns {got}-dimensional vectors, index is mapped for {}",
                    self.config.embedding_model, self.config.embedding_dimension
                ),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[async_trait]
impl EmbeddingBackend for OllamaClient {
    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelUnavailableError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.config.endpoint))
            .timeout(Duration::from_secs(120))
            .json(&EmbedRequest {
                model: &self.config.embedding_model,
                input: texts,
            })
            .send()
            .await
            .map_err(|error| self.unavailable("embedding", error.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(
                "embedding",
                format!("embed returned {}", response.status()),
            ));
        }

        let payload: EmbedResponse = response
            .json()
            .await
            .map_err(|error| self.unavailable("embedding", error.to_string()))?;

        if payload.embeddings.len() != texts.len() {
            return Err(self.unavailable(
                "embedding",
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    payload.embeddings.len()
                ),
            ));
        }

        Ok(payload.embeddings)
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn start_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<Box<dyn TokenStream>, ModelUnavailableError> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(json!({"role": "system", "content": request.system}));
        for turn in &request.turns {
            messages.push(json!({"role": role_label(turn.role), "content": turn.content}));
        }

        let body = json!({
            "model": self.config.chat_model,
            "messages": messages,
            "stream": true,
            "think": request.think,
            "options": {"temperature": request.temperature},
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|error| self.unavailable("generation", error.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(
                "generation",
                format!("chat returned {}", response.status()),
            ));
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|error| error.to_string())
            })
            .boxed();

        Ok(Box::new(OllamaTokenStream::new(chunks)))
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn model_matches(tag: &str, wanted: &str) -> bool {
    tag == wanted
        || tag.strip_suffix(":latest") == Some(wanted)
        || wanted.strip_suffix(":latest") == Some(tag)
}

// newline-delimited JSON; lines split across network reads reassemble
// in the buffer before parsing
struct OllamaTokenStream {
    chunks: BoxStream<'static, Result<Vec<u8>, String>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl OllamaTokenStream {
    fn new(chunks: BoxStream<'static, Result<Vec<u8>, String>>) -> Self {
        Self {
            chunks,
            buffer: Vec::new(),
            finished: false,
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|byte| *byte == b'\n')?;
        Some(self.buffer.drain(..=pos).collect())
    }

    fn handle_line(&mut self, line: &[u8]) -> Option<String> {
        if line.iter().all(|byte| byte.is_ascii_whitespace()) {
            return None;
        }

        match parse_chat_line(line) {
            Some(fragment) => {
                if fragment.done {
                    self.finished = true;
                }
                if fragment.content.is_empty() {
                    None
                } else {
                    Some(fragment.content)
                }
            }
            None => {
                let preview = String::from_utf8_lossy(&line[..line.len().min(120)]);
                warn!(preview = %preview, "skipping malformed generation fragment");
                None
            }
        }
    }
}

#[async_trait]
impl TokenStream for OllamaTokenStream {
    async fn next_fragment(&mut self) -> Result<Option<String>, GenerationError> {
        loop {
            while let Some(line) = self.take_line() {
                if let Some(content) = self.handle_line(&line) {
                    return Ok(Some(content));
                }
                if self.finished {
                    return Ok(None);
                }
            }

            if self.finished {
                return Ok(None);
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(error)) => return Err(GenerationError::Stream(error)),
                None => {
                    self.finished = true;
                    let remainder = std::mem::take(&mut self.buffer);
                    if let Some(content) = self.handle_line(&remainder) {
                        return Ok(Some(content));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
struct ParsedFragment {
    content: String,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    message: Option<ChatStreamMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatStreamMessage {
    #[serde(default)]
    content: String,
}

// None = malformed: unparseable JSON, or neither a message nor a done marker
fn parse_chat_line(line: &[u8]) -> Option<ParsedFragment> {
    let chunk: ChatStreamChunk = serde_json::from_slice(line).ok()?;

    if chunk.message.is_none() && !chunk.done {
        return None;
    }

    Some(ParsedFragment {
        content: chunk
            .message
            .map(|message| message.content)
            .unwrap_or_default(),
        done: chunk.done,
    })
}
