pub mod chat;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use chat::{
    ChatEngine, ChatSession, ResponseStream, DEFAULT_READ_TIMEOUT, DEFAULT_SYSTEM_PROMPT,
};
pub use chunking::{chunk_text, ChunkingConfig, DEFAULT_CHUNK_CHARS, DEFAULT_OVERLAP_CHARS};
pub use embeddings::EmbeddingBackend;
pub use error::{
    ConfigError, ExtractionError, GenerationError, IndexError, IngestError, ModelUnavailableError,
    Result, RetrievalError,
};
pub use extractor::{extract_document_text, DocumentExtractor, LopdfExtractor, TextExtractor};
pub use generation::{GenerationBackend, GenerationRequest, TokenStream};
pub use ingest::{
    digest_bytes, discover_pdf_files, BatchIngestReport, DocumentIngestor, DocumentUpload,
    IngestOutcome, SkippedUpload,
};
pub use models::{
    BulkFailure, BulkReport, ChatTurn, ChunkRecord, RetrievalQuery, RetrievalSettings, Role,
    ScoredChunk,
};
pub use ollama::{shared_client, OllamaClient, OllamaConfig};
pub use retriever::HybridRetriever;
pub use stores::OpenSearchIndex;
pub use traits::ChunkIndex;
