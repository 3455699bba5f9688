use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf has no readable text layer: {0}")]
    NoTextLayer(String),

    #[error("ocr fallback failed: {0}")]
    OcrFailed(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid chunking config: {0}")]
    InvalidChunking(String),

    #[error("invalid setting {name}: {details}")]
    InvalidSetting { name: &'static str, details: String },
}

#[derive(Debug, Error)]
#[error("{backend} backend unavailable at {endpoint}: {reason}")]
pub struct ModelUnavailableError {
    pub backend: &'static str,
    pub endpoint: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(#[from] ModelUnavailableError),

    #[error("no fragment arrived within {waited:?}; response truncated")]
    Timeout { waited: Duration },

    #[error("generation stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid settings: {0}")]
    Config(#[from] ConfigError),

    #[error("retrieval failed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("embedding unavailable: {0}")]
    ModelUnavailable(#[from] ModelUnavailableError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("document already exists in the index: {0}")]
    DuplicateDocument(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
