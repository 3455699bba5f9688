use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Field names double as the index field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub document_name: String,
}

impl ChunkRecord {
    pub fn doc_id_for(document_name: &str, sequence_index: usize) -> String {
        format!("{document_name}_{sequence_index}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call retrieval and generation knobs; nothing here is ambient state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    pub use_hybrid_search: bool,
    pub num_results: usize,
    pub temperature: f32,
    pub show_reasoning: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            use_hybrid_search: true,
            num_results: 10,
            temperature: 0.7,
            show_reasoning: true,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_results < 1 || self.num_results > 10 {
            return Err(ConfigError::InvalidSetting {
                name: "num_results",
                details: format!("{} is outside 1..=10", self.num_results),
            });
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidSetting {
                name: "temperature",
                details: format!("{} is outside 0.0..=1.0", self.temperature),
            });
        }

        Ok(())
    }
}

/// A present `vector` asks the store for the combined lexical plus vector query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub text: String,
    pub vector: Option<Vec<f32>>,
    pub k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub doc_id: String,
    pub document_name: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub doc_id: String,
    pub cause: String,
}

#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failures: Vec<BulkFailure>,
}
