use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::EmbeddingBackend;
use crate::error::{ConfigError, IngestError};
use crate::extractor::TextExtractor;
use crate::models::{BulkFailure, ChunkRecord};
use crate::traits::ChunkIndex;

/// The name is the duplicate-detection key.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub document_name: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let document_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();

        let bytes = fs::read(path)?;

        Ok(Self {
            document_name,
            bytes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_name: String,
    pub chunks_indexed: usize,
    pub checksum: String,
    pub failures: Vec<BulkFailure>,
}

#[derive(Debug)]
pub struct SkippedUpload {
    pub document_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchIngestReport {
    pub completed: Vec<IngestOutcome>,
    pub skipped: Vec<SkippedUpload>,
}

pub struct DocumentIngestor<X, S, E> {
    extractor: X,
    index: S,
    embedder: E,
    chunking: ChunkingConfig,
}

impl<X, S, E> DocumentIngestor<X, S, E>
where
    X: TextExtractor + Send + Sync,
    S: ChunkIndex,
    E: EmbeddingBackend,
{
    pub fn new(
        extractor: X,
        index: S,
        embedder: E,
        chunking: ChunkingConfig,
    ) -> Result<Self, ConfigError> {
        chunking.validate()?;

        Ok(Self {
            extractor,
            index,
            embedder,
            chunking,
        })
    }

    /// Chunk ids are `{document_name}_{i}`, so re-ingesting overwrites.
    pub async fn ingest_document(
        &self,
        upload: &DocumentUpload,
    ) -> Result<IngestOutcome, IngestError> {
        let text = self
            .extractor
            .extract_text(&upload.document_name, &upload.bytes)?;
        let chunks = chunk_text(&text, self.chunking)?;
        let embeddings = self.embedder.embed(&chunks).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(sequence_index, (text, embedding))| ChunkRecord {
                doc_id: ChunkRecord::doc_id_for(&upload.document_name, sequence_index),
                text,
                embedding,
                document_name: upload.document_name.clone(),
            })
            .collect();

        let report = self.index.bulk_upsert(&records).await?;

        info!(
            document = %upload.document_name,
            chunks = report.succeeded,
            rejected = report.failures.len(),
            "document indexed"
        );

        Ok(IngestOutcome {
            document_name: upload.document_name.clone(),
            chunks_indexed: report.succeeded,
            checksum: digest_bytes(&upload.bytes),
            failures: report.failures,
        })
    }

    /// Best-effort: one bad or duplicate document never stops the rest.
    pub async fn ingest_batch(
        &self,
        uploads: &[DocumentUpload],
    ) -> Result<BatchIngestReport, IngestError> {
        self.index.ensure_index().await?;
        let mut seen = self.index.list_document_names().await?;

        let mut report = BatchIngestReport::default();

        for upload in uploads {
            if seen.contains(&upload.document_name) {
                warn!(
                    document = %upload.document_name,
                    "document already exists in the index, skipping"
                );
                report.skipped.push(SkippedUpload {
                    document_name: upload.document_name.clone(),
                    reason: IngestError::DuplicateDocument(upload.document_name.clone())
                        .to_string(),
                });
                continue;
            }

            match self.ingest_document(upload).await {
                Ok(outcome) => {
                    seen.insert(outcome.document_name.clone());
                    report.completed.push(outcome);
                }
                Err(error) => {
                    warn!(
                        document = %upload.document_name,
                        reason = %error,
                        "skipping document"
                    );
                    report.skipped.push(SkippedUpload {
                        document_name: upload.document_name.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(reason = %error, "skipping unreadable entry during pdf scan");
                continue;
            }
        };

        if entry.file_type().is_file() && has_pdf_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort_unstable();
    files
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{digest_bytes, discover_pdf_files, DocumentIngestor, DocumentUpload};
    use crate::chunking::ChunkingConfig;
    use crate::embeddings::EmbeddingBackend;
    use crate::error::{ExtractionError, IndexError, ModelUnavailableError};
    use crate::extractor::TextExtractor;
    use crate::models::{BulkFailure, BulkReport, ChunkRecord, RetrievalQuery, ScoredChunk};
    use crate::traits::ChunkIndex;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    struct FakeExtractor {
        text: String,
        fail_for: Option<String>,
    }

    impl FakeExtractor {
        fn returning(text: &str) -> Self {
            Self {
                text: text.to_string(),
                fail_for: None,
            }
        }
    }

    impl TextExtractor for FakeExtractor {
        fn extract_text(
            &self,
            document_name: &str,
            _bytes: &[u8],
        ) -> Result<String, ExtractionError> {
            if self.fail_for.as_deref() == Some(document_name) {
                return Err(ExtractionError::NoTextLayer(document_name.to_string()));
            }
            Ok(self.text.clone())
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FakeEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelUnavailableError> {
            Ok(texts
                .iter()
                .map(|text| vec![text.chars().count() as f32, 0.0, 0.0])
                .collect())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingIndex {
        inner: Arc<Mutex<RecordingIndexState>>,
        reject: BTreeSet<String>,
    }

    #[derive(Default)]
    struct RecordingIndexState {
        names: BTreeSet<String>,
        records: Vec<ChunkRecord>,
        ensured: usize,
    }

    impl RecordingIndex {
        fn with_existing(names: &[&str]) -> Self {
            let index = Self::default();
            index.inner.lock().expect("state lock").names =
                names.iter().map(|name| name.to_string()).collect();
            index
        }

        fn records(&self) -> Vec<ChunkRecord> {
            self.inner.lock().expect("state lock").records.clone()
        }

        fn ensured(&self) -> usize {
            self.inner.lock().expect("state lock").ensured
        }
    }

    #[async_trait]
    impl ChunkIndex for RecordingIndex {
        async fn ensure_index(&self) -> Result<(), IndexError> {
            self.inner.lock().expect("state lock").ensured += 1;
            Ok(())
        }

        async fn bulk_upsert(&self, records: &[ChunkRecord]) -> Result<BulkReport, IndexError> {
            let mut state = self.inner.lock().expect("state lock");
            let mut report = BulkReport::default();

            for record in records {
                if self.reject.contains(&record.doc_id) {
                    report.failures.push(BulkFailure {
                        doc_id: record.doc_id.clone(),
                        cause: "rejected".to_string(),
                    });
                    continue;
                }

                state.names.insert(record.document_name.clone());
                state.records.push(record.clone());
                report.succeeded += 1;
            }

            Ok(report)
        }

        async fn delete_by_document_name(&self, document_name: &str) -> Result<u64, IndexError> {
            let mut state = self.inner.lock().expect("state lock");
            let before = state.records.len();
            state
                .records
                .retain(|record| record.document_name != document_name);
            state.names.remove(document_name);
            Ok((before - state.records.len()) as u64)
        }

        async fn list_document_names(&self) -> Result<BTreeSet<String>, IndexError> {
            Ok(self.inner.lock().expect("state lock").names.clone())
        }

        async fn search(&self, _query: &RetrievalQuery) -> Result<Vec<ScoredChunk>, IndexError> {
            Ok(Vec::new())
        }
    }

    fn upload(name: &str) -> DocumentUpload {
        DocumentUpload {
            document_name: name.to_string(),
            bytes: b"%PDF-1.4 fake".to_vec(),
        }
    }

    fn small_chunks() -> ChunkingConfig {
        ChunkingConfig {
            chunk_chars: 20,
            overlap_chars: 4,
        }
    }

    #[test]
    fn discover_pdf_files_walks_nested_folders() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(nested.join("z.pdf"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("UPPER.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"skip me"))?;

        let files = discover_pdf_files(base);
        assert_eq!(
            files,
            vec![base.join("UPPER.PDF"), nested.join("z.pdf")]
        );
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }

    #[tokio::test]
    async fn chunks_are_indexed_with_sequential_ids() {
        let index = RecordingIndex::default();
        let ingestor = DocumentIngestor::new(
            FakeExtractor::returning("abcdefghijklmnopqrstuvwxyz0123456789"),
            index.clone(),
            FakeEmbedder,
            small_chunks(),
        )
        .expect("chunking config is valid");

        let outcome = ingestor
            .ingest_document(&upload("report.pdf"))
            .await
            .expect("ingest should succeed");

        let records = index.records();
        assert_eq!(outcome.chunks_indexed, records.len());
        assert!(records.len() > 1);

        for (sequence_index, record) in records.iter().enumerate() {
            assert_eq!(record.doc_id, format!("report.pdf_{sequence_index}"));
            assert_eq!(record.document_name, "report.pdf");
            assert_eq!(record.embedding.len(), 3);
        }
    }

    #[tokio::test]
    async fn deleting_a_document_removes_every_chunk_and_its_name() {
        let index = RecordingIndex::default();
        let ingestor = DocumentIngestor::new(
            FakeExtractor::returning("abcdefghijklmnopqrstuvwxyz0123456789"),
            index.clone(),
            FakeEmbedder,
            small_chunks(),
        )
        .expect("chunking config is valid");

        let outcome = ingestor
            .ingest_document(&upload("report.pdf"))
            .await
            .expect("ingest should succeed");
        assert!(outcome.chunks_indexed > 1);

        let deleted = index
            .delete_by_document_name("report.pdf")
            .await
            .expect("delete should succeed");
        assert_eq!(deleted, outcome.chunks_indexed as u64);

        let names = index.list_document_names().await.expect("listing works");
        assert!(!names.contains("report.pdf"));
        assert!(index.records().is_empty());

        // a second delete finds nothing, which is not an error
        let deleted = index
            .delete_by_document_name("report.pdf")
            .await
            .expect("delete should succeed");
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn batch_skips_documents_already_in_the_index() {
        let index = RecordingIndex::with_existing(&["a.pdf"]);
        let ingestor = DocumentIngestor::new(
            FakeExtractor::returning("some document text"),
            index.clone(),
            FakeEmbedder,
            small_chunks(),
        )
        .expect("chunking config is valid");

        let report = ingestor
            .ingest_batch(&[upload("a.pdf"), upload("b.pdf")])
            .await
            .expect("batch should succeed");

        assert_eq!(index.ensured(), 1);
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].document_name, "b.pdf");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].document_name, "a.pdf");
        assert!(report.skipped[0].reason.contains("already exists"));
    }

    #[tokio::test]
    async fn batch_skips_duplicates_within_the_batch() {
        let index = RecordingIndex::default();
        let ingestor = DocumentIngestor::new(
            FakeExtractor::returning("some document text"),
            index.clone(),
            FakeEmbedder,
            small_chunks(),
        )
        .expect("chunking config is valid");

        let report = ingestor
            .ingest_batch(&[upload("a.pdf"), upload("a.pdf")])
            .await
            .expect("batch should succeed");

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn one_unreadable_document_does_not_stop_the_batch() {
        let index = RecordingIndex::default();
        let ingestor = DocumentIngestor::new(
            FakeExtractor {
                text: "good text".to_string(),
                fail_for: Some("broken.pdf".to_string()),
            },
            index.clone(),
            FakeEmbedder,
            small_chunks(),
        )
        .expect("chunking config is valid");

        let report = ingestor
            .ingest_batch(&[upload("broken.pdf"), upload("good.pdf")])
            .await
            .expect("batch should succeed");

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].document_name, "good.pdf");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].document_name, "broken.pdf");
    }

    #[tokio::test]
    async fn rejected_chunks_are_reported_not_fatal() {
        let mut index = RecordingIndex::default();
        index.reject.insert("report.pdf_0".to_string());

        let ingestor = DocumentIngestor::new(
            FakeExtractor::returning("abcdefghijklmnopqrstuvwxyz0123456789"),
            index.clone(),
            FakeEmbedder,
            small_chunks(),
        )
        .expect("chunking config is valid");

        let outcome = ingestor
            .ingest_document(&upload("report.pdf"))
            .await
            .expect("ingest should succeed");

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].doc_id, "report.pdf_0");
        assert!(outcome.chunks_indexed >= 1);
    }

    #[test]
    fn degenerate_chunking_is_rejected_at_construction() {
        let result = DocumentIngestor::new(
            FakeExtractor::returning("text"),
            RecordingIndex::default(),
            FakeEmbedder,
            ChunkingConfig {
                chunk_chars: 100,
                overlap_chars: 100,
            },
        );

        assert!(result.is_err());
    }
}
