use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::error::IndexError;
use crate::models::{BulkFailure, BulkReport, ChunkRecord, RetrievalQuery, ScoredChunk};
use crate::traits::ChunkIndex;

pub struct OpenSearchIndex {
    client: Arc<Client>,
    endpoint: String,
    index_name: String,
    embedding_dimension: usize,
}

impl OpenSearchIndex {
    pub fn new(
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
        embedding_dimension: usize,
    ) -> Result<Self, IndexError> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint)?;

        Ok(Self {
            client: Arc::new(Client::new()),
            endpoint,
            index_name: index_name.into(),
            embedding_dimension,
        })
    }

    fn backend_error(&self, status: StatusCode) -> IndexError {
        IndexError::BackendResponse {
            backend: "opensearch".to_string(),
            details: status.to_string(),
        }
    }
}

#[async_trait]
impl ChunkIndex for OpenSearchIndex {
    async fn ensure_index(&self) -> Result<(), IndexError> {
        let response = self
            .client
            .head(format!("{}/{}", self.endpoint, self.index_name))
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(self.backend_error(response.status()));
        }

        let response = self
            .client
            .put(format!("{}/{}", self.endpoint, self.index_name))
            .json(&index_body(self.embedding_dimension))
            .send()
            .await?;

        if response.status().is_server_error() || response.status().is_client_error() {
            return Err(IndexError::Request(format!(
                "index setup failed with {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn bulk_upsert(&self, records: &[ChunkRecord]) -> Result<BulkReport, IndexError> {
        if records.is_empty() {
            return Ok(BulkReport::default());
        }

        let payload = bulk_payload(&self.index_name, records)?;

        let response = self
            .client
            .post(format!("{}/_bulk", self.endpoint))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status()));
        }

        let response_json: Value = response.json().await?;
        Ok(parse_bulk_report(&response_json))
    }

    async fn delete_by_document_name(&self, document_name: &str) -> Result<u64, IndexError> {
        let response = self
            .client
            .post(format!(
                "{}/{}/_delete_by_query",
                self.endpoint, self.index_name
            ))
            .json(&delete_body(document_name))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status()));
        }

        let response_json: Value = response.json().await?;
        Ok(parse_deleted_count(&response_json))
    }

    async fn list_document_names(&self) -> Result<BTreeSet<String>, IndexError> {
        let response = self
            .client
            .post(format!("{}/{}/_search", self.endpoint, self.index_name))
            .json(&document_names_body())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status()));
        }

        let response_json: Value = response.json().await?;
        Ok(parse_document_names(&response_json))
    }

    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<ScoredChunk>, IndexError> {
        let response = self
            .client
            .post(format!("{}/{}/_search", self.endpoint, self.index_name))
            .json(&search_body(query))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status()));
        }

        let response_json: Value = response.json().await?;
        Ok(parse_hits(&response_json))
    }
}

fn index_body(embedding_dimension: usize) -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "index": {
                "knn": true
            }
        },
        "mappings": {
            "properties": {
                "doc_id": {"type": "keyword"},
                "text": {"type": "text"},
                "embedding": {"type": "knn_vector", "dimension": embedding_dimension},
                "document_name": {"type": "keyword"}
            }
        }
    })
}

fn bulk_payload(index_name: &str, records: &[ChunkRecord]) -> Result<String, IndexError> {
    let mut operations = Vec::with_capacity(records.len() * 2);

    for record in records {
        operations.push(json!({
            "index": {
                "_index": index_name,
                "_id": record.doc_id,
            }
        }));
        operations.push(serde_json::to_value(record)?);
    }

    let payload = operations
        .into_iter()
        .map(|value| serde_json::to_string(&value))
        .collect::<Result<Vec<_>, serde_json::Error>>()?
        .join("\n")
        + "\n";

    Ok(payload)
}

fn parse_bulk_report(response: &Value) -> BulkReport {
    let items = response
        .pointer("/items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut report = BulkReport::default();

    for item in items {
        let action = item
            .pointer("/index")
            .or_else(|| item.pointer("/create"))
            .cloned()
            .unwrap_or(Value::Null);

        let doc_id = action
            .pointer("/_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match action.pointer("/error") {
            Some(error) if !error.is_null() => {
                let cause = error
                    .pointer("/reason")
                    .and_then(Value::as_str)
                    .unwrap_or("unrecognized bulk failure")
                    .to_string();
                report.failures.push(BulkFailure { doc_id, cause });
            }
            _ => report.succeeded += 1,
        }
    }

    report
}

fn delete_body(document_name: &str) -> Value {
    json!({
        "query": {
            "term": {
                "document_name": document_name
            }
        }
    })
}

fn parse_deleted_count(response: &Value) -> u64 {
    response
        .pointer("/deleted")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn document_names_body() -> Value {
    json!({
        "size": 0,
        "aggs": {
            "unique_docs": {
                "terms": {
                    "field": "document_name",
                    "size": 10_000
                }
            }
        }
    })
}

fn parse_document_names(response: &Value) -> BTreeSet<String> {
    response
        .pointer("/aggregations/unique_docs/buckets")
        .and_then(Value::as_array)
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|bucket| bucket.pointer("/key").and_then(Value::as_str))
                .map(|key| key.to_string())
                .collect()
        })
        .unwrap_or_default()
}

// lexical match plus a knn clause when the query carries a vector;
// ranking is left to the backend
fn search_body(query: &RetrievalQuery) -> Value {
    let lexical = json!({
        "match": {
            "text": query.text
        }
    });

    match &query.vector {
        Some(vector) => json!({
            "size": query.k,
            "query": {
                "bool": {
                    "should": [
                        lexical,
                        {
                            "knn": {
                                "embedding": {
                                    "vector": vector,
                                    "k": query.k
                                }
                            }
                        }
                    ]
                }
            }
        }),
        None => json!({
            "size": query.k,
            "query": lexical
        }),
    }
}

fn parse_hits(response: &Value) -> Vec<ScoredChunk> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut results = Vec::new();

    for raw in hits {
        let doc_id = raw
            .pointer("/_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let score = raw
            .pointer("/_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let text = raw
            .pointer("/_source/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let document_name = raw
            .pointer("/_source/document_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        results.push(ScoredChunk {
            doc_id,
            document_name,
            text,
            score,
        });
    }

    results
}
