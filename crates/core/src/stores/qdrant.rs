use crate::error::IndexError;
use crate::index::{IndexedRecord, SourceIndex};
use crate::models::Chunk;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection (cosine distance) when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if response.status().is_success() {
            return Ok(());
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        info!(collection = %self.collection, size = self.vector_size, "creating qdrant collection");
        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }
}

fn backend_error(status: StatusCode) -> IndexError {
    IndexError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

/// Identical source and text always map to the same point.
pub fn point_id(chunk: &Chunk) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(chunk.source().as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.text.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn source_filter(source: &str, limit: usize) -> Value {
    json!({
        "filter": {
            "must": [
                { "key": "source", "match": { "value": source } }
            ]
        },
        "limit": limit,
        "with_payload": true,
        "with_vector": false,
    })
}

fn parse_records(parsed: &Value) -> Vec<IndexedRecord> {
    parsed
        .pointer("/result/points")
        .and_then(Value::as_array)
        .map(|points| {
            points
                .iter()
                .map(|point| IndexedRecord {
                    id: match point.pointer("/id") {
                        Some(Value::String(id)) => id.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    },
                    source: point
                        .pointer("/payload/source")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    text: point
                        .pointer("/payload/text")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SourceIndex for QdrantStore {
    async fn find_by_source(
        &self,
        source: &str,
        limit: usize,
    ) -> Result<Vec<IndexedRecord>, IndexError> {
        let response = self
            .client
            .post(format!("{}/points/scroll", self.collection_url()))
            .json(&source_filter(source, limit))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let records = parse_records(&parsed);
        debug!(source, matches = records.len(), "source lookup");
        Ok(records)
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let ingested_at = Utc::now().to_rfc3339();
        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                if embedding.len() != self.vector_size {
                    return Err(IndexError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": point_id(chunk).to_string(),
                    "vector": embedding,
                    "payload": {
                        "text": chunk.text,
                        "source": chunk.source(),
                        "ingested_at": ingested_at,
                    },
                }))
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }
}
