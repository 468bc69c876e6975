use crate::error::ModelError;
use crate::llm::AzureOpenAiConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// text-embedding-ada-002
pub const DEFAULT_AZURE_DIMENSIONS: usize = 1_536;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;
}

#[async_trait]
impl<T> Embedder for Box<T>
where
    T: Embedder + ?Sized,
{
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        (**self).embed_documents(texts).await
    }
}

/// Offline embedder: hashed lowercase character trigrams, L2-normalised.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let chars = text.to_lowercase().chars().collect::<Vec<_>>();

        for window in chars.windows(3) {
            vector[fnv_bucket(window, self.dimensions)] += 1.0;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

fn fnv_bucket(window: &[char], buckets: usize) -> usize {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    let mut encoded = [0u8; 4];
    for ch in window {
        for byte in ch.encode_utf8(&mut encoded).bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    (hash % buckets as u64) as usize
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Azure OpenAI embeddings deployment.
pub struct AzureEmbedder {
    client: Client,
    url: Url,
    api_key: String,
    dimensions: usize,
}

impl AzureEmbedder {
    pub fn new(config: &AzureOpenAiConfig, dimensions: usize) -> Result<Self, ModelError> {
        let deployment = config.embeddings_deployment.as_deref().ok_or_else(|| {
            ModelError::MissingConfig("AZURE_OPENAI_API_EMBEDDINGS_DEPLOYMENT_NAME".to_string())
        })?;

        Ok(Self {
            client: Client::new(),
            url: config.deployment_url(deployment, "embeddings")?,
            api_key: config.api_key.clone(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for AzureEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&EmbeddingRequest { input: texts })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: "azure-openai-embeddings".to_string(),
                status: status.as_u16(),
                details,
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        order_embeddings(payload, texts.len(), self.dimensions)
    }
}

fn order_embeddings(
    payload: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, ModelError> {
    if payload.data.len() != expected {
        return Err(ModelError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            payload.data.len()
        )));
    }

    let mut items = payload.data;
    items.sort_by_key(|item| item.index);

    items
        .into_iter()
        .map(|item| {
            if item.embedding.len() == dimensions {
                Ok(item.embedding)
            } else {
                Err(ModelError::InvalidResponse(format!(
                    "embedding dimension {} != {dimensions}",
                    item.embedding.len()
                )))
            }
        })
        .collect()
}
