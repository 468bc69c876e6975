use crate::error::IndexError;
use crate::models::Chunk;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub id: String,
    pub source: String,
    pub text: Option<String>,
}

#[async_trait]
pub trait SourceIndex: Send + Sync {
    /// Records whose stored source metadata matches `source`, at most `limit`.
    async fn find_by_source(
        &self,
        source: &str,
        limit: usize,
    ) -> Result<Vec<IndexedRecord>, IndexError>;

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), IndexError>;
}

/// Exact-equality check over a bounded lookup window.
pub async fn is_source_indexed<I>(index: &I, source: &str, limit: usize) -> Result<bool, IndexError>
where
    I: SourceIndex + ?Sized,
{
    let records = index.find_by_source(source, limit).await?;
    Ok(records.iter().any(|record| record.source == source))
}
