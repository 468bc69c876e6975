use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// One fragment per page, each addressable by its own source path.
    PageOriented,
    /// Many fragments per file that only make sense once merged.
    WholeFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FragmentMetadata {
    pub filename: String,
    pub filename_stem: String,
    pub source_path: Option<String>,
    pub kind: FileKind,
}

impl FragmentMetadata {
    pub fn new(filename: impl Into<String>, source_path: Option<String>, kind: FileKind) -> Self {
        let filename = filename.into();
        let filename_stem = filename
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            filename,
            filename_stem,
            source_path,
            kind,
        }
    }

    pub fn page(path: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::new(filename, Some(path.into()), FileKind::PageOriented)
    }

    pub fn whole_file(filename: impl Into<String>) -> Self {
        Self::new(filename, None, FileKind::WholeFile)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub metadata: FragmentMetadata,
}

impl Fragment {
    pub fn new(text: impl Into<String>, metadata: FragmentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn is_page_oriented(&self) -> bool {
        self.metadata
            .source_path
            .as_deref()
            .is_some_and(|path| !path.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedDocument {
    pub filename_stem: String,
    pub text: String,
    pub metadata: FragmentMetadata,
}

impl ConsolidatedDocument {
    /// Source string stamped on every chunk cut from this document.
    pub fn source(&self) -> &str {
        &self.metadata.filename
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: ChunkMetadata {
                source: source.into(),
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

/// Chunk indices grouped by raw source, iterated in first-encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    order: Vec<String>,
    members: HashMap<String, Vec<usize>>,
}

impl SourceMap {
    pub fn build(chunks: &[Chunk]) -> Self {
        let mut map = Self::default();
        for (index, chunk) in chunks.iter().enumerate() {
            let source = chunk.source();
            match map.members.get_mut(source) {
                Some(indices) => indices.push(index),
                None => {
                    map.order.push(source.to_string());
                    map.members.insert(source.to_string(), vec![index]);
                }
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn indices(&self, source: &str) -> &[usize] {
        self.members.get(source).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn into_groups(mut self) -> Vec<(String, Vec<usize>)> {
        self.order
            .into_iter()
            .map(|source| {
                let indices = self.members.remove(&source).unwrap_or_default();
                (source, indices)
            })
            .collect()
    }
}

/// Canonical sources the user chose not to re-upload during this run.
#[derive(Debug, Clone, Default)]
pub struct SkipSet {
    sources: HashSet<String>,
}

impl SkipSet {
    pub fn contains(&self, source: &str) -> bool {
        self.sources.contains(source)
    }

    pub fn insert(&mut self, source: impl Into<String>) -> bool {
        self.sources.insert(source.into())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sorted(&self) -> Vec<String> {
        let mut sources = self.sources.iter().cloned().collect::<Vec<_>>();
        sources.sort_unstable();
        sources
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_cleaning_attempts: usize,
    pub duplicate_lookup_limit: usize,
    pub upsert_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            // roughly 1000 tokens per chunk
            chunk_size: 1_350,
            chunk_overlap: 200,
            max_cleaning_attempts: 3,
            duplicate_lookup_limit: 50,
            upsert_batch_size: 100,
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_cleaning_attempts == 0 {
            return Err(IngestError::InvalidArgument(
                "at least one cleaning attempt is required".to_string(),
            ));
        }
        if self.duplicate_lookup_limit == 0 || self.upsert_batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "lookup limit and batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionSummary {
    pub fragments: usize,
    pub chunks: usize,
    pub uploaded: usize,
    pub skipped_sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_stops_at_first_dot() {
        let metadata = FragmentMetadata::whole_file("Quarterly.Notes.docx");
        assert_eq!(metadata.filename_stem, "Quarterly");
        assert_eq!(metadata.filename, "Quarterly.Notes.docx");
    }

    #[test]
    fn empty_source_path_is_not_page_oriented() {
        let fragment = Fragment::new(
            "text",
            FragmentMetadata::new("a.pdf", Some(String::new()), FileKind::PageOriented),
        );
        assert!(!fragment.is_page_oriented());
        assert!(Fragment::new("text", FragmentMetadata::page("docs/a.pdf", "a.pdf")).is_page_oriented());
    }

    #[test]
    fn source_map_keeps_first_encounter_order() {
        let chunks = vec![
            Chunk::new("1", "b.pdf"),
            Chunk::new("2", "a.pdf"),
            Chunk::new("3", "b.pdf"),
        ];
        let map = SourceMap::build(&chunks);
        assert_eq!(map.len(), 2);
        assert_eq!(map.indices("b.pdf"), &[0, 2]);
        assert_eq!(
            map.into_groups(),
            vec![
                ("b.pdf".to_string(), vec![0, 2]),
                ("a.pdf".to_string(), vec![1]),
            ]
        );
    }

    #[test]
    fn default_options_are_valid() {
        assert!(IngestionOptions::default().validate().is_ok());
        let broken = IngestionOptions {
            chunk_overlap: 1_350,
            ..IngestionOptions::default()
        };
        assert!(broken.validate().is_err());
    }
}
