pub mod chunking;
pub mod cleaner;
pub mod consolidate;
pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod llm;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod reconcile;
pub mod stores;

#[cfg(test)]
mod testing;

pub use chunking::{ChunkingConfig, RecursiveSplitter, DEFAULT_SEPARATORS};
pub use cleaner::{needs_proofreading, PatternCleaner, TextCleaner, DEFAULT_MAX_ATTEMPTS};
pub use consolidate::{consolidate, Consolidation};
pub use dedup::DuplicateGuard;
pub use embeddings::{
    AzureEmbedder, Embedder, HashingEmbedder, DEFAULT_AZURE_DIMENSIONS, DEFAULT_HASHING_DIMENSIONS,
};
pub use error::{IndexError, IngestError, ModelError, PipelineError, PromptError};
pub use index::{is_source_indexed, IndexedRecord, SourceIndex};
pub use llm::{AzureChatModel, AzureOpenAiConfig, ChatModel};
pub use loader::{
    discover_files, DirectoryLoader, FragmentLoader, LoaderStrategy, UnstructuredClient,
    WholeFileExtractor,
};
pub use models::{
    Chunk, ChunkMetadata, ConsolidatedDocument, FileKind, Fragment, FragmentMetadata,
    IngestionOptions, IngestionSummary, SkipSet, SourceMap,
};
pub use pipeline::IngestionPipeline;
pub use prompt::{Prompter, TerminalPrompter};
pub use reconcile::{ask_canonical_source, reconcile};
pub use stores::QdrantStore;
