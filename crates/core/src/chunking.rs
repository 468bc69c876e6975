use crate::error::IngestError;
use crate::models::{Chunk, ConsolidatedDocument, IngestionOptions};
use tracing::warn;

/// Paragraph, line, sentence, word, then single characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

/// Splits text at the largest available boundary and re-merges the pieces into
/// overlapping windows of at most `chunk_size` characters.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than a positive chunk size {}",
                config.chunk_overlap, config.chunk_size
            )));
        }

        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    pub fn chunk_document(&self, document: &ConsolidatedDocument) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .map(|text| Chunk::new(text, document.source()))
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(start, ch)| &text[start..start + ch.len_utf8()])
                .collect()
        } else {
            text.split(separator.as_str())
                .filter(|piece| !piece.is_empty())
                .collect()
        };

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.config.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces, &separator));
                short_pieces.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }

        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces, &separator));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut merged = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;
        let joiner = |count: usize| if count == 0 { 0 } else { separator_len };

        for &piece in pieces {
            let len = char_len(piece);

            if total + len + joiner(window.len()) > self.config.chunk_size {
                if total > self.config.chunk_size {
                    warn!(
                        size = total,
                        limit = self.config.chunk_size,
                        "created a chunk longer than the configured size"
                    );
                }

                if !window.is_empty() {
                    push_trimmed(&mut merged, window.join(separator));

                    while total > self.config.chunk_overlap
                        || (total > 0 && total + len + joiner(window.len()) > self.config.chunk_size)
                    {
                        let dropped = window.remove(0);
                        total -= char_len(dropped) + joiner(window.len());
                    }
                }
            }

            total += len + joiner(window.len());
            window.push(piece);
        }

        if !window.is_empty() {
            push_trimmed(&mut merged, window.join(separator));
        }

        merged
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (String, &'a [String]) {
    for (position, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (String::new(), &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.clone(), &separators[position + 1..]);
        }
    }
    (String::new(), &[])
}

fn push_trimmed(target: &mut Vec<String>, chunk: String) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        target.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
