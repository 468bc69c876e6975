//! Scripted stand-ins for the model, terminal and index used across tests.

use crate::embeddings::Embedder;
use crate::error::{IndexError, IngestError, ModelError, PromptError};
use crate::index::{IndexedRecord, SourceIndex};
use crate::llm::ChatModel;
use crate::loader::FragmentLoader;
use crate::models::{Chunk, Fragment};
use crate::prompt::Prompter;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Replays queued replies; once the queue is empty every call answers `0`.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    always_fail: bool,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));

        if self.always_fail {
            return Err(ModelError::InvalidResponse("model unavailable".to_string()));
        }

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(ModelError::InvalidResponse(reason)),
            None => Ok("0".to_string()),
        }
    }
}

/// Answers prompts from a script and records every prompt shown.
#[derive(Clone, Default)]
pub struct ScriptedPrompter {
    answers: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().map(Into::into).collect())),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, prompt: &str) -> Result<String, PromptError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(PromptError::Closed)
    }
}

/// Index that already holds `existing` sources and records lookups and upserts.
/// Upserted sources become visible to later lookups.
#[derive(Clone, Default)]
pub struct RecordingIndex {
    existing: Arc<Mutex<HashSet<String>>>,
    lookups: Arc<Mutex<Vec<String>>>,
    upserts: Arc<Mutex<Vec<Vec<Chunk>>>>,
}

impl RecordingIndex {
    pub fn with_existing<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            existing: Arc::new(Mutex::new(sources.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn upserts(&self) -> Vec<Vec<Chunk>> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceIndex for RecordingIndex {
    async fn find_by_source(
        &self,
        source: &str,
        limit: usize,
    ) -> Result<Vec<IndexedRecord>, IndexError> {
        self.lookups.lock().unwrap().push(source.to_string());
        if limit > 0 && self.existing.lock().unwrap().contains(source) {
            Ok(vec![IndexedRecord {
                id: "existing".to_string(),
                source: source.to_string(),
                text: None,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), IndexError> {
        assert_eq!(chunks.len(), embeddings.len());
        self.existing
            .lock()
            .unwrap()
            .extend(chunks.iter().map(|chunk| chunk.source().to_string()));
        self.upserts.lock().unwrap().push(chunks.to_vec());
        Ok(())
    }
}

/// Constant-vector embedder.
#[derive(Clone, Copy, Default)]
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    fn dimensions(&self) -> usize {
        4
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }
}

/// Hands out a fixed fragment list.
pub struct StaticLoader {
    fragments: Vec<Fragment>,
}

impl StaticLoader {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }
}

#[async_trait]
impl FragmentLoader for StaticLoader {
    async fn load(&self) -> Result<Vec<Fragment>, IngestError> {
        Ok(self.fragments.clone())
    }
}
