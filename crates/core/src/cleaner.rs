use crate::error::{IngestError, ModelError};
use crate::llm::ChatModel;
use regex::Regex;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

pub const CLASSIFY_INSTRUCTION: &str = "You are a grammar expert and a proofreader. \
Your task is to read the text sent by the user and report back if the text needs corrections. \
You should base this on incorrect spacing, tags that doesnt add any value to the text and unnecessary repeating characters. \
Your reply should always be one character long. \
If the text does not need proofreading, reply with 0, nothing else. \
If the text does require proofreading you should reply with 1, nothing else. \
Here is an example reply if the text does not need proof reading: 0. \
Here is an example reply if the text does require proof reading: 1";

pub const CORRECT_INSTRUCTION: &str = "You are a grammar expert and a proofreader. \
Your task is to read the text sent by the user and fix spelling errors, incorrect spacing, \
tags that doesnt add any value to the text and unnecessary repeating characters. \
Reply only with the corrected text, and nothing else.";

const LAYOUT_ARTIFACTS: &str = r"\.{4}| {3}";

/// Deterministic cleanup of layout-extraction artifacts.
#[derive(Debug, Clone)]
pub struct PatternCleaner {
    artifacts: Regex,
}

impl PatternCleaner {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            artifacts: Regex::new(LAYOUT_ARTIFACTS)?,
        })
    }

    /// Newlines become spaces; runs of three spaces and four periods are
    /// removed until none are left.
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.replace('\n', " ");
        loop {
            let next = self.artifacts.replace_all(&current, "");
            if next.len() == current.len() {
                return current;
            }
            current = next.into_owned();
        }
    }
}

/// Numeric zero (or nothing at all) means the text is fine as is.
pub fn needs_proofreading(verdict: &str) -> bool {
    let verdict = verdict.trim();
    if verdict.is_empty() {
        return false;
    }
    match verdict.parse::<f64>() {
        Ok(value) => value != 0.0,
        Err(_) => true,
    }
}

#[derive(Debug, Default)]
struct AttemptState {
    attempt: usize,
    last_error: Option<ModelError>,
}

impl AttemptState {
    fn has_failed(&self) -> bool {
        self.last_error.is_some()
    }
}

pub struct TextCleaner<M> {
    model: M,
    patterns: PatternCleaner,
    max_attempts: usize,
}

impl<M> TextCleaner<M>
where
    M: ChatModel,
{
    pub fn new(model: M, max_attempts: usize) -> Result<Self, IngestError> {
        if max_attempts == 0 {
            return Err(IngestError::InvalidArgument(
                "at least one cleaning attempt is required".to_string(),
            ));
        }

        Ok(Self {
            model,
            patterns: PatternCleaner::new()?,
            max_attempts,
        })
    }

    /// Pattern pass followed by model-assisted proofreading. Never fails: when
    /// the model cannot be reached the pattern-cleaned text is returned.
    pub async fn clean(&self, text: &str, source: Option<&str>) -> String {
        let cleaned = self.patterns.apply(text);
        self.proofread(cleaned, source).await
    }

    pub async fn proofread(&self, text: String, source: Option<&str>) -> String {
        let source = source.unwrap_or("unknown source");
        let mut state = AttemptState::default();

        while state.attempt < self.max_attempts {
            state.attempt += 1;
            info!(
                source,
                attempt = state.attempt,
                max_attempts = self.max_attempts,
                "proofreading"
            );
            if state.has_failed() {
                debug!(source, text = %text, "retrying with identical input");
            }

            match self.proofread_once(&text, state.has_failed()).await {
                Ok(corrected) => return corrected,
                Err(error) => {
                    if state.attempt < self.max_attempts {
                        warn!(source, attempt = state.attempt, error = %error, "proofreading attempt failed, retrying");
                    }
                    state.last_error = Some(error);
                }
            }
        }

        if let Some(error) = &state.last_error {
            warn!(
                source,
                attempts = state.attempt,
                error = %error,
                "proofreading failed, keeping pattern-cleaned text"
            );
        }
        text
    }

    async fn proofread_once(&self, text: &str, verbose: bool) -> Result<String, ModelError> {
        let verdict = self.model.complete(CLASSIFY_INSTRUCTION, text).await?;
        if verbose {
            debug!(verdict = %verdict, "classifier reply");
        }
        if !needs_proofreading(&verdict) {
            return Ok(text.to_string());
        }

        let corrected = self.model.complete(CORRECT_INSTRUCTION, text).await?;
        if verbose {
            debug!(corrected = %corrected, "corrector reply");
        }
        Ok(corrected)
    }
}
