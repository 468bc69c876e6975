use crate::error::PromptError;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

/// Free-text question/answer channel to the operator.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String, PromptError>;
}

/// `y` (any case, nothing else) confirms.
pub fn is_confirmation(answer: &str) -> bool {
    answer.to_lowercase() == "y"
}

/// Anything but `n` (any case) counts as agreement to skip.
pub fn is_skip(answer: &str) -> bool {
    answer.to_lowercase() != "n"
}

pub struct TerminalPrompter {
    input: Mutex<BufReader<Stdin>>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn ask(&self, prompt: &str) -> Result<String, PromptError> {
        let mut input = self.input.lock().await;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;

        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            return Err(PromptError::Closed);
        }
        Ok(strip_line_ending(&line).to_string())
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}
