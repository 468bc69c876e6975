use crate::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 3_000;

/// A chat completion endpoint: one system instruction, one user message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub api_key: String,
    pub instance_name: String,
    pub chat_deployment: String,
    pub embeddings_deployment: Option<String>,
    pub api_version: String,
}

impl AzureOpenAiConfig {
    pub(crate) fn deployment_url(&self, deployment: &str, operation: &str) -> Result<Url, ModelError> {
        let mut url = Url::parse(&format!(
            "https://{}.openai.azure.com/openai/deployments/{}/{}",
            self.instance_name, deployment, operation
        ))?;
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(url)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Azure OpenAI chat deployment called with deterministic sampling.
pub struct AzureChatModel {
    client: Client,
    url: Url,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl AzureChatModel {
    pub fn new(config: &AzureOpenAiConfig) -> Result<Self, ModelError> {
        Ok(Self {
            client: Client::new(),
            url: config.deployment_url(&config.chat_deployment, "chat/completions")?,
            api_key: config.api_key.clone(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }
}

#[async_trait]
impl ChatModel for AzureChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: "azure-openai".to_string(),
                status: status.as_u16(),
                details,
            });
        }

        let payload: ChatResponse = response.json().await?;
        first_choice_text(payload)
    }
}

fn first_choice_text(payload: ChatResponse) -> Result<String, ModelError> {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ModelError::InvalidResponse("completion had no message content".to_string()))
}
