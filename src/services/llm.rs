use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use url::Url;

/// Text generation capability used by the novel state machine.
#[async_trait]
pub trait GenerationClient: Send + Sync + Debug {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

// --- Config ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "mistral", "openai" or "ollama"
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    pub mistral: Option<OpenAIConfig>,
    pub openai: Option<OpenAIConfig>,
    pub ollama: Option<OllamaConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    pub model: String,
}

fn default_retry_count() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    10
}
fn default_timeout() -> u64 {
    120
}
fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
const MISTRAL_MODEL: &str = "mistral-small";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o-mini";

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn create_client(config: &LlmConfig) -> Result<Box<dyn GenerationClient>> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    match config.provider.as_str() {
        "mistral" => {
            let cfg = config.mistral.as_ref().context("Mistral config missing")?;
            Ok(Box::new(OpenAICompatibleClient::new(
                "Mistral",
                &cfg.api_key,
                cfg.model.as_deref().unwrap_or(MISTRAL_MODEL),
                cfg.base_url.as_deref().unwrap_or(MISTRAL_BASE_URL),
                timeout,
            )?))
        }
        "openai" => {
            let cfg = config.openai.as_ref().context("OpenAI config missing")?;
            Ok(Box::new(OpenAICompatibleClient::new(
                "OpenAI",
                &cfg.api_key,
                cfg.model.as_deref().unwrap_or(OPENAI_MODEL),
                cfg.base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
                timeout,
            )?))
        }
        "ollama" => {
            let cfg = config.ollama.as_ref().context("Ollama config missing")?;
            Ok(Box::new(OllamaClient::new(&cfg.base_url, &cfg.model, timeout)?))
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.provider)),
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

fn endpoint(base_url: &str, path: &str) -> Result<String> {
    let parsed = Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!("Unsupported URL scheme in {}", base_url));
    }
    Ok(format!("{}/{}", base_url.trim_end_matches('/'), path))
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

// --- OpenAI compatible (Mistral, OpenAI) ---

#[derive(Debug)]
pub struct OpenAICompatibleClient {
    name: &'static str,
    api_key: String,
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OpenAICompatibleClient {
    pub fn new(
        name: &'static str,
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            name,
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            url: endpoint(base_url, "chat/completions")?,
            client: build_http_client(timeout)?,
        })
    }

    async fn request(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
        };

        let resp = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = resp.status();
        let response_text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("{} API error ({}): {}", self.name, status, response_text));
        }

        let result: OpenAIResponse = serde_json::from_str(&response_text).map_err(|e| {
            anyhow!("Failed to parse {} response: {}. Body: {}", self.name, e, response_text)
        })?;
        result.into_text()
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

impl OpenAIResponse {
    fn into_text(self) -> Result<String> {
        self.choices
            .first()
            .and_then(|choice| non_empty(choice.message.content.as_deref()))
            .ok_or_else(|| anyhow!("Response empty or missing content"))
    }
}

#[async_trait]
impl GenerationClient for OpenAICompatibleClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        debug!("{} request: model {}, {} prompt chars", self.name, self.model, prompt.len());
        self.request(prompt, max_tokens)
            .await
            .inspect_err(|e| warn!("{} generation failed: {:#}", self.name, e))
    }
}

// --- Ollama ---

#[derive(Debug)]
pub struct OllamaClient {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: endpoint(base_url, "api/chat")?,
            model: model.to_string(),
            client: build_http_client(timeout)?,
        })
    }

    async fn request(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request_body = OllamaRequest {
            model: self.model.clone(),
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: OllamaOptions {
                num_predict: max_tokens,
            },
        };

        let resp = self.client.post(&self.url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Ollama API error ({}): {}", status, error_text));
        }

        let result: OllamaResponse = resp.json().await?;
        non_empty(result.message.and_then(|m| m.content).as_deref())
            .ok_or_else(|| anyhow!("Ollama response empty or missing content"))
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessageResponse>,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        debug!("Ollama request: model {}, {} prompt chars", self.model, prompt.len());
        self.request(prompt, max_tokens)
            .await
            .inspect_err(|e| warn!("Ollama generation failed: {:#}", e))
    }
}
