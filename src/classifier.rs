use std::env;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{EmailType, FetchedEmail};

// --- Provider layer ---

pub trait LlmProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
}

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    match name {
        // Anthropic (requires ANTHROPIC_API_KEY)
        "haiku" => Ok(ModelSpec {
            provider: ProviderKind::Anthropic,
            model_id: "claude-haiku-4-5-20251001".to_string(),
        }),
        "sonnet" => Ok(ModelSpec {
            provider: ProviderKind::Anthropic,
            model_id: "claude-sonnet-4-5-20250929".to_string(),
        }),
        // OpenAI (requires OPENAI_API_KEY)
        "gpt-4o-mini" => Ok(ModelSpec {
            provider: ProviderKind::OpenAI,
            model_id: "gpt-4o-mini".to_string(),
        }),
        "gpt-4o" => Ok(ModelSpec {
            provider: ProviderKind::OpenAI,
            model_id: "gpt-4o".to_string(),
        }),
        _ => Err(anyhow!(
            "Unknown model '{}'. Available: haiku (default), sonnet, gpt-4o-mini, gpt-4o",
            name
        )),
    }
}

pub fn create_provider(spec: &ModelSpec) -> Result<Box<dyn LlmProvider>> {
    match spec.provider {
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(spec.model_id.clone())?)),
        ProviderKind::OpenAI => Ok(Box::new(OpenAIProvider::new(spec.model_id.clone())?)),
    }
}

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
        let client = reqwest::blocking::Client::new();
        Ok(Self {
            api_key,
            model_id,
            client,
        })
    }
}

impl LlmProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: AnthropicResponse = response
            .json()
            .context("Failed to parse Anthropic API response")?;

        api_response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| anyhow!("No content in Anthropic API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<OpenAIMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key =
            env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable not set")?;
        let client = reqwest::blocking::Client::new();
        Ok(Self {
            api_key,
            model_id,
            client,
        })
    }
}

impl LlmProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: OpenAIResponse = response
            .json()
            .context("Failed to parse OpenAI API response")?;

        api_response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No choices in OpenAI API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Verdict ---

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub email_type: EmailType,
    pub company: Option<String>,
    pub role: Option<String>,
    pub location: Option<String>,
    pub confidence: f64,
}

/// Outcome of one classification. Model output that fails schema
/// validation lands in `Degenerate`, which behaves as unknown with zero
/// confidence; callers must handle it explicitly rather than crash.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Parsed(Classification),
    Degenerate,
}

/// Classifies one fetched email. Errors are transport-level only (the
/// provider call itself failed); nonsense output is `Verdict::Degenerate`.
pub trait Classifier {
    fn classify(&self, email: &FetchedEmail) -> Result<Verdict>;
}

pub struct LlmClassifier {
    provider: Box<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}

impl Classifier for LlmClassifier {
    fn classify(&self, email: &FetchedEmail) -> Result<Verdict> {
        let prompt = build_prompt(email);
        let raw = self.provider.complete(&prompt, 512)?;
        Ok(parse_verdict(&raw))
    }
}

fn build_prompt(email: &FetchedEmail) -> String {
    format!(
        "You are classifying an email from a job seeker's inbox. Decide whether it is \
         job-search related and extract what it refers to. The email may be in English \
         or French.\n\n\
         Reply with a single JSON object and nothing else, matching exactly:\n\
         {{\n\
           \"type\": \"application\" | \"interview\" | \"rejection\" | \"offer\" | \"unknown\",\n\
           \"company\": string or null,\n\
           \"role\": string or null,\n\
           \"location\": string or null,\n\
           \"confidence\": number between 0 and 1\n\
         }}\n\n\
         Use \"unknown\" with low confidence when the email is not about a specific \
         job application (newsletters, job-alert digests, receipts).\n\n\
         Subject: {}\n\
         From: {}\n\
         Body:\n{}",
        email.subject, email.sender, email.body
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(rename = "type")]
    email_type: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    location: Option<String>,
    confidence: f64,
}

/// Strict schema validation of the model reply. The reply must be one JSON
/// object (a surrounding markdown fence is tolerated); anything else is
/// `Degenerate`.
pub fn parse_verdict(raw: &str) -> Verdict {
    let cleaned = strip_code_fence(raw);

    let parsed: RawVerdict = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("classifier output failed schema validation: {}", e);
            return Verdict::Degenerate;
        }
    };

    let Some(email_type) = EmailType::parse(&parsed.email_type) else {
        log::warn!("classifier returned unknown type '{}'", parsed.email_type);
        return Verdict::Degenerate;
    };

    if !parsed.confidence.is_finite() {
        return Verdict::Degenerate;
    }

    Verdict::Parsed(Classification {
        email_type,
        company: non_empty(parsed.company),
        role: non_empty(parsed.role),
        location: non_empty(parsed.location),
        confidence: parsed.confidence.clamp(0.0, 1.0),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    match rest.rfind("```") {
        Some(idx) => rest[..idx].trim(),
        None => rest.trim(),
    }
}
