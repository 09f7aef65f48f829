use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::bfl::DEMO_KEY;
use crate::error::ProviderError;
use crate::models::{AdCopy, Persona, Product, Profile};

const PROVIDER: &str = "openai";

pub const DEFAULT_COPY_BODY: &str = "Discover our latest drop, styled for you. Shop now.";

const SYSTEM_PROMPT: &str = "You are an expert fashion copywriter. Write concise, brand-appropriate, \
action-oriented marketing copy. Reply in exactly two lines: 'Subject: <subject line>' and \
'Body: <one or two sentences ending with a call to action>'.";

/// Remote copy generation as seen by the workflow.
#[async_trait]
pub trait CopyGenerator: Send + Sync {
    /// Fails with `Timeout` when no response arrives within `timeout`.
    async fn generate(
        &self,
        product: &Product,
        persona: Persona,
        profile: &Profile,
        tone: &str,
        timeout: Duration,
    ) -> Result<AdCopy, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: DEMO_KEY.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self { client: Client::new(), config }
    }

    fn user_prompt(product: &Product, persona: Persona, profile: &Profile, tone: &str) -> String {
        let profile_json = serde_json::to_string(profile).unwrap_or_default();
        format!(
            "Product: {title} ({category}) from {brand}, {band} price band, {launch} launch, colorways {colors}.\n\
             Persona: {persona}.\n\
             Customer profile: {profile_json}\n\
             Tone: {tone}.",
            title = product.display_title(),
            category = product.category,
            brand = product.brand_name,
            band = product.price_band,
            launch = product.launch_type,
            colors = product.colorways.join(", "),
        )
    }
}

#[async_trait]
impl CopyGenerator for OpenAiClient {
    async fn generate(
        &self,
        product: &Product,
        persona: Persona,
        profile: &Profile,
        tone: &str,
        timeout: Duration,
    ) -> Result<AdCopy, ProviderError> {
        if self.config.api_key == DEMO_KEY {
            info!("Using demo mode - returning default copy");
            return Ok(default_copy(product));
        }

        let payload = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::user_prompt(product, persona, profile, tone) }
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature
        });

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        info!(%persona, "Generating copy with {}", self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, timeout))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, timeout))?;

        if !status.is_success() {
            error!("❌ Copy generation failed with status {}: {}", status, response_text);
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: response_text,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Decode { provider: PROVIDER, message: e.to_string() })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|t| !t.trim().is_empty());

        match text {
            Some(text) => {
                debug!("📥 Copy response: {}", text);
                Ok(parse_copy(&text, product))
            }
            None => {
                info!("⚠️ No completion text, using default copy");
                Ok(default_copy(product))
            }
        }
    }
}

pub fn default_copy(product: &Product) -> AdCopy {
    AdCopy { subject: product.display_title(), body: DEFAULT_COPY_BODY.to_string() }
}

/// Splits "Subject: ...\nBody: ..." output. Unstructured text becomes the body.
pub fn parse_copy(text: &str, product: &Product) -> AdCopy {
    let mut subject = None;
    let mut body_lines = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = strip_label(line, "subject:") {
            subject = Some(rest.to_string());
        } else if let Some(rest) = strip_label(line, "body:") {
            if !rest.is_empty() {
                body_lines.push(rest.to_string());
            }
        } else {
            body_lines.push(line.to_string());
        }
    }

    AdCopy {
        subject: subject.unwrap_or_else(|| product.display_title()),
        body: body_lines.join(" "),
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let line = line.trim_start_matches(['*', '#', ' ']);
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| line[label.len()..].trim_matches(['*', '"', ' ']))
}
