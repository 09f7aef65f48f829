//! Environment-driven configuration. `.env` is loaded first when present.

use std::time::Duration;

use tracing::warn;

use crate::bfl::{BflConfig, WaitPolicy, DEMO_KEY};
use crate::openai::OpenAiConfig;
use crate::workflow::WorkflowSettings;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub bfl: BflConfig,
    pub openai: OpenAiConfig,
    pub workflow: WorkflowSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bfl: BflConfig::default(),
            openai: OpenAiConfig::default(),
            workflow: WorkflowSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unparseable values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse = |key: &str| get(key).and_then(|v| v.parse::<u64>().ok());
        let defaults = Self::default();

        let api_key = |key: &str| {
            get(key).unwrap_or_else(|| {
                warn!("{key} not set, running in demo mode");
                DEMO_KEY.to_string()
            })
        };

        let bfl = BflConfig {
            api_key: api_key("BFL_API_KEY"),
            submit_url: get("BFL_SUBMIT_URL").unwrap_or(defaults.bfl.submit_url),
            poll_hosts: get("BFL_POLL_HOSTS")
                .map(|hosts| {
                    hosts.split(',').map(str::trim).filter(|h| !h.is_empty()).map(String::from).collect()
                })
                .filter(|hosts: &Vec<String>| !hosts.is_empty())
                .unwrap_or(defaults.bfl.poll_hosts),
        };

        let openai = OpenAiConfig {
            api_key: api_key("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai.base_url),
            model: get("OPENAI_MODEL").unwrap_or(defaults.openai.model),
            max_tokens: get("OPENAI_MAX_TOKENS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.openai.max_tokens),
            temperature: defaults.openai.temperature,
        };

        let secs = |key: &str, default: Duration| parse(key).map(Duration::from_secs).unwrap_or(default);
        let wait = WaitPolicy {
            max_wait: secs("IMAGE_MAX_WAIT_SECS", defaults.workflow.wait.max_wait),
            interval: parse("IMAGE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.workflow.wait.interval),
            poll_timeout: secs("BFL_POLL_TIMEOUT_SECS", defaults.workflow.wait.poll_timeout),
        };
        let workflow = WorkflowSettings {
            submit_timeout: secs("BFL_SUBMIT_TIMEOUT_SECS", defaults.workflow.submit_timeout),
            copy_timeout: secs("OPENAI_TIMEOUT_SECS", defaults.workflow.copy_timeout),
            wait_for_image: get("WAIT_FOR_IMAGE")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.workflow.wait_for_image),
            wait,
            default_tone: get("DEFAULT_COPY_TONE").unwrap_or(defaults.workflow.default_tone),
        };

        Self {
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
            bfl,
            openai,
            workflow,
        }
    }
}
