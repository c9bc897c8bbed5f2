use clap::Parser;
use std::time::Duration;
use url::Url;
use crate::llm::{ LlmConfig, ModelList, DEFAULT_APP_TITLE, DEFAULT_COMPLETION_URL };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Completion Endpoint Args ---
    /// Full URL of the OpenAI-compatible chat completions endpoint
    #[arg(long, env = "CHAT_BASE_URL", default_value = DEFAULT_COMPLETION_URL)]
    pub chat_base_url: String,

    /// API Key for the completion endpoint (e.g., an OpenRouter key)
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Comma-separated model identifiers in fallback priority order.
    /// Defaults to the built-in list of free OpenRouter models.
    #[arg(long, env = "CHAT_MODELS")]
    pub chat_models: Option<String>,

    /// Seconds to wait for each model before moving on to the next one
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "20")]
    pub request_timeout_secs: u64,

    /// Site URL sent as HTTP-Referer for OpenRouter attribution
    #[arg(long, env = "APP_REFERER")]
    pub app_referer: Option<String>,

    /// Application name sent as X-Title for OpenRouter attribution
    #[arg(long, env = "APP_TITLE", default_value = DEFAULT_APP_TITLE)]
    pub app_title: String,

    /// Path to a text file holding the system instruction. The built-in persona is used when unset.
    #[arg(long, env = "SYSTEM_PROMPT_PATH")]
    pub system_prompt_path: Option<String>,

    // --- Server Args ---
    /// Host address and port for the WebSocket chat server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port for the HTTP API (health, models, prompt reload). Disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn model_list(&self) -> Result<ModelList, String> {
        match self.chat_models.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(list) => list.parse().map_err(|e| format!("Invalid CHAT_MODELS '{}': {}", list, e)),
            None => Ok(ModelList::default()),
        }
    }

    pub fn llm_config(&self) -> Result<LlmConfig, String> {
        Url::parse(&self.chat_base_url).map_err(|e|
            format!("Invalid CHAT_BASE_URL '{}': {}", self.chat_base_url, e)
        )?;

        Ok(LlmConfig {
            api_key: Some(self.chat_api_key.clone()).filter(|k| !k.is_empty()),
            base_url: Some(self.chat_base_url.clone()),
            referer: self.app_referer.clone(),
            app_title: Some(self.app_title.clone()),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        })
    }
}
