use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use super::{ ChatClient, ChatError };
use crate::llm::{ LlmConfig, ModelId, DEFAULT_APP_TITLE, DEFAULT_COMPLETION_URL };
use crate::models::chat::ChatMessage;

/// Client for OpenAI-compatible `chat/completions` endpoints. Defaults to
/// OpenRouter, which also reads the `HTTP-Referer` and `X-Title` headers.
pub struct OpenRouterChatClient {
    http: HttpClient,
    url: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<CompletionChoice>>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl OpenRouterChatClient {
    pub fn new(
        api_key: String,
        url: Option<String>,
        referer: Option<String>,
        app_title: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let url = url.unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string());
        let title = app_title.unwrap_or_else(|| DEFAULT_APP_TITLE.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ChatError::InvalidConfig(format!("Invalid API key format: {}", e)))?
        );
        headers.insert(
            HeaderName::from_static("x-title"),
            HeaderValue::from_str(&title)
                .map_err(|e| ChatError::InvalidConfig(format!("Invalid app title: {}", e)))?
        );
        if let Some(referer) = referer.filter(|r| !r.trim().is_empty()) {
            headers.insert(
                HeaderName::from_static("http-referer"),
                HeaderValue::from_str(&referer)
                    .map_err(|e| ChatError::InvalidConfig(format!("Invalid referer: {}", e)))?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ChatError::InvalidConfig("Completion API key is required".to_string()))?;

        Self::new(
            api_key,
            config.base_url.clone(),
            config.referer.clone(),
            config.app_title.clone(),
            config.request_timeout,
        )
    }
}

/// Pulls the first choice's content out of a success body. A missing field
/// or a blank reply is reported as malformed.
fn parse_reply(model: &ModelId, body: &str) -> Result<String, ChatError> {
    let parsed: CompletionResponse = serde_json
        ::from_str(body)
        .map_err(|e| ChatError::Malformed(format!("{} returned invalid JSON: {}", model, e)))?;

    let content = parsed.choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| ChatError::Malformed(format!("{} returned no choices[0].message.content", model)))?;

    if content.trim().is_empty() {
        return Err(ChatError::Malformed(format!("{} returned an empty reply", model)));
    }
    Ok(content)
}

#[async_trait]
impl ChatClient for OpenRouterChatClient {
    async fn complete(
        &self,
        model: &ModelId,
        messages: &[ChatMessage]
    ) -> Result<String, ChatError> {
        let req = CompletionRequest {
            model: model.as_str(),
            messages,
        };

        debug!("POST {} model={} messages={}", self.url, model, messages.len());
        let resp = self.http.post(&self.url).json(&req).send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ChatError::Status { status, body });
        }

        parse_reply(model, &body)
    }
}
