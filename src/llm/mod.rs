pub mod chat;
pub mod fallback;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_COMPLETION_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_APP_TITLE: &str = "Sashi Portfolio Chat";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_MODELS: &[&str] = &[
    "nvidia/nemotron-3-nano-30b-a3b:free",
    "mistralai/devstral-2512:free",
    "kwaipilot/kat-coder-pro:free",
    "qwen/qwen3-coder:free",
    "google/gemini-2.0-flash-exp:free",
];

/// Name of a backend completion model, passed through to the endpoint as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelListError {
    #[error("model list must contain at least one model")]
    Empty,
    #[error("model identifier at position {0} is blank")]
    BlankIdentifier(usize),
}

impl FromStr for ModelId {
    type Err = ModelListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ModelListError::BlankIdentifier(0));
        }
        Ok(ModelId(trimmed.to_string()))
    }
}

/// Ordered, non-empty list of models. Position is priority: index 0 is tried
/// first on every submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModelList(Vec<ModelId>);

impl ModelList {
    pub fn new<I, S>(ids: I) -> Result<Self, ModelListError>
        where I: IntoIterator<Item = S>, S: AsRef<str>
    {
        let models = ids
            .into_iter()
            .enumerate()
            .map(|(position, id)| {
                id.as_ref()
                    .parse::<ModelId>()
                    .map_err(|_| ModelListError::BlankIdentifier(position))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if models.is_empty() {
            return Err(ModelListError::Empty);
        }
        Ok(ModelList(models))
    }

    pub fn as_slice(&self) -> &[ModelId] {
        &self.0
    }

    pub fn first(&self) -> &ModelId {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelId> {
        self.0.iter()
    }
}

impl Default for ModelList {
    fn default() -> Self {
        ModelList(DEFAULT_MODELS.iter().map(|id| ModelId(id.to_string())).collect())
    }
}

impl FromStr for ModelList {
    type Err = ModelListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelList::new(s.split(','))
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub referer: Option<String>,
    pub app_title: Option<String>,
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            referer: None,
            app_title: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
