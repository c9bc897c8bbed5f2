use crate::config::prompt::SystemPrompt;
use crate::llm::chat::ChatClient;
use crate::llm::fallback::first_success;
use crate::llm::{ ModelId, ModelList };
use crate::models::chat::{ build_request_messages, ChatMessage, Turn };

use log::{ info, warn };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use thiserror::Error;

pub const FALLBACK_MESSAGE: &str =
    "Sorry, all models are currently unavailable. Please try again later.";

#[derive(Debug, Default)]
struct ConversationState {
    turns: Vec<Turn>,
    pending: bool,
    /// Bumped by `reset`; a submission only applies its reply if the
    /// generation it started under is still current.
    generation: u64,
    last_model: Option<ModelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("message is empty")]
    Empty,
    #[error("a reply is still pending")]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    /// `None` when every model failed and the fallback message was used.
    pub model: Option<ModelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Replied(Reply),
    Rejected(Rejection),
    /// The conversation was reset while the models were being tried.
    Discarded,
}

/// A conversation with the portfolio assistant.
///
/// Cloning is cheap and every clone shares the same conversation, so one
/// clone can resolve a submission while another handles `reset`. The state
/// lock is never held across an await.
#[derive(Clone)]
pub struct ChatSession {
    client: Arc<dyn ChatClient>,
    models: Arc<ModelList>,
    system_prompt: Arc<SystemPrompt>,
    state: Arc<Mutex<ConversationState>>,
}

/// A user turn that has been appended and is waiting for its reply.
#[must_use = "the session stays pending until the submission is resolved"]
pub struct PendingSubmission {
    session: ChatSession,
    generation: u64,
    messages: Vec<ChatMessage>,
    resolved: bool,
}

impl ChatSession {
    pub fn new(
        client: Arc<dyn ChatClient>,
        models: ModelList,
        system_prompt: Arc<SystemPrompt>
    ) -> Self {
        Self {
            client,
            models: Arc::new(models),
            system_prompt,
            state: Arc::new(Mutex::new(ConversationState::default())),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates `text` and appends it as a user turn. The returned handle
    /// must be resolved to obtain the assistant reply.
    pub fn begin(&self, text: &str) -> Result<PendingSubmission, Rejection> {
        if text.trim().is_empty() {
            return Err(Rejection::Empty);
        }

        let mut state = self.lock_state();
        if state.pending {
            return Err(Rejection::Pending);
        }

        state.turns.push(Turn::user(text));
        state.pending = true;

        let system_prompt = self.system_prompt.current();
        let messages = build_request_messages(&system_prompt, &state.turns);

        Ok(PendingSubmission {
            session: self.clone(),
            generation: state.generation,
            messages,
            resolved: false,
        })
    }

    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        match self.begin(text) {
            Ok(pending) => pending.resolve().await,
            Err(rejection) => SubmitOutcome::Rejected(rejection),
        }
    }

    /// Clears the conversation. A submission still in flight will have its
    /// reply discarded.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.turns.clear();
        state.pending = false;
        state.generation = state.generation.wrapping_add(1);
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.lock_state().turns.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock_state().pending
    }

    pub fn last_successful_model(&self) -> Option<ModelId> {
        self.lock_state().last_model.clone()
    }

    pub fn models(&self) -> &ModelList {
        &self.models
    }
}

impl PendingSubmission {
    /// Tries each model in priority order and appends exactly one assistant
    /// turn, unless the session was reset in the meantime.
    pub async fn resolve(mut self) -> SubmitOutcome {
        let client = &self.session.client;
        let messages = &self.messages;
        let models = self.session.models().as_slice();

        let outcome = first_success(models, |model| client.complete(model, messages)).await;

        let reply = match outcome {
            Some((model, content)) => Reply { content, model: Some(model.clone()) },
            None => {
                warn!("All {} models failed, replying with fallback message", models.len());
                Reply { content: FALLBACK_MESSAGE.to_string(), model: None }
            }
        };

        self.resolved = true;
        let mut state = self.session.lock_state();
        if state.generation != self.generation {
            info!("Conversation was reset while waiting for a reply, discarding it");
            return SubmitOutcome::Discarded;
        }

        state.turns.push(Turn::assistant(reply.content.clone()));
        state.pending = false;
        if let Some(model) = &reply.model {
            state.last_model = Some(model.clone());
        }
        SubmitOutcome::Replied(reply)
    }
}

impl Drop for PendingSubmission {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let mut state = self.session.lock_state();
        if state.generation == self.generation && state.pending {
            warn!("Submission dropped before a reply arrived, releasing the session");
            state.pending = false;
        }
    }
}
