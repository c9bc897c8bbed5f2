pub mod api;
pub mod websocket;

use crate::cli::Args;
use crate::config::prompt::SystemPrompt;
use crate::llm::chat::ChatClient;
use crate::llm::ModelList;
use crate::session::ChatSession;
use std::error::Error;
use std::sync::Arc;

/// Everything a connection needs to open its own chat session.
#[derive(Clone)]
pub struct ChatContext {
    pub client: Arc<dyn ChatClient>,
    pub models: ModelList,
    pub system_prompt: Arc<SystemPrompt>,
}

impl ChatContext {
    pub fn new_session(&self) -> ChatSession {
        ChatSession::new(
            Arc::clone(&self.client),
            self.models.clone(),
            Arc::clone(&self.system_prompt)
        )
    }
}

pub struct Server {
    addr: String,
    context: ChatContext,
    args: Args,
}

impl Server {
    pub fn new(addr: String, context: ChatContext, args: Args) -> Self {
        Self {
            addr,
            context,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        }

        self.start_ws_server().await?;

        Ok(())
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(http_port, self.context.clone(), self.args.clone()).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(&self.addr, self.context.clone(), self.args.clone()).await
    }
}
