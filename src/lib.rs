pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;

use cli::Args;
use config::prompt::SystemPrompt;
use llm::chat::new_client as new_chat_client;
use log::info;
use server::{ ChatContext, Server };
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let models = args.model_list()?;
    let llm_config = args.llm_config()?;
    let system_prompt = SystemPrompt::from_optional_path(args.system_prompt_path.as_deref())?;

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP API Port: {:?}", args.http_port);
    info!("Completion Endpoint: {}", args.chat_base_url);
    info!("Model Priority: {}", models.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(" -> "));
    info!("Request Timeout: {:?} per model", llm_config.request_timeout);
    info!("App Title: {}", args.app_title);
    info!("App Referer: {}", args.app_referer.as_deref().unwrap_or("(none)"));
    info!(
        "System Prompt: {}",
        system_prompt.path().map(|p| p.display().to_string()).unwrap_or_else(|| "built-in".into())
    );
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let client = new_chat_client(&llm_config)?;
    let context = ChatContext {
        client,
        models,
        system_prompt: Arc::new(system_prompt),
    };

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, context, args);
    server.run().await?;

    Ok(())
}
