use crate::cli::Args;
use crate::config::prompt::ReloadStatus;
use super::ChatContext;
use std::error::Error;
use std::net::SocketAddr;
use axum::{
    routing::get,
    Router,
    extract::State,
    response::IntoResponse,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Clone)]
struct AppState {
    context: ChatContext,
}

pub fn router(context: ChatContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/models", get(models_handler))
        .route("/api/reload-prompt", get(reload_prompt_handler))
        .layer(cors)
        .with_state(AppState { context })
}

pub async fn start_http_server(
    http_port: u16,
    context: ChatContext,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(context);

    match (args.enable_tls, &args.tls_cert_path, &args.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;

            tokio::spawn(async move {
                let result = axum_server::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service())
                    .await;

                if let Err(e) = result {
                    error!("HTTPS server error: {}", e);
                }
            });

            info!("HTTPS server started with TLS enabled");
        }
        _ => {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e|
                format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
            )?;

            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    error!("HTTP server error: {}", e);
                }
            });

            info!("HTTP server started");
        }
    }

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.context.models
        .iter()
        .map(|m| m.to_string())
        .collect();
    Json(ModelsResponse { models })
}

async fn reload_prompt_handler(State(state): State<AppState>) -> impl IntoResponse {
    let prompt = &state.context.system_prompt;
    let source = prompt
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in".to_string());

    let (code, success, detail) = match prompt.reload_if_changed() {
        Ok(ReloadStatus::Reloaded) => (StatusCode::OK, true, "System prompt reloaded".to_string()),
        Ok(ReloadStatus::Unchanged) => (StatusCode::OK, true, "System prompt unchanged".to_string()),
        Ok(ReloadStatus::NotConfigured) =>
            (StatusCode::OK, true, "No system prompt file configured".to_string()),
        Err(e) => {
            error!("System prompt reload failed: {}", e);
            (StatusCode::BAD_REQUEST, false, format!("Reload error: {}", e))
        }
    };

    (code, Json(ReloadResponse {
        success,
        message: if success { "Reload complete".into() } else { "Reload errors".into() },
        details: Some(vec![format!("source: {}", source), detail]),
    })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::SystemPrompt;
    use crate::llm::chat::{ ChatClient, ChatError };
    use crate::llm::{ ModelId, ModelList };
    use crate::models::chat::ChatMessage;
    use async_trait::async_trait;
    use axum::body::{ to_bytes, Body };
    use axum::http::Request;
    use serde_json::{ json, Value };
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Unreachable;

    #[async_trait]
    impl ChatClient for Unreachable {
        async fn complete(&self, _: &ModelId, _: &[ChatMessage]) -> Result<String, ChatError> {
            Err(ChatError::Malformed("not used".to_string()))
        }
    }

    fn app() -> Router {
        router(ChatContext {
            client: Arc::new(Unreachable),
            models: ModelList::new(["first/model", "second/model"]).unwrap(),
            system_prompt: Arc::new(SystemPrompt::builtin()),
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lists_models_in_priority_order() {
        let (status, body) = get_json("/api/models").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "models": ["first/model", "second/model"] }));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = get_json("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn reload_without_file_is_a_no_op() {
        let (status, body) = get_json("/api/reload-prompt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["details"][1], "No system prompt file configured");
    }
}
