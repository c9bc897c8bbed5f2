use crate::cli::Args;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::session::{ ChatSession, SubmitOutcome };
use super::ChatContext;

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tokio_tungstenite::{ accept_async, WebSocketStream };
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use chrono::Utc;
use log::{ debug, info, warn, error };
use futures::{ SinkExt, StreamExt };
use uuid::Uuid;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const OUTBOUND_BUFFER: usize = 32;

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    // Both ring and aws-lc-rs can end up compiled in; pin one before building.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

pub async fn start_ws_server(
    addr: &str,
    context: ChatContext,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let tls_acceptor = if args.enable_tls {
        match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let config = load_tls_config(cert_path, key_path)?;
                Some(TlsAcceptor::from(config))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        }
    } else {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        None
    };

    let protocol = if tls_acceptor.is_some() { "WSS" } else { "WS" };
    info!("{} server listening on: {}", protocol, addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        info!("Incoming connection from: {}", peer);
        let session = context.new_session();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, session).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, session).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    session: ChatSession
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    match accept_async(stream).await {
        Ok(ws) => {
            handle_connection(peer, ws, session).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

fn encode(msg: &ServerMessage) -> Message {
    match serde_json::to_string(msg) {
        Ok(json) => Message::Text(json),
        Err(e) => {
            error!("Failed to encode server message: {}", e);
            Message::Text(r#"{"type":"error","message":"internal encoding error"}"#.to_string())
        }
    }
}

async fn send(out: &mpsc::Sender<Message>, msg: ServerMessage) -> bool {
    out.send(encode(&msg)).await.is_ok()
}

/// Applies one client message to the session. Chat replies are resolved on
/// a separate task so that `reset` and `history` stay responsive while the
/// models are being tried; its handle is pushed onto `resolvers` so the
/// connection can abort it on teardown.
async fn dispatch(
    session: &ChatSession,
    message: ClientMessage,
    out: &mpsc::Sender<Message>,
    resolvers: &mut Vec<JoinHandle<()>>
) -> bool {
    match message {
        ClientMessage::Chat { content } => {
            match session.begin(&content) {
                Ok(pending) => {
                    if !send(out, ServerMessage::Processing).await {
                        return false;
                    }
                    let out = out.clone();
                    resolvers.retain(|handle| !handle.is_finished());
                    let handle = tokio::spawn(async move {
                        match pending.resolve().await {
                            SubmitOutcome::Replied(reply) => {
                                let msg = ServerMessage::Response {
                                    content: reply.content,
                                    model: reply.model.map(|m| m.to_string()),
                                    timestamp: Utc::now().timestamp(),
                                };
                                if !send(&out, msg).await {
                                    debug!("Connection closed before reply could be delivered");
                                }
                            }
                            SubmitOutcome::Discarded => {
                                debug!("Reply discarded after reset");
                            }
                            SubmitOutcome::Rejected(_) => {}
                        }
                    });
                    resolvers.push(handle);
                    true
                }
                Err(rejection) => {
                    send(out, ServerMessage::Rejected { reason: rejection.to_string() }).await
                }
            }
        }
        ClientMessage::Reset => {
            session.reset();
            send(out, ServerMessage::Cleared).await
        }
        ClientMessage::History => {
            let msg = ServerMessage::History {
                turns: session.turns(),
                pending: session.is_pending(),
                model: session.last_successful_model().map(|m| m.to_string()),
            };
            send(out, msg).await
        }
    }
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    session: ChatSession
)
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    info!("New WebSocket connection: {}", peer);

    let (mut tx, mut rx) = websocket.split();
    let conversation_id = Uuid::new_v4().to_string();
    info!("Assigned conversation ID {} to {}", conversation_id, peer);

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let mut resolvers: Vec<JoinHandle<()>> = Vec::new();
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if let Err(e) = tx.send(message).await {
                error!("Error sending message to {}: {}", peer, e);
                break;
            }
        }
    });

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let error_msg = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    if !send(&out_tx, error_msg).await {
                        error!("Failed to send size limit error to {}", peer);
                    }
                    break;
                }

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_message) => {
                                let keep_open = dispatch(
                                    &session,
                                    client_message,
                                    &out_tx,
                                    &mut resolvers
                                ).await;
                                if !keep_open {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Failed to parse message from {}: {}", peer, e);
                                let error_msg = ServerMessage::Error {
                                    message: format!("Failed to parse message: {}", e),
                                };
                                if !send(&out_tx, error_msg).await {
                                    break;
                                }
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if out_tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }

    // Any reply still in flight belongs to a conversation nobody is reading.
    session.reset();
    for handle in resolvers {
        handle.abort();
        let _ = handle.await;
    }
    drop(out_tx);
    if let Err(e) = writer.await {
        error!("Writer task for {} ended abnormally: {}", peer, e);
    }
    info!("WebSocket connection closed for {} (Conv ID: {})", peer, conversation_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::SystemPrompt;
    use crate::llm::chat::{ ChatClient, ChatError };
    use crate::llm::{ ModelId, ModelList };
    use crate::models::chat::{ ChatMessage, Turn };
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use tokio_tungstenite::tungstenite::protocol::Role;

    struct EchoClient {
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ChatClient for EchoClient {
        async fn complete(
            &self,
            model: &ModelId,
            messages: &[ChatMessage]
        ) -> Result<String, ChatError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("{} says {}", model, last))
        }
    }

    fn context(gate: Option<Arc<Notify>>) -> ChatContext {
        ChatContext {
            client: Arc::new(EchoClient { gate }),
            models: ModelList::new(["echo"]).unwrap(),
            system_prompt: Arc::new(SystemPrompt::from_text("persona")),
        }
    }

    fn chat(content: &str) -> ClientMessage {
        ClientMessage::Chat { content: content.to_string() }
    }

    fn session(gate: Option<Arc<Notify>>) -> ChatSession {
        context(gate).new_session()
    }

    async fn next(rx: &mut mpsc::Receiver<Message>) -> ServerMessage {
        match rx.recv().await {
            Some(Message::Text(json)) => serde_json::from_str(&json).unwrap(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn chat_sends_processing_then_response() {
        let session = session(None);
        let (out, mut rx) = mpsc::channel(8);
        let mut resolvers = Vec::new();

        assert!(dispatch(&session, chat("hi"), &out, &mut resolvers).await);

        assert_eq!(next(&mut rx).await, ServerMessage::Processing);
        match next(&mut rx).await {
            ServerMessage::Response { content, model, .. } => {
                assert_eq!(content, "echo says hi");
                assert_eq!(model.as_deref(), Some("echo"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_and_concurrent_chats_are_rejected() {
        let gate = Arc::new(Notify::new());
        let session = session(Some(gate.clone()));
        let (out, mut rx) = mpsc::channel(8);
        let mut resolvers = Vec::new();

        dispatch(&session, chat("  "), &out, &mut resolvers).await;
        assert!(matches!(next(&mut rx).await, ServerMessage::Rejected { .. }));

        dispatch(&session, chat("one"), &out, &mut resolvers).await;
        assert_eq!(next(&mut rx).await, ServerMessage::Processing);
        dispatch(&session, chat("two"), &out, &mut resolvers).await;
        assert_eq!(
            next(&mut rx).await,
            ServerMessage::Rejected { reason: "a reply is still pending".to_string() }
        );

        gate.notify_one();
        assert!(matches!(next(&mut rx).await, ServerMessage::Response { .. }));
        assert_eq!(session.turns().len(), 2);
    }

    #[tokio::test]
    async fn reset_while_pending_suppresses_reply() {
        let gate = Arc::new(Notify::new());
        let session = session(Some(gate.clone()));
        let (out, mut rx) = mpsc::channel(8);
        let mut resolvers = Vec::new();

        dispatch(&session, chat("hello"), &out, &mut resolvers).await;
        assert_eq!(next(&mut rx).await, ServerMessage::Processing);

        dispatch(&session, ClientMessage::Reset, &out, &mut resolvers).await;
        assert_eq!(next(&mut rx).await, ServerMessage::Cleared);

        gate.notify_one();
        for handle in resolvers.drain(..) {
            handle.await.unwrap();
        }
        assert!(rx.try_recv().is_err(), "reply was sent after reset");

        dispatch(&session, ClientMessage::History, &out, &mut resolvers).await;
        match next(&mut rx).await {
            ServerMessage::History { turns, pending, .. } => {
                assert!(turns.is_empty());
                assert!(!pending);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn history_reports_turns_and_last_model() {
        let session = session(None);
        session.submit("ping").await;
        let (out, mut rx) = mpsc::channel(8);
        let mut resolvers = Vec::new();

        dispatch(&session, ClientMessage::History, &out, &mut resolvers).await;
        assert_eq!(
            next(&mut rx).await,
            ServerMessage::History {
                turns: vec![Turn::user("ping"), Turn::assistant("echo says ping")],
                pending: false,
                model: Some("echo".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn disconnect_does_not_wait_for_pending_reply() {
        let session = session(Some(Arc::new(Notify::new())));
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let mut client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let connection = tokio::spawn(handle_connection(peer, server_ws, session.clone()));

        client_ws
            .send(Message::Text(r#"{"type":"chat","content":"hello"}"#.to_string())).await
            .unwrap();
        match client_ws.next().await {
            Some(Ok(Message::Text(json))) => {
                assert_eq!(
                    serde_json::from_str::<ServerMessage>(&json).unwrap(),
                    ServerMessage::Processing
                );
            }
            other => panic!("unexpected frame {:?}", other),
        }
        drop(client_ws);

        tokio::time::timeout(Duration::from_secs(2), connection).await
            .expect("connection task outlived the client")
            .unwrap();
        assert!(!session.is_pending());
        assert!(session.turns().is_empty());
    }

    #[test]
    fn tls_config_reports_missing_and_empty_files() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let cert = cert.to_str().unwrap();
        let key = key.to_str().unwrap();

        let err = load_tls_config("/nonexistent/cert.pem", key).unwrap_err();
        assert!(err.to_string().contains("Failed to open TLS certificate file"));

        let err = load_tls_config(cert, "/nonexistent/key.pem").unwrap_err();
        assert!(err.to_string().contains("Failed to open TLS key file"));

        let err = load_tls_config(cert, key).unwrap_err();
        assert_eq!(err.to_string(), "No PKCS8 private key found in key file");
    }

    #[tokio::test]
    async fn tls_without_key_path_refuses_to_start() {
        let args = <Args as clap::Parser>::try_parse_from([
            "portfolio-chat",
            "--enable-tls",
            "--tls-cert-path",
            "/tmp/cert.pem",
        ]).unwrap();

        let err = start_ws_server("127.0.0.1:0", context(None), args).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing TLS certificate or key path");
    }
}
