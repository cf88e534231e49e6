//! REST and WebSocket API for the Genesis agent
//!
//! Exposes the agent via HTTP endpoints and a streaming chat socket for the
//! frontend UI.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::Settings;
use crate::models::{ResponseMetadata, StreamChunk};

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    pub error: bool,
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<Agent>,
}

fn conversation_id_or_new(requested: Option<String>) -> String {
    requested
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// =============================
/// HTTP Endpoints
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "agent": "initialized",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> impl IntoResponse {
    let query = req.query.trim();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Query cannot be empty".into())),
        )
            .into_response();
    }

    let conversation_id = conversation_id_or_new(req.conversation_id);
    info!(conversation_id = %conversation_id, "Chat request");

    let result = state.agent.process_request(query, &conversation_id).await;

    Json(ChatResponse {
        response: result.response,
        metadata: result.metadata,
        error: result.error,
        conversation_id,
    })
    .into_response()
}

async fn clear_conversation(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.agent.clear_conversation(&conversation_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({
                "status": "cleared",
                "conversation_id": conversation_id,
            }))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Failed to clear conversation: {}", e))),
        ),
    }
}

/// =============================
/// WebSocket Chat
/// =============================

async fn ws_chat(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ApiState) {
    debug!("WebSocket client connected");

    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let chunk = StreamChunk::Error {
                    message: format!("Invalid message: {}", e),
                };
                if ws_send(&mut socket, &chunk).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if stream_answer(&mut socket, &state.agent, request).await.is_err() {
            break;
        }
    }

    debug!("WebSocket client disconnected");
}

/// Send `start`, every agent chunk, then `end`.
async fn stream_answer(socket: &mut WebSocket, agent: &Agent, request: ChatRequest) -> Result<(), axum::Error> {
    let conversation_id = conversation_id_or_new(request.conversation_id);

    ws_send(
        socket,
        &json!({"type": "start", "conversation_id": conversation_id}),
    )
    .await?;

    let mut chunks = agent.process_request_stream(request.query.trim(), &conversation_id);
    while let Some(chunk) = chunks.next().await {
        ws_send(socket, &chunk).await?;
    }

    ws_send(socket, &json!({"type": "end"})).await
}

async fn ws_send<T: Serialize>(socket: &mut WebSocket, message: &T) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_default();
    socket.send(Message::Text(text)).await
}

/// =============================
/// Router
/// =============================

fn cors_layer(frontend_url: &str) -> CorsLayer {
    match frontend_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        Err(_) => {
            warn!(frontend_url, "FRONTEND_URL is not a valid origin, allowing any origin");
            CorsLayer::permissive()
        }
    }
}

pub fn create_router(agent: Arc<Agent>, frontend_url: &str) -> Router {
    let state = ApiState { agent };

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .route("/chat/:conversation_id", delete(clear_conversation))
        .route("/ws/chat", get(ws_chat))
        .with_state(state)
        .layer(cors_layer(frontend_url))
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<Agent>,
    settings: &Settings,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(agent, &settings.frontend_url);
    let address = settings.bind_address();

    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("API Server listening on http://{}", address);

    axum::serve(listener, router).await?;

    Ok(())
}
