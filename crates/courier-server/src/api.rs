use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use courier_shared::constants::{CHATS_PAGE_SIZE, MESSAGES_PAGE_SIZE, SEARCH_RESULTS_LIMIT};
use courier_shared::protocol::{NewMessageEvent, WireEvent};
use courier_shared::types::now_millis;
use courier_store::{Chat, Message, SeedConfig, SeedReport, Table};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::{with_db, SharedDatabase};
use crate::error::ServerError;
use crate::metrics::PrometheusMetrics;
use crate::server::ConnectionServer;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDatabase,
    pub server: Arc<ConnectionServer>,
    pub metrics: Arc<PrometheusMetrics>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/:chat_id/read", put(mark_read))
        .route("/api/messages", get(list_messages).post(send_message))
        .route("/api/messages/search", get(search_messages))
        .route("/api/database/seed", post(seed_database))
        .route("/api/connection/disconnect", post(simulate_disconnect))
        .route("/metrics", get(metrics_text))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connections: usize,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
struct DisconnectResponse {
    ok: bool,
    closed: usize,
}

#[derive(Deserialize)]
struct PageQuery {
    offset: Option<u32>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesQuery {
    chat_id: String,
    before_ts: Option<i64>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    chat_id: Option<String>,
    query: String,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct CreateChatRequest {
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    chat_id: String,
    body: String,
}

/// Trimmed `value`, or 400 when nothing is left.
fn required(field: &str, value: &str) -> Result<String, ServerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServerError::BadRequest(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.server.hub().connection_count().await,
    })
}

async fn list_chats(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Chat>>, ServerError> {
    let offset = page.offset.unwrap_or(0);
    let limit = page.limit.unwrap_or(CHATS_PAGE_SIZE);
    let chats = with_db(&state.db, move |db| db.list_chats(offset, limit)).await?;
    Ok(Json(chats))
}

async fn create_chat(
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), ServerError> {
    let title = required("title", &request.title)?;
    let chat = with_db(&state.db, move |db| db.create_chat(&title)).await?;

    info!(chat_id = %chat.id, "chat created via API");
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<OkResponse>, ServerError> {
    with_db(&state.db, move |db| db.mark_read(&chat_id)).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let before_ts = query.before_ts.unwrap_or_else(|| now_millis() + 1);
    let limit = query.limit.unwrap_or(MESSAGES_PAGE_SIZE);
    let messages = with_db(&state.db, move |db| {
        db.list_messages(&query.chat_id, before_ts, limit)
    })
    .await?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let chat_id = required("chatId", &request.chat_id)?;
    let body = required("body", &request.body)?;

    let (message, chat_title) = with_db(&state.db, move |db| {
        let message = db.send_message(&chat_id, &body)?;
        let title = db.get_chat(&chat_id)?.map(|chat| chat.title).unwrap_or_default();
        Ok((message, title))
    })
    .await?;

    let event = NewMessageEvent::new(message.clone().into(), chat_title);
    state
        .server
        .hub()
        .broadcast(&WireEvent::NewMessage(event))
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn search_messages(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let limit = query.limit.unwrap_or(SEARCH_RESULTS_LIMIT);
    // An empty chatId searches every chat.
    let chat_id = query.chat_id.filter(|id| !id.trim().is_empty());
    let results = with_db(&state.db, move |db| {
        db.search_messages(chat_id.as_deref(), &query.query, limit)
    })
    .await?;
    Ok(Json(results))
}

async fn seed_database(State(state): State<AppState>) -> Result<Json<SeedReport>, ServerError> {
    let report = with_db(&state.db, |db| db.seed_database(&SeedConfig::default())).await?;
    Ok(Json(report))
}

async fn simulate_disconnect(State(state): State<AppState>) -> Json<DisconnectResponse> {
    let closed = state.server.simulate_disconnect().await;
    Json(DisconnectResponse { ok: true, closed })
}

async fn metrics_text(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    // Row counts are sampled on scrape.
    with_db(&state.db, |db| {
        db.count_rows(Table::Chats)?;
        db.count_rows(Table::Messages)?;
        Ok(())
    })
    .await?;

    let text = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        text,
    ))
}

pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(addr = %addr, "Starting HTTP listener");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { crate::shutdown::cancelled(&mut shutdown).await })
        .await?;

    Ok(())
}
