use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{IngestOptions, ListItemsQuery};
use domain::{Address, ConversationId, ItemId, ThreadId, UserId};

use crate::dto::{ConversationDto, ItemDto, ThreadDto};
use crate::error::ApiError;
use crate::state::AppState;
use crate::stream;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/inbox", post(ingest_item).get(list_inbox))
        .route("/inbox/read", post(mark_item_read))
        .route("/chat/typing", post(post_typing))
        .route("/chat/read", post(post_read))
        .route("/chat/self", post(ensure_self_chat))
        .route("/conversations", get(list_conversations))
        .route("/conversations/{conversation_id}", get(get_conversation))
        .route("/stream", get(stream::subscribe_stream))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ingest_item(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, ApiError> {
    let options = IngestOptions {
        actor_address: body
            .get("address")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        actor_user_id: body
            .get("userId")
            .and_then(JsonValue::as_str)
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(UserId::from),
        bypass_rate_limit: false,
    };

    let outcome = state.inbox_service.ingest(body, options).await?;
    let content = state.inbox_service.effective_content(&outcome.item)?;

    let status = if outcome.deduped {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(json!({
            "item": ItemDto::from_item(&outcome.item, content),
            "thread": ThreadDto::from(&outcome.thread),
            "deduped": outcome.deduped,
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInboxQuery {
    thread_id: Option<Uuid>,
    conversation_id: Option<Uuid>,
    limit: Option<u32>,
}

async fn list_inbox(
    State(state): State<AppState>,
    Query(query): Query<ListInboxQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.thread_id.is_none() && query.conversation_id.is_none() {
        return Err(ApiError::bad_request("thread_or_conversation_required"));
    }

    let items = state
        .inbox_service
        .list_items(ListItemsQuery {
            thread_id: query.thread_id.map(ThreadId::from),
            conversation_id: query.conversation_id.map(ConversationId::from),
            limit: query.limit,
        })
        .await?;

    let mut dtos = Vec::with_capacity(items.len());
    for item in &items {
        let content = state.inbox_service.effective_content(item)?;
        dtos.push(ItemDto::from_item(item, content));
    }

    Ok(Json(json!({ "items": dtos })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkItemReadPayload {
    item_id: Uuid,
    address: String,
}

async fn mark_item_read(
    State(state): State<AppState>,
    Json(payload): Json<MarkItemReadPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&payload.address)?;
    let item = state
        .inbox_service
        .mark_item_read(ItemId::from(payload.item_id), &address)
        .await?;
    let content = state.inbox_service.effective_content(&item)?;
    Ok(Json(json!({ "ok": true, "item": ItemDto::from_item(&item, content) })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    address: String,
    conversation_id: Uuid,
    typing: bool,
}

async fn post_typing(
    State(state): State<AppState>,
    Json(payload): Json<TypingPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&payload.address)?;
    state
        .notifier
        .notify_typing(
            ConversationId::from(payload.conversation_id),
            &address,
            payload.typing,
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadPayload {
    conversation_id: Uuid,
    address: String,
}

async fn post_read(
    State(state): State<AppState>,
    Json(payload): Json<ReadPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&payload.address)?;
    let count = state
        .inbox_service
        .mark_conversation_read(ConversationId::from(payload.conversation_id), &address)
        .await?;
    Ok(Json(json!({ "ok": true, "count": count })))
}

#[derive(Debug, Deserialize)]
struct SelfChatPayload {
    address: String,
}

async fn ensure_self_chat(
    State(state): State<AppState>,
    Json(payload): Json<SelfChatPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&payload.address)?;
    let conversation = state
        .conversation_service
        .ensure_favorites_conversation(&address)
        .await?;
    Ok(Json(json!({
        "ok": true,
        "conversation": ConversationDto::from(&conversation),
    })))
}

#[derive(Debug, Deserialize)]
struct AddressQuery {
    address: Option<String>,
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(query.address.as_deref().unwrap_or_default())?;
    let conversations = state.conversation_service.list_overview(&address).await?;
    Ok(Json(json!({
        "conversations": conversations,
        "metrics": state.metrics.snapshot(),
    })))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<AddressQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(query.address.as_deref().unwrap_or_default())?;
    let (conversation, messages) = state
        .conversation_service
        .history(ConversationId::from(conversation_id), &address)
        .await?;
    Ok(Json(json!({
        "conversation": ConversationDto::from(&conversation),
        "messages": messages,
    })))
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::parse(raw).map_err(|_| ApiError::bad_request("address_required"))
}
