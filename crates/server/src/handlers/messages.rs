//! Message handlers: send, history, and the contacts sidebar.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use duplex_common::{Message, SendMessageRequest, UserInfo};

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};

/// POST /messages/send/{receiver_id}
pub async fn send_message(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(receiver_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>> {
    info!("POST /messages/send/{}", receiver_id);

    // Both parties must exist at creation time
    state
        .auth
        .get_user(&receiver_id)
        .await?
        .ok_or_else(|| Error::Validation(format!("unknown receiver {receiver_id}")))?;

    let message = state
        .delivery
        .deliver(ctx.user_id(), &receiver_id, req)
        .await?;

    Ok(Json(message))
}

/// GET /messages/{peer_id}
pub async fn get_history(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    let messages = state
        .store
        .history(ctx.user_id(), &peer_id)
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;
    Ok(Json(messages))
}

/// GET /messages/users
pub async fn list_contacts(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<UserInfo>>> {
    let users = state.auth.list_users_except(ctx.user_id()).await?;
    Ok(Json(users))
}
