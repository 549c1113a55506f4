//! Auth handlers

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use duplex_common::{AuthResponse, LoginRequest, SignupRequest, UpdateProfileRequest, UserInfo};

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::delivery::decode_image_payload;
use crate::error::{Error, Result};

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/signup - {}", req.email);

    state
        .auth
        .signup(&req.email, &req.username, &req.password)
        .await
        .map_err(|e| Error::Validation(e.to_string()))?;

    // Open a session right away so the client lands logged in
    let (user, session) = state
        .auth
        .login(&req.email, &req.password)
        .await
        .map_err(|_| Error::LoginFail)?;

    Ok(Json(AuthResponse {
        token: session.token,
        user,
    }))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/login - {}", req.email);

    let (user, session) = state
        .auth
        .login(&req.email, &req.password)
        .await
        .map_err(|_| Error::LoginFail)?;

    Ok(Json(AuthResponse {
        token: session.token,
        user,
    }))
}

/// POST /auth/logout
///
/// Public route reading its own Authorization header, so logging out with
/// an already-expired token still succeeds (idempotent).
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        state.auth.logout(token).await?;
    }
    Ok(StatusCode::OK)
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, ctx: Ctx) -> Result<Json<UserInfo>> {
    let user = state
        .auth
        .get_user(ctx.user_id())
        .await?
        .ok_or_else(|| Error::NotFound("user".to_string()))?;
    Ok(Json(user))
}

/// PUT /auth/update-profile
///
/// The avatar goes through the same media path as message images: upload
/// first, persist only the resulting URL.
pub async fn update_profile(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserInfo>> {
    info!("PUT /auth/update-profile - {}", ctx.user_id());

    let (bytes, content_type) = decode_image_payload(&req.avatar)?;
    let url = state
        .media
        .upload(bytes, &content_type)
        .await
        .map_err(|e| Error::Upload(e.to_string()))?;

    let user = state.auth.update_avatar(ctx.user_id(), &url).await?;
    Ok(Json(user))
}
