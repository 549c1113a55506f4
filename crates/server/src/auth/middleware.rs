use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};

/// Require a valid `Authorization: Bearer <token>` header and stash the
/// resolved user identity in request extensions as [`Ctx`].
pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    let auth_header = match req.headers().get(header::AUTHORIZATION) {
        Some(h) => h.to_str().map_err(|_| Error::AuthFailTokenWrongFormat)?,
        None => return Err(Error::AuthFailNoToken),
    };

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(Error::AuthFailTokenWrongFormat)?;

    let user = state
        .auth
        .validate_session(token)
        .await
        .map_err(|_| Error::LoginFail)?;

    req.extensions_mut().insert(Ctx::new(user.id));

    Ok(next.run(req).await)
}
