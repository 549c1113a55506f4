//! Blob handler: serves stored media back out.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
};
use tracing::info;

use crate::config::AppState;
use crate::error::{Error, Result};

/// GET /blobs/{hash}
pub async fn get_blob(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<(HeaderMap, Bytes)> {
    info!("GET /blobs/{}", hash);

    let (data, content_type) = state
        .media
        .get(&hash)
        .await?
        .ok_or_else(|| Error::NotFound(format!("blob {hash}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        content_type
            .parse()
            .map_err(|_| Error::Internal("invalid stored content type".to_string()))?,
    );

    Ok((headers, Bytes::from(data)))
}
