//! Shared wire protocol and data model for Duplex.
//!
//! Everything that crosses the client/server boundary lives here: the
//! message record, the push events emitted over the WebSocket, and the
//! request/response bodies of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message between exactly two users.
///
/// Immutable once created: the server assigns `id` and `created_at` at
/// persist time and never mutates or deletes a message afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    /// URL of an uploaded image, substituted by the server for the raw
    /// payload before persisting. Never the raw bytes.
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public user info (no credentials).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Events pushed by the server over the per-client WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full-state presence broadcast: the complete online set, emitted to
    /// every connection on any registry change. Clients replace their
    /// cached set wholesale.
    PresenceUpdate { online: Vec<String> },
    /// A message was just persisted and the receiver is this connection's
    /// user. Carries the full persisted record.
    MessageDelivered { message: Message },
}

/// Body of `POST /messages/send/{receiver_id}`.
///
/// At least one of `text` / `image` must be present. `image` is a base64
/// payload (optionally a `data:` URL); the server uploads it and stores
/// only the resulting URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Body of `PUT /auth/update-profile`. `avatar` is a base64 image payload,
/// same encoding as [`SendMessageRequest::image`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub avatar: String,
}

/// JSON error envelope returned by the server on any failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_event_wire_format_is_kebab_tagged() {
        let event = ServerEvent::PresenceUpdate {
            online: vec!["u1".to_string(), "u2".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "presence-update");
        assert_eq!(json["data"]["online"][0], "u1");

        let msg = Message {
            id: "m1".to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "u2".to_string(),
            text: Some("hi".to_string()),
            image_url: None,
            created_at: Utc::now(),
        };
        let event = ServerEvent::MessageDelivered { message: msg };
        let json = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
