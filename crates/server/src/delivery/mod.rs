//! Delivery router: persist a message, then push it live if possible.
//!
//! The ordering contract: validation happens before any side effect, an
//! image upload happens before the persist (so a failed upload persists
//! nothing), and the persist must complete before the push is attempted.
//! A push failure never rolls back a successful persist; the receiver will
//! fetch history on reconnect.

use std::sync::Arc;

use base64::Engine;
use tracing::debug;

use duplex_common::{Message, SendMessageRequest, ServerEvent};

use crate::error::Error;
use crate::media::MediaStore;
use crate::registry::ConnectionRegistry;
use crate::store::{MessageStore, NewMessage};

pub struct DeliveryRouter {
    store: Arc<dyn MessageStore>,
    media: Arc<dyn MediaStore>,
    registry: Arc<ConnectionRegistry>,
}

impl DeliveryRouter {
    pub fn new(
        store: Arc<dyn MessageStore>,
        media: Arc<dyn MediaStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            store,
            media,
            registry,
        }
    }

    /// Deliver a message from `sender_id` to `receiver_id`.
    ///
    /// Returns the persisted record so the sender's client can append it
    /// optimistically without waiting for any live push. The receiver being
    /// offline is not an error; the message is durable either way.
    pub async fn deliver(
        &self,
        sender_id: &str,
        receiver_id: &str,
        payload: SendMessageRequest,
    ) -> Result<Message, Error> {
        let text = payload
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let image = payload.image.filter(|i| !i.is_empty());

        if text.is_none() && image.is_none() {
            return Err(Error::Validation(
                "message must contain text or an image".to_string(),
            ));
        }

        let image_url = match image {
            Some(raw) => {
                let (bytes, content_type) = decode_image_payload(&raw)?;
                let url = self
                    .media
                    .upload(bytes, &content_type)
                    .await
                    .map_err(|e| Error::Upload(e.to_string()))?;
                Some(url)
            }
            None => None,
        };

        let message = self
            .store
            .save(NewMessage {
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                text,
                image_url,
            })
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        // Registry lookup only after the persist has settled; this is a
        // fast in-memory read, no lock is held while persisting.
        match self.registry.lookup(receiver_id) {
            Some(tx) => {
                if tx
                    .send(ServerEvent::MessageDelivered {
                        message: message.clone(),
                    })
                    .is_err()
                {
                    // Connection dropped mid-emit. The message is already
                    // durable; the only loss is real-time immediacy.
                    debug!(receiver = %receiver_id, "receiver connection closed mid-delivery");
                }
            }
            None => {
                debug!(receiver = %receiver_id, "receiver offline, message stays durable");
            }
        }

        Ok(message)
    }
}

/// Decode a base64 image payload, tolerating `data:<type>;base64,` URLs
/// as sent by browser clients.
pub(crate) fn decode_image_payload(raw: &str) -> Result<(Vec<u8>, String), Error> {
    let (content_type, b64) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (content_type, data) = rest
                .split_once(";base64,")
                .ok_or_else(|| Error::Validation("malformed image data url".to_string()))?;
            (content_type.to_string(), data)
        }
        None => ("image/png".to_string(), raw),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| Error::Validation("image is not valid base64".to_string()))?;

    if bytes.is_empty() {
        return Err(Error::Validation("image payload is empty".to_string()));
    }

    Ok((bytes, content_type))
}
