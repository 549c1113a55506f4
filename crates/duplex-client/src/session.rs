//! Client session: one live WebSocket per authenticated session, plus the
//! listener set that server events are dispatched through.
//!
//! The listener set holds at most one listener per event kind, and every
//! reconnect clears the whole set before anything re-attaches. Together
//! those two rules make duplicate handling of a single server event
//! impossible: there is never a moment where two listeners could both see
//! the same `message-delivered`.
//!
//! Listener callbacks run to completion on the read task; they must not
//! attach or detach listeners from inside the callback.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

use duplex_common::{Message, ServerEvent};

use crate::error::ClientError;

pub type PresenceListener = Box<dyn Fn(&[String]) + Send + Sync>;
pub type MessageListener = Box<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    presence: Option<(u64, PresenceListener)>,
    message: Option<(u64, MessageListener)>,
}

#[derive(Debug, Clone, Copy)]
enum SubscriptionKind {
    Presence,
    Message,
}

/// Handle to an attached listener. Detaching through the handle is how a
/// listener is removed; a handle made stale by a later attach or by a
/// reconnect detaches nothing.
pub struct Subscription {
    kind: SubscriptionKind,
    id: u64,
    listeners: Arc<Mutex<ListenerSet>>,
}

impl Subscription {
    pub fn detach(self) {
        let mut set = self.listeners.lock();
        match self.kind {
            SubscriptionKind::Presence => {
                if matches!(set.presence, Some((id, _)) if id == self.id) {
                    set.presence = None;
                }
            }
            SubscriptionKind::Message => {
                if matches!(set.message, Some((id, _)) if id == self.id) {
                    set.message = None;
                }
            }
        }
    }
}

struct Connection {
    task: JoinHandle<()>,
}

// Replacing the stored connection must never leak the old read task, even
// when two connect() calls race and one overwrites the other's handle.
impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owns the session's WebSocket connection and listener set.
pub struct SessionManager {
    listeners: Arc<Mutex<ListenerSet>>,
    online: Arc<Mutex<Vec<String>>>,
    connection: Mutex<Option<Connection>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(ListenerSet::default())),
            online: Arc::new(Mutex::new(Vec::new())),
            connection: Mutex::new(None),
        }
    }

    /// Whether a connection is open and its read task still running. A
    /// handle whose task has finished counts as disconnected, so a stale
    /// handle never blocks a reconnect.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .map(|c| !c.task.is_finished())
            .unwrap_or(false)
    }

    /// Open the session's WebSocket. A no-op when already connected and
    /// live. On every actual (re)connect, all previously attached listeners
    /// are cleared before the new event stream starts.
    pub async fn connect(&self, ws_url: Url) -> Result<(), ClientError> {
        if self.is_connected() {
            debug!("connect: already connected, no-op");
            return Ok(());
        }

        // Drop whatever the previous connection left behind, listeners
        // included, before any new event can arrive.
        self.teardown();

        let (stream, _response) = tokio_tungstenite::connect_async(ws_url.as_str()).await?;
        // The URL query carries the session token; log only the endpoint.
        info!(endpoint = %redacted_endpoint(&ws_url), "WebSocket session connected");

        let (_write, mut read) = stream.split();
        let listeners = Arc::clone(&self.listeners);
        let online = Arc::clone(&self.online);

        let task = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => dispatch_event(&listeners, &online, event),
                        Err(e) => debug!(error = %e, "ignoring unparseable server event"),
                    },
                    Ok(WsMessage::Close(frame)) => {
                        info!(reason = ?frame, "server closed the session");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        });

        *self.connection.lock() = Some(Connection { task });
        Ok(())
    }

    /// Tear down the connection and all locally cached presence state.
    /// Idempotent: safe to call when already disconnected.
    pub fn disconnect(&self) {
        self.teardown();
        debug!("session disconnected");
    }

    fn teardown(&self) {
        // Dropping the connection aborts its read task
        self.connection.lock().take();
        self.online.lock().clear();
        self.clear_listeners();
    }

    /// Remove every attached listener. Runs before each reconnect so a
    /// server event can never be handled by both an old and a new listener.
    pub fn clear_listeners(&self) {
        let mut set = self.listeners.lock();
        set.presence = None;
        set.message = None;
    }

    /// Attach the presence listener. At most one exists at a time; a prior
    /// listener is replaced and its subscription handle goes stale.
    pub fn attach_presence_listener(&self, listener: PresenceListener) -> Subscription {
        let mut set = self.listeners.lock();
        let id = set.next_id;
        set.next_id += 1;
        set.presence = Some((id, listener));
        Subscription {
            kind: SubscriptionKind::Presence,
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Attach the message listener. Same single-slot semantics as
    /// [`Self::attach_presence_listener`].
    pub fn attach_message_listener(&self, listener: MessageListener) -> Subscription {
        let mut set = self.listeners.lock();
        let id = set.next_id;
        set.next_id += 1;
        set.message = Some((id, listener));
        Subscription {
            kind: SubscriptionKind::Message,
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// The locally cached online set, replaced wholesale on every
    /// presence-update.
    pub fn online_users(&self) -> Vec<String> {
        self.online.lock().clone()
    }

    /// Run one server event through the listener set, exactly as the read
    /// task does.
    pub(crate) fn dispatch(&self, event: ServerEvent) {
        dispatch_event(&self.listeners, &self.online, event);
    }
}

/// Scheme, host, and path of the WebSocket endpoint, query dropped.
fn redacted_endpoint(url: &Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or("unknown"),
        url.path()
    )
}

fn dispatch_event(
    listeners: &Mutex<ListenerSet>,
    online: &Mutex<Vec<String>>,
    event: ServerEvent,
) {
    match event {
        ServerEvent::PresenceUpdate { online: set } => {
            *online.lock() = set.clone();
            let guard = listeners.lock();
            if let Some((_, listener)) = &guard.presence {
                listener(&set);
            }
        }
        ServerEvent::MessageDelivered { message } => {
            let guard = listeners.lock();
            if let Some((_, listener)) = &guard.message {
                listener(&message);
            }
        }
    }
}
