//! Conversation view: binds incoming message events to the currently open
//! conversation and keeps the visible transcript.
//!
//! Switching conversations always detaches the old listener before the new
//! one attaches, so an event is never handled by both. The brief window
//! where no listener is attached only exists during an explicit switch;
//! in steady state the active conversation's listener is always in place.

use std::sync::Arc;

use parking_lot::Mutex;

use duplex_common::{Message, SendMessageRequest};

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::session::{SessionManager, Subscription};

#[derive(Default)]
struct ViewState {
    selected: Option<String>,
    transcript: Vec<Message>,
}

pub struct ConversationView {
    api: Arc<ApiClient>,
    session: Arc<SessionManager>,
    state: Arc<Mutex<ViewState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ConversationView {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionManager>) -> Self {
        Self {
            api,
            session,
            state: Arc::new(Mutex::new(ViewState::default())),
            subscription: Mutex::new(None),
        }
    }

    /// Open the conversation with `peer_id`: detach the previous listener,
    /// clear the transcript, fetch history, then attach a listener scoped
    /// to this peer. Re-selecting the current peer runs the same sequence
    /// and is harmless.
    pub async fn select_conversation(&self, peer_id: &str) -> Result<(), ClientError> {
        self.detach_listener();
        {
            let mut state = self.state.lock();
            state.selected = Some(peer_id.to_string());
            state.transcript.clear();
        }

        let history = self.api.fetch_history(peer_id).await?;
        self.install(peer_id, history);
        Ok(())
    }

    /// Close the open conversation and return to the unselected state.
    pub fn deselect(&self) {
        self.detach_listener();
        let mut state = self.state.lock();
        state.selected = None;
        state.transcript.clear();
    }

    /// Send to the open conversation. The persisted record from the send
    /// response is appended to the transcript directly: the sender never
    /// waits for (or receives) a broadcast echo of its own message.
    pub async fn send(&self, payload: SendMessageRequest) -> Result<Message, ClientError> {
        let peer_id = self
            .state
            .lock()
            .selected
            .clone()
            .ok_or(ClientError::NoConversationSelected)?;

        let message = self.api.send_message(&peer_id, payload).await?;
        self.state.lock().transcript.push(message.clone());
        Ok(message)
    }

    pub fn selected(&self) -> Option<String> {
        self.state.lock().selected.clone()
    }

    pub fn transcript(&self) -> Vec<Message> {
        self.state.lock().transcript.clone()
    }

    fn detach_listener(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.detach();
        }
    }

    /// Install the fetched history and the peer-scoped listener. Split out
    /// from [`Self::select_conversation`] so the listener wiring is
    /// testable without HTTP.
    fn install(&self, peer_id: &str, history: Vec<Message>) {
        {
            let mut state = self.state.lock();
            state.selected = Some(peer_id.to_string());
            state.transcript = history;
        }

        let peer = peer_id.to_string();
        let state = Arc::clone(&self.state);
        let subscription = self.session.attach_message_listener(Box::new(move |message| {
            // Accept only traffic belonging to the open conversation
            if message.sender_id == peer || message.receiver_id == peer {
                state.lock().transcript.push(message.clone());
            }
        }));

        *self.subscription.lock() = Some(subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use duplex_common::ServerEvent;

    fn message(id: &str, sender: &str, receiver: &str, text: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            text: Some(text.to_string()),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    fn delivered(msg: Message) -> ServerEvent {
        ServerEvent::MessageDelivered { message: msg }
    }

    fn view() -> (ConversationView, Arc<SessionManager>) {
        let api = Arc::new(ApiClient::new("http://localhost:3000").unwrap());
        let session = Arc::new(SessionManager::new());
        (ConversationView::new(api, session.clone()), session)
    }

    #[test]
    fn only_messages_of_the_open_conversation_are_appended() {
        let (view, session) = view();
        view.install("alice", vec![]);

        session.dispatch(delivered(message("m1", "carol", "me", "from carol")));
        assert!(view.transcript().is_empty(), "cross-talk must be filtered");

        session.dispatch(delivered(message("m2", "alice", "me", "from alice")));
        session.dispatch(delivered(message("m3", "me", "alice", "to alice")));
        let transcript = view.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].id, "m2");
        assert_eq!(transcript[1].id, "m3");
    }

    #[test]
    fn switching_conversations_rescopes_the_listener_exactly() {
        let (view, session) = view();
        view.install("alice", vec![message("h1", "alice", "me", "old")]);
        assert_eq!(view.transcript().len(), 1);

        // Switch A -> B: transcript resets, listener rescopes
        view.detach_listener();
        view.install("bob", vec![]);

        session.dispatch(delivered(message("m1", "alice", "me", "stale")));
        assert!(view.transcript().is_empty(), "message from A after switch");

        session.dispatch(delivered(message("m2", "bob", "me", "fresh")));
        assert_eq!(view.transcript().len(), 1);
        assert_eq!(view.transcript()[0].id, "m2");
        assert_eq!(view.selected().as_deref(), Some("bob"));
    }

    #[test]
    fn reselecting_the_same_peer_does_not_double_append() {
        let (view, session) = view();
        view.install("alice", vec![]);
        // Re-subscription of the same conversation, as a reselect does
        view.detach_listener();
        view.install("alice", vec![]);

        session.dispatch(delivered(message("m1", "alice", "me", "hi")));
        assert_eq!(view.transcript().len(), 1, "exactly one append per event");
    }

    #[test]
    fn deselect_clears_state_and_stops_appending() {
        let (view, session) = view();
        view.install("alice", vec![message("h1", "alice", "me", "old")]);

        view.deselect();
        assert!(view.selected().is_none());
        assert!(view.transcript().is_empty());

        session.dispatch(delivered(message("m1", "alice", "me", "late")));
        assert!(view.transcript().is_empty());
    }

    #[tokio::test]
    async fn send_without_selection_is_rejected() {
        let (view, _session) = view();
        let err = view
            .send(SendMessageRequest {
                text: Some("hi".to_string()),
                image: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoConversationSelected));
    }
}
