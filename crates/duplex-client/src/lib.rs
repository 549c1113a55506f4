//! Duplex client session library.
//!
//! The Rust counterpart of the server's HTTP and WebSocket surface:
//! [`api::ApiClient`] for request/response operations, [`session::SessionManager`]
//! for the one live connection per authenticated session, and
//! [`conversation::ConversationView`] for binding incoming message events to
//! the currently open conversation.

pub mod api;
pub mod conversation;
pub mod error;
pub mod session;

pub use api::ApiClient;
pub use conversation::ConversationView;
pub use error::ClientError;
pub use session::{SessionManager, Subscription};
