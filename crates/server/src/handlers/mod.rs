//! HTTP handlers for the Duplex chat server.

pub mod auth;
pub mod blobs;
pub mod messages;

pub use auth::{login, logout, me, signup, update_profile};
pub use blobs::get_blob;
pub use messages::{get_history, list_contacts, send_message};
