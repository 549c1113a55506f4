//! Chat server configuration

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AuthManager;
use crate::delivery::DeliveryRouter;
use crate::media::MediaStore;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;
use crate::store::MessageStore;

/// Configuration for the Duplex chat server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Base data directory (SQLite database lives here)
    pub data_dir: PathBuf,
    /// Blob storage directory for uploaded media
    pub blob_dir: PathBuf,
    /// TCP port to listen on
    pub port: u16,
    /// Session lifetime in days
    pub session_ttl_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("duplex_data");
        Self {
            blob_dir: data_dir.join("blobs"),
            data_dir,
            port: 3000,
            session_ttl_days: 30,
        }
    }
}

impl ServerConfig {
    /// Build config from the environment: `DUPLEX_ROOT` overrides the data
    /// directory, `PORT` the listen port.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DUPLEX_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("duplex_data"));
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Self {
            blob_dir: data_dir.join("blobs"),
            data_dir,
            port,
            session_ttl_days: 30,
        }
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("duplex.sqlite")
    }

    /// Ensure all directories exist.
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.blob_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthManager>,
    pub store: Arc<dyn MessageStore>,
    pub media: Arc<dyn MediaStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceBroadcaster>,
    pub delivery: Arc<DeliveryRouter>,
}
