#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status; `message` is its error
    /// envelope if one could be parsed.
    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("no conversation selected")]
    NoConversationSelected,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
