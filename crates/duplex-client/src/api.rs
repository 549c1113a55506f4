//! HTTP API client.
//!
//! Request/response operations against the chat server: auth, contacts,
//! history, and sending messages. Holds the session token after login and
//! attaches it as a bearer header to authenticated calls.

use parking_lot::RwLock;
use reqwest::Response;
use tracing::debug;
use url::Url;

use duplex_common::{
    AuthResponse, ErrorEnvelope, LoginRequest, Message, SendMessageRequest, SignupRequest,
    UpdateProfileRequest, UserInfo,
};

use crate::error::ClientError;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
            token: RwLock::new(None),
        })
    }

    /// The current session token, if logged in.
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    fn bearer(&self) -> Result<String, ClientError> {
        self.token
            .read()
            .as_ref()
            .map(|t| format!("Bearer {t}"))
            .ok_or(ClientError::NotAuthenticated)
    }

    /// The WebSocket endpoint for the current session, token included as
    /// connection metadata.
    pub fn ws_url(&self) -> Result<Url, ClientError> {
        let token = self.token().ok_or(ClientError::NotAuthenticated)?;
        let mut url = self.endpoint("/ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // set_scheme only rejects invalid transitions, which ws/wss are not
        let _ = url.set_scheme(scheme);
        url.query_pairs_mut().append_pair("token", &token);
        Ok(url)
    }

    /// Turn a non-success response into [`ClientError::Api`], using the
    /// server's error envelope when it parses.
    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn signup(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<UserInfo, ClientError> {
        let response = self
            .http
            .post(self.endpoint("/auth/signup")?)
            .json(&SignupRequest {
                email: email.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let auth: AuthResponse = Self::check(response).await?.json().await?;
        *self.token.write() = Some(auth.token);
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserInfo, ClientError> {
        let response = self
            .http
            .post(self.endpoint("/auth/login")?)
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let auth: AuthResponse = Self::check(response).await?.json().await?;
        *self.token.write() = Some(auth.token);
        Ok(auth.user)
    }

    /// Revoke the server session and forget the local token. The local
    /// token is cleared even if the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let bearer = self.token.write().take().map(|t| format!("Bearer {t}"));
        let Some(bearer) = bearer else {
            debug!("logout without a session is a no-op");
            return Ok(());
        };
        let response = self
            .http
            .post(self.endpoint("/auth/logout")?)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<UserInfo, ClientError> {
        let response = self
            .http
            .get(self.endpoint("/auth/me")?)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Update the profile avatar; `avatar` is a base64 (or `data:` URL)
    /// image payload.
    pub async fn update_profile(&self, avatar: &str) -> Result<UserInfo, ClientError> {
        let response = self
            .http
            .put(self.endpoint("/auth/update-profile")?)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .json(&UpdateProfileRequest {
                avatar: avatar.to_string(),
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Send a message; the response is the persisted record, suitable for
    /// optimistic appending to the local transcript.
    pub async fn send_message(
        &self,
        receiver_id: &str,
        payload: SendMessageRequest,
    ) -> Result<Message, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&format!("/messages/send/{receiver_id}"))?)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .json(&payload)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn fetch_history(&self, peer_id: &str) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!("/messages/{peer_id}"))?)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn fetch_contacts(&self) -> Result<Vec<UserInfo>, ClientError> {
        let response = self
            .http
            .get(self.endpoint("/messages/users")?)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_swaps_scheme_and_carries_token() {
        let api = ApiClient::new("http://localhost:3000").unwrap();
        *api.token.write() = Some("tok-123".to_string());

        let url = api.ws_url().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/ws");
        assert!(url.query().unwrap().contains("token=tok-123"));

        let api = ApiClient::new("https://chat.example.com").unwrap();
        *api.token.write() = Some("tok-456".to_string());
        assert_eq!(api.ws_url().unwrap().scheme(), "wss");
    }

    #[test]
    fn authenticated_calls_require_a_token() {
        let api = ApiClient::new("http://localhost:3000").unwrap();
        assert!(matches!(
            api.bearer().unwrap_err(),
            ClientError::NotAuthenticated
        ));
        assert!(matches!(
            api.ws_url().unwrap_err(),
            ClientError::NotAuthenticated
        ));
    }
}
