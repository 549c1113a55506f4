//! Authentication and user accounts.
//!
//! Users and sessions live in SQLite; passwords are bcrypt-hashed and
//! sessions are opaque uuid tokens with an expiry. A verified session is
//! what ties a WebSocket connection to a user identity.

pub mod middleware;

use anyhow::{bail, Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use duplex_common::UserInfo;

/// User record as stored; the hash never leaves this module.
#[derive(Debug, Clone)]
struct User {
    id: String,
    email: String,
    username: String,
    password_hash: String,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            avatar_url: user.avatar_url,
            created_at: user.created_at,
        }
    }
}

/// Session token for authenticated requests.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Auth manager handles signup, login, and session validation.
pub struct AuthManager {
    pool: SqlitePool,
    session_ttl: Duration,
    /// In-memory session cache, backed by the sessions table
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    pub async fn new(pool: SqlitePool, session_ttl_days: i64) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                avatar_url TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create users table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create sessions table")?;

        info!("[Auth] users and sessions tables ready");

        Ok(Self {
            pool,
            session_ttl: Duration::days(session_ttl_days),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Create a new account. Fails if the email is already taken.
    pub async fn signup(&self, email: &str, username: &str, password: &str) -> Result<UserInfo> {
        if email.trim().is_empty() || username.trim().is_empty() {
            bail!("email and username must not be empty");
        }
        if password.len() < 6 {
            bail!("password must be at least 6 characters");
        }

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            bail!("email already registered");
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: hash(password, DEFAULT_COST).context("failed to hash password")?,
            avatar_url: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, password_hash, avatar_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.avatar_url)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to insert user")?;

        info!(user_id = %user.id, email = %user.email, "user registered");

        Ok(user.into())
    }

    /// Verify credentials and open a new session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(UserInfo, Session)> {
        let row = sqlx::query(
            "SELECT id, email, username, password_hash, avatar_url, created_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            bail!("invalid email or password");
        };
        let user = row_to_user(row)?;

        if !verify(password, &user.password_hash).unwrap_or(false) {
            warn!(email = %email, "failed login attempt");
            bail!("invalid email or password");
        }

        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to insert session")?;

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        info!(user_id = %user.id, "login successful");

        Ok((user.into(), session))
    }

    /// Revoke a session. Safe to call on an unknown token.
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);
        sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolve a session token to its user, rejecting unknown or expired
    /// tokens.
    pub async fn validate_session(&self, token: &str) -> Result<UserInfo> {
        let cached = self.sessions.read().await.get(token).cloned();

        let session = match cached {
            Some(session) => session,
            None => {
                let row = sqlx::query(
                    "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1",
                )
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
                let Some(row) = row else {
                    bail!("unknown session token");
                };
                let session = row_to_session(row)?;
                self.sessions
                    .write()
                    .await
                    .insert(session.token.clone(), session.clone());
                session
            }
        };

        if session.expires_at < Utc::now() {
            self.sessions.write().await.remove(token);
            bail!("session expired");
        }

        self.get_user(&session.user_id)
            .await?
            .context("session refers to a deleted user")
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserInfo>> {
        let row = sqlx::query(
            "SELECT id, email, username, password_hash, avatar_url, created_at FROM users WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_user(r).map(UserInfo::from)).transpose()
    }

    /// Everyone except the caller, for the contacts sidebar.
    pub async fn list_users_except(&self, user_id: &str) -> Result<Vec<UserInfo>> {
        let rows = sqlx::query(
            "SELECT id, email, username, password_hash, avatar_url, created_at FROM users WHERE id != ?1 ORDER BY username",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| row_to_user(r).map(UserInfo::from))
            .collect()
    }

    /// Set the user's avatar to an already-uploaded media URL.
    pub async fn update_avatar(&self, user_id: &str, avatar_url: &str) -> Result<UserInfo> {
        sqlx::query("UPDATE users SET avatar_url = ?1 WHERE id = ?2")
            .bind(avatar_url)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to update avatar")?;

        self.get_user(user_id).await?.context("user disappeared")
    }
}

fn parse_utc(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid {field} timestamp"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_user(row: SqliteRow) -> Result<User> {
    let created_at: String = row.get("created_at");
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        avatar_url: row.get("avatar_url"),
        created_at: parse_utc(&created_at, "created_at")?,
    })
}

fn row_to_session(row: SqliteRow) -> Result<Session> {
    let created_at: String = row.get("created_at");
    let expires_at: String = row.get("expires_at");
    Ok(Session {
        token: row.get("token"),
        user_id: row.get("user_id"),
        created_at: parse_utc(&created_at, "created_at")?,
        expires_at: parse_utc(&expires_at, "expires_at")?,
    })
}
