use std::sync::Arc;

use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::Deserialize;

use crate::clock::{Clock, SystemClock};
use crate::db::models::{from_millis, to_millis, Session};
use crate::db::StorageError;
use crate::state::DbPool;

/// What to do when a user signs in while another of their sessions is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// Drop the old session; its token stops validating immediately.
    #[default]
    Replace,
    /// Refuse the new sign-in until the old session ends.
    Reject,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No matching row, or the row has expired. Callers treat the request as
    /// anonymous.
    #[error("session expired or invalid")]
    Invalid,

    #[error("user already has an active session")]
    ActiveSession,

    #[error("session lifetime does not fit in a timestamp")]
    LifetimeOutOfRange,

    #[error("failed to generate session token: {0}")]
    TokenGeneration(#[from] rand::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::Storage(e.into())
    }
}

impl From<r2d2::Error> for SessionError {
    fn from(e: r2d2::Error) -> Self {
        SessionError::Storage(e.into())
    }
}

/// Issues, validates and expires opaque session tokens.
#[derive(Clone)]
pub struct SessionManager {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            ttl,
            policy: SessionPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a new session for a user and return its token.
    ///
    /// Existing sessions for the user are deleted in the same transaction as
    /// the insert, so at most one row per user survives and any earlier token
    /// is rejected from here on.
    pub fn create_session(&self, user_id: &str) -> Result<String, SessionError> {
        let token = generate_token()?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(SessionError::LifetimeOutOfRange)?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if self.policy == SessionPolicy::Reject {
            let active: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE user_id = ?1 AND expires_at > ?2)",
                params![user_id, to_millis(now)],
                |row| row.get(0),
            )?;
            if active {
                return Err(SessionError::ActiveSession);
            }
        }

        tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        tx.execute(
            "INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, to_millis(expires_at)],
        )?;
        tx.commit()?;

        tracing::info!(user_id, "Created new session");
        Ok(token)
    }

    /// Resolve a token to its user id. Expired rows that the sweep has not
    /// removed yet are rejected the same as missing ones.
    pub fn validate_session(&self, token: &str) -> Result<String, SessionError> {
        self.session(token).map(|s| s.user_id)
    }

    /// Full session row for a live token.
    pub fn session(&self, token: &str) -> Result<Session, SessionError> {
        if token.is_empty() {
            return Err(SessionError::Invalid);
        }

        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, user_id, expires_at FROM sessions WHERE id = ?1 AND expires_at > ?2",
                params![token, to_millis(self.clock.now())],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: from_millis(row.get(2)?),
                    })
                },
            )
            .optional()?;

        row.ok_or(SessionError::Invalid)
    }

    /// Delete a session by token. Absent tokens are not an error.
    pub fn delete_session(&self, token: &str) -> Result<(), SessionError> {
        let conn = self.pool.get()?;
        let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![token])?;
        if removed > 0 {
            tracing::info!("Session signed out");
        }
        Ok(())
    }

    /// Delete every session whose expiry is at or before now. Returns the
    /// number of rows removed.
    pub fn cleanup_expired_sessions(&self) -> Result<usize, SessionError> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![to_millis(self.clock.now())],
        )?;
        Ok(removed)
    }
}

/// Generate a 32-byte token from the OS RNG, hex encoded.
fn generate_token() -> Result<String, rand::Error> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}
