use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::schema::LoginPayload;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("login was rejected: {0}")]
    LoginRejected(String),
    #[error("login succeeded without a session id")]
    MissingSessionId,
}

/// The signed-in portal session. Created from a successful login, dropped on
/// logout or once `expires_at` passes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub context_id: String,
    pub username: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl SessionContext {
    pub fn from_login(
        username: &str,
        login: &LoginPayload,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        if !login.success {
            return Err(SessionError::LoginRejected(login.message.clone()));
        }
        let session_id = login
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SessionError::MissingSessionId)?;

        Ok(Self {
            context_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            session_id: session_id.to_string(),
            created_at: now,
            expires_at: now + ttl,
            last_seen_at: None,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Replace whatever session the workspace had with `ctx`.
pub fn persist(conn: &Connection, ctx: &SessionContext) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM sessions", [])?;
    tx.execute(
        "INSERT INTO sessions(context_id, username, session_id, created_at, expires_at, last_seen_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &ctx.context_id,
            &ctx.username,
            &ctx.session_id,
            ctx.created_at.to_rfc3339(),
            ctx.expires_at.to_rfc3339(),
            ctx.last_seen_at.map(|t| t.to_rfc3339()),
        ),
    )?;
    tx.commit()?;
    Ok(())
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// The most recently created persisted session, if its row is readable.
pub fn load_persisted(conn: &Connection) -> anyhow::Result<Option<SessionContext>> {
    let row = conn
        .query_row(
            "SELECT context_id, username, session_id, created_at, expires_at, last_seen_at
             FROM sessions
             ORDER BY created_at DESC
             LIMIT 1",
            [],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((context_id, username, session_id, created_raw, expires_raw, seen_raw)) = row else {
        return Ok(None);
    };
    let (Some(created_at), Some(expires_at)) = (parse_ts(&created_raw), parse_ts(&expires_raw))
    else {
        tracing::warn!(context_id = %context_id, "discarding session row with bad timestamps");
        remove(conn, &context_id)?;
        return Ok(None);
    };
    Ok(Some(SessionContext {
        context_id,
        username,
        session_id,
        created_at,
        expires_at,
        last_seen_at: seen_raw.as_deref().and_then(parse_ts),
    }))
}

pub fn remove(conn: &Connection, context_id: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM sessions WHERE context_id = ?", [context_id])?;
    Ok(())
}

pub fn touch(conn: &Connection, ctx: &mut SessionContext, now: DateTime<Utc>) -> anyhow::Result<()> {
    ctx.last_seen_at = Some(now);
    conn.execute(
        "UPDATE sessions SET last_seen_at = ? WHERE context_id = ?",
        (now.to_rfc3339(), &ctx.context_id),
    )?;
    Ok(())
}
