use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::session::{self, SessionContext};

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_count(params: &serde_json::Value, key: &str) -> Result<u32, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    let n = v
        .as_u64()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key)))?;
    u32::try_from(n).map_err(|_| HandlerErr::bad_params(format!("{} is too large", key)))
}

pub fn get_required_payload<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> Result<&'a serde_json::Value, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => {
            Err(HandlerErr::bad_params(format!("missing {}", key)))
        }
        Some(v) => Ok(v),
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Drop the active session from memory and from the workspace db.
pub fn teardown_session(state: &mut AppState, reason: &str) -> Option<SessionContext> {
    let ctx = state.session.take()?;
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = session::remove(conn, &ctx.context_id) {
            tracing::warn!(error = %e, "failed to remove persisted session");
        }
    }
    tracing::info!(context_id = %ctx.context_id, username = %ctx.username, reason, "session closed");
    Some(ctx)
}

/// The signed-in session, torn down first if it has expired.
pub fn active_session(
    state: &mut AppState,
    now: DateTime<Utc>,
) -> Result<SessionContext, HandlerErr> {
    let Some(ctx) = state.session.as_mut() else {
        return Err(HandlerErr::new("no_session", "sign in first"));
    };
    if ctx.is_expired(now) {
        teardown_session(state, "expired");
        return Err(HandlerErr::new(
            "session_expired",
            "session expired; sign in again",
        ));
    }
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = session::touch(conn, ctx, now) {
            tracing::warn!(error = %e, "failed to record session activity");
        }
    }
    Ok(ctx.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::schema::LoginPayload;
    use chrono::Duration;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn signed_in_state(prefix: &str, created: DateTime<Utc>, ttl: Duration) -> (AppState, String) {
        let ws = temp_dir(prefix);
        let conn = db::open_db(&ws).expect("open db");
        let login = LoginPayload {
            success: true,
            message: "ok".to_string(),
            session_id: Some("sid-7".to_string()),
        };
        let ctx = SessionContext::from_login("student1", &login, ttl, created).expect("context");
        session::persist(&conn, &ctx).expect("persist");
        let context_id = ctx.context_id.clone();
        let state = AppState {
            workspace: Some(ws),
            db: Some(conn),
            session: Some(ctx),
        };
        (state, context_id)
    }

    fn session_rows(state: &AppState) -> i64 {
        state
            .db
            .as_ref()
            .expect("db")
            .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .expect("count sessions")
    }

    #[test]
    fn expired_session_is_torn_down_on_access() {
        let created = Utc::now() - Duration::hours(2);
        let (mut state, _) = signed_in_state("erpdesk-helpers-expired", created, Duration::hours(1));
        assert_eq!(session_rows(&state), 1);

        let e = active_session(&mut state, Utc::now()).expect_err("expired");
        assert_eq!(e.code, "session_expired");
        assert!(state.session.is_none());
        assert_eq!(session_rows(&state), 0);

        // Once torn down, later calls see no session at all.
        let e = active_session(&mut state, Utc::now()).expect_err("gone");
        assert_eq!(e.code, "no_session");
    }

    #[test]
    fn live_session_is_touched() {
        let now = Utc::now();
        let (mut state, context_id) = signed_in_state("erpdesk-helpers-live", now, Duration::hours(1));

        let ctx = active_session(&mut state, now).expect("active");
        assert_eq!(ctx.context_id, context_id);
        assert_eq!(ctx.last_seen_at, Some(now));
        let stored = session::load_persisted(state.db.as_ref().expect("db"))
            .expect("load")
            .expect("row");
        assert!(stored.last_seen_at.is_some());
        assert_eq!(session_rows(&state), 1);
    }
}
