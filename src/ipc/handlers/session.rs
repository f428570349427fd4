use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::handlers::setup::session_settings;
use crate::ipc::helpers::{
    active_session, get_required_payload, get_required_str, require_db, teardown_session,
};
use crate::ipc::types::{AppState, Request};
use crate::schema::{self, Endpoint};
use crate::session::{self, SessionContext, SessionError};
use chrono::{Duration, Utc};
use serde_json::json;

fn session_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let username = get_required_str(params, "username")?;
    let login = schema::parse_login(get_required_payload(params, "login")?)?;
    let settings = session_settings(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let ctx = SessionContext::from_login(
        &username,
        &login,
        Duration::minutes(settings.ttl_minutes),
        Utc::now(),
    )
    .map_err(|e| match e {
        SessionError::EmptyUsername => HandlerErr::bad_params(e.to_string()),
        SessionError::LoginRejected(_) | SessionError::MissingSessionId => {
            HandlerErr::new("login_failed", e.to_string())
        }
    })?;
    session::persist(conn, &ctx).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string()).with_details(json!({ "table": "sessions" }))
    })?;

    tracing::info!(context_id = %ctx.context_id, username = %ctx.username, "session opened");
    state.session = Some(ctx.clone());
    Ok(json!({ "session": ctx }))
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, session_open(state, &req.params))
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match active_session(state, Utc::now()) {
        Ok(ctx) => ok(&req.id, json!({ "session": ctx })),
        Err(e) if e.code == "no_session" || e.code == "session_expired" => {
            ok(&req.id, json!({ "session": null }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_session_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let closed = teardown_session(state, "logout");
    ok(&req.id, json!({ "closed": closed.is_some() }))
}

fn session_request(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "endpoint")?;
    let endpoint = Endpoint::parse(&name)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown endpoint: {}", name)))?;
    let ctx = active_session(state, Utc::now())?;
    let settings = session_settings(require_db(state)?)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let request = schema::remote_request(
        endpoint,
        &settings.api_base_url,
        &ctx.session_id,
        settings.request_timeout_secs,
    );
    Ok(json!({ "request": request }))
}

fn handle_session_request(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, session_request(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(handle_session_open(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        "session.close" => Some(handle_session_close(state, req)),
        "session.request" => Some(handle_session_request(state, req)),
        _ => None,
    }
}
