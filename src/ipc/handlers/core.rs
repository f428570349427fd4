use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session;
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "sessionActive": state.session.is_some()
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // Best-effort: resume the last signed-in session unless it has expired.
            // A bad row must not prevent the workspace from opening.
            let restored = match session::load_persisted(&conn) {
                Ok(Some(ctx)) if ctx.is_expired(Utc::now()) => {
                    tracing::info!(context_id = %ctx.context_id, "dropping expired persisted session");
                    if let Err(e) = session::remove(&conn, &ctx.context_id) {
                        tracing::warn!(error = %e, "failed to remove expired session");
                    }
                    None
                }
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read persisted session");
                    None
                }
            };
            tracing::info!(
                workspace = %path.to_string_lossy(),
                resumed = restored.is_some(),
                "workspace opened"
            );

            state.workspace = Some(path.clone());
            state.session = restored;
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "sessionResumed": state.session.is_some()
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
