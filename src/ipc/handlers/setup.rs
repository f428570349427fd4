use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

pub const DEFAULT_API_BASE_URL: &str = "https://srmap.onrender.com";

#[derive(Clone, Copy)]
enum SetupSection {
    Session,
    Display,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "session" => Some(Self::Session),
            "display" => Some(Self::Display),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Session => "setup.session",
            Self::Display => "setup.display",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Session => json!({
            "ttlMinutes": 1440,
            "apiBaseUrl": DEFAULT_API_BASE_URL,
            "requestTimeoutSecs": 30
        }),
        SetupSection::Display => json!({
            "percentDecimals": 1,
            "showAfterBunk": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Session => match k.as_str() {
                "ttlMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10080)?));
                }
                "apiBaseUrl" => {
                    let url = parse_string_max(v, k, 200)?;
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return Err("apiBaseUrl must start with http:// or https://".into());
                    }
                    obj.insert(
                        k.clone(),
                        Value::String(url.trim_end_matches('/').to_string()),
                    );
                }
                "requestTimeoutSecs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 300)?));
                }
                _ => return Err(format!("unknown session field: {}", k)),
            },
            SetupSection::Display => match k.as_str() {
                "percentDecimals" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 3)?));
                }
                "showAfterBunk" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown display field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a bad stored field keeps its default.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub ttl_minutes: i64,
    pub api_base_url: String,
    pub request_timeout_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    pub percent_decimals: usize,
    pub show_after_bunk: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            percent_decimals: 1,
            show_after_bunk: true,
        }
    }
}

pub fn session_settings(conn: &rusqlite::Connection) -> anyhow::Result<SessionSettings> {
    let v = load_section(conn, SetupSection::Session)?;
    Ok(SessionSettings {
        ttl_minutes: v.get("ttlMinutes").and_then(|x| x.as_i64()).unwrap_or(1440),
        api_base_url: v
            .get("apiBaseUrl")
            .and_then(|x| x.as_str())
            .unwrap_or(DEFAULT_API_BASE_URL)
            .to_string(),
        request_timeout_secs: v
            .get("requestTimeoutSecs")
            .and_then(|x| x.as_i64())
            .unwrap_or(30),
    })
}

/// Display settings for the open workspace, or defaults when none is open.
pub fn display_settings(conn: Option<&rusqlite::Connection>) -> DisplaySettings {
    let defaults = DisplaySettings::default();
    let Some(conn) = conn else {
        return defaults;
    };
    let v = match load_section(conn, SetupSection::Display) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "falling back to default display settings");
            return defaults;
        }
    };
    DisplaySettings {
        percent_decimals: v
            .get("percentDecimals")
            .and_then(|x| x.as_u64())
            .map(|n| n as usize)
            .unwrap_or(defaults.percent_decimals),
        show_after_bunk: v
            .get("showAfterBunk")
            .and_then(|x| x.as_bool())
            .unwrap_or(defaults.show_after_bunk),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let session = match load_section(conn, SetupSection::Session) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let display = match load_section(conn, SetupSection::Display) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "session": session,
            "display": display
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.key(), "setup section updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
