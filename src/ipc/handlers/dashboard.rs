use crate::calc::{self, AttendanceBand};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::display_settings;
use crate::ipc::helpers::{active_session, get_required_payload};
use crate::ipc::types::{AppState, Request};
use crate::schema;
use chrono::Utc;
use serde_json::json;

const RECENT_RESULTS: usize = 5;

fn dashboard_summary(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let ctx = active_session(state, Utc::now())?;
    let cgpa = schema::parse_cgpa(get_required_payload(params, "cgpa")?)?;
    let attendance = schema::parse_attendance(get_required_payload(params, "attendance")?)?;
    let display = display_settings(state.db.as_ref());

    let overall = calc::aggregate(&attendance.attendance);
    Ok(json!({
        "username": ctx.username,
        "cgpa": cgpa.cgpa,
        "cgpaText": cgpa.cgpa_text.as_deref().unwrap_or("N/A"),
        "totalSubjects": cgpa.subjects.len(),
        "attendancePercentage": overall,
        "attendanceText": calc::format_percent(overall, display.percent_decimals),
        "attendanceBand": AttendanceBand::classify(overall),
        // First rows in portal order.
        "recentResults": cgpa.subjects.iter().take(RECENT_RESULTS).collect::<Vec<_>>(),
    }))
}

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, dashboard_summary(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        _ => None,
    }
}
