use crate::calc;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::display_settings;
use crate::ipc::helpers::{active_session, get_required_payload};
use crate::ipc::types::{AppState, Request};
use crate::matcher;
use crate::schema;
use chrono::Utc;
use serde_json::json;

fn timetable_annotate(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    active_session(state, Utc::now())?;
    // Both fetches must have resolved before any slot is matched.
    let timetable = schema::parse_timetable(get_required_payload(params, "timetable")?)?;
    let attendance = schema::parse_attendance(get_required_payload(params, "attendance")?)?;
    let display = display_settings(state.db.as_ref());

    let grid = matcher::annotate_timetable(&timetable, &attendance.attendance);
    let mut matched = 0usize;
    let mut unmatched = 0usize;
    let days: Vec<serde_json::Value> = grid
        .iter()
        .map(|day| {
            let slots: Vec<serde_json::Value> = day
                .slots
                .iter()
                .map(|slot| {
                    if !slot.is_empty {
                        if slot.attendance.is_some() {
                            matched += 1;
                        } else {
                            unmatched += 1;
                        }
                    }
                    json!({
                        "period": slot.period,
                        "label": if slot.is_empty { "-" } else { slot.label.as_str() },
                        "isEmpty": slot.is_empty,
                        "attendance": slot.attendance,
                        "percentText": slot
                            .attendance
                            .as_ref()
                            .map(|a| calc::format_percent(a.percentage, display.percent_decimals)),
                    })
                })
                .collect();
            json!({ "day": day.day, "slots": slots })
        })
        .collect();
    tracing::debug!(matched, unmatched, "timetable annotated");

    Ok(json!({
        "days": days,
        "matchedSlots": matched,
        "unmatchedSlots": unmatched,
    }))
}

fn handle_timetable_annotate(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, timetable_annotate(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.annotate" => Some(handle_timetable_annotate(state, req)),
        _ => None,
    }
}
