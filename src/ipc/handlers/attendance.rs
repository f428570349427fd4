use crate::calc::{self, AttendanceBand, BunkAdvice, SubjectAttendance};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::{display_settings, DisplaySettings};
use crate::ipc::helpers::{active_session, get_required_count, get_required_payload};
use crate::ipc::types::{AppState, Request};
use crate::schema;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectRowView<'a> {
    #[serde(flatten)]
    subject: &'a SubjectAttendance,
    band_label: &'static str,
    percent_text: String,
    advice_text: String,
    after_bunk_text: Option<String>,
}

fn subject_row_view(subject: &SubjectAttendance, display: DisplaySettings) -> SubjectRowView<'_> {
    let after_bunk_text = match &subject.advice {
        BunkAdvice::CanBunk { after_bunk, .. } if display.show_after_bunk => Some(format!(
            "After bunk: {}",
            calc::format_percent(*after_bunk, display.percent_decimals)
        )),
        _ => None,
    };
    SubjectRowView {
        subject,
        band_label: subject.band.label(),
        percent_text: calc::format_percent(subject.attendance_percentage, display.percent_decimals),
        advice_text: subject.advice.message(),
        after_bunk_text,
    }
}

fn attendance_plan(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let present = get_required_count(params, "present")?;
    let absent = get_required_count(params, "absent")?;
    let odml = get_required_count(params, "odml")?;

    let plan = calc::plan(present, absent, odml);
    let band = AttendanceBand::classify(plan.current_attendance);
    Ok(json!({
        "plan": plan,
        "meetsThreshold": plan.meets_threshold(),
        "band": band,
        "advice": BunkAdvice::for_band(band, &plan),
    }))
}

fn attendance_summary(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    active_session(state, Utc::now())?;
    let payload = schema::parse_attendance(get_required_payload(params, "payload")?)?;
    let display = display_settings(state.db.as_ref());

    let summary = calc::summarize_attendance(&payload.attendance);
    let rows: Vec<SubjectRowView> = summary
        .subjects
        .iter()
        .map(|s| subject_row_view(s, display))
        .collect();
    Ok(json!({
        "overallPercentage": summary.overall_percentage,
        "overallText": calc::format_percent(summary.overall_percentage, display.percent_decimals),
        "overallBand": summary.overall_band,
        "overallBandLabel": summary.overall_band.label(),
        "totals": summary.totals,
        "subjects": rows,
    }))
}

fn handle_attendance_plan(_state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, attendance_plan(&req.params))
}

fn handle_attendance_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, attendance_summary(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.plan" => Some(handle_attendance_plan(state, req)),
        "attendance.summary" => Some(handle_attendance_summary(state, req)),
        _ => None,
    }
}
