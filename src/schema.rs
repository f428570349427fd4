//! Typed views of the payloads the remote academic-records API returns.
//!
//! The portal scraper hands back loosely shaped JSON: counts as strings,
//! optional columns, raw `html` blobs. Everything is validated here once so
//! the calc and matcher code only ever see concrete records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::calc::{leading_decimal, parse_count, parse_percent};

pub const PERIODS_PER_DAY: usize = 8;
pub const WEEKDAYS: [&str; 6] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("{endpoint} payload must be a JSON object")]
    NotAnObject { endpoint: &'static str },
    #[error("{endpoint}.{field} must be an array")]
    NotAnArray {
        endpoint: &'static str,
        field: &'static str,
    },
    #[error("{endpoint} payload is invalid: {source}")]
    Invalid {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn count_from_value(v: &Value) -> u32 {
    match v {
        Value::String(s) => parse_count(s),
        Value::Number(n) => n
            .as_u64()
            .map(|n| n.min(u64::from(u32::MAX)) as u32)
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f > 0.0)
                    .map(|f| f.min(f64::from(u32::MAX)) as u32)
            })
            .unwrap_or(0),
        _ => 0,
    }
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().map(count_from_value).unwrap_or(0))
}

fn percent_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => leading_decimal(s),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn lenient_percent<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => parse_percent(&s),
        Some(other) => percent_from_value(&other).unwrap_or(0.0),
        None => 0.0,
    })
}

fn lenient_optional_percent<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(percent_from_value))
}

fn text_from_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().map(text_from_value).unwrap_or_default())
}

/// Older portal builds use the short names; the long name wins when a row
/// carries both.
const ATTENDANCE_ALIASES: [(&str, &str); 2] =
    [("subject_name", "subject"), ("od_ml_taken", "od_ml")];

fn canonical_attendance_row(row: &serde_json::Map<String, Value>) -> Value {
    let mut row = row.clone();
    for (canonical, alias) in ATTENDANCE_ALIASES {
        if let Some(v) = row.remove(alias) {
            row.entry(canonical).or_insert(v);
        }
    }
    Value::Object(row)
}

/// One subject row of the attendance register.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject_code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject_name: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub classes_conducted: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub present: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub absent: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub od_ml_taken: u32,
    #[serde(default, deserialize_with = "lenient_percent")]
    pub attendance_percentage: f64,
    #[serde(default, deserialize_with = "lenient_optional_percent")]
    pub present_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub od_ml_approved: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AttendancePayload {
    pub attendance: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimetableRow {
    pub day: String,
    /// Exactly `PERIODS_PER_DAY` labels; empty string marks a free period.
    pub periods: Vec<String>,
}

impl TimetableRow {
    fn from_value(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let day = obj.get("day").map(text_from_value).unwrap_or_default();
        if day.is_empty() {
            return None;
        }
        let mut periods: Vec<String> = obj
            .get("periods")
            .and_then(|p| p.as_array())
            .map(|arr| {
                arr.iter()
                    .take(PERIODS_PER_DAY)
                    .map(|p| {
                        let label = text_from_value(p);
                        if label == "-" {
                            String::new()
                        } else {
                            label
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        periods.resize(PERIODS_PER_DAY, String::new());
        Some(Self { day, periods })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimetablePayload {
    pub timetable: Vec<TimetableRow>,
}

impl TimetablePayload {
    /// Periods for `day`, matched case-insensitively. The first row wins when
    /// the portal repeats a day.
    pub fn periods_for(&self, day: &str) -> Option<&[String]> {
        self.timetable
            .iter()
            .find(|r| r.day.eq_ignore_ascii_case(day))
            .map(|r| r.periods.as_slice())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct GradeRow {
    #[serde(default, deserialize_with = "lenient_text")]
    pub semester: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub month_year: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject_code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub credit: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub grade: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub grade_points: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: String,
}

#[derive(Debug, Clone, Default)]
pub struct CgpaPayload {
    pub cgpa: Option<f64>,
    /// The CGPA cell as the portal printed it, for display.
    pub cgpa_text: Option<String>,
    pub subjects: Vec<GradeRow>,
}

/// CGPA cells arrive as `"8.42"`, `"CGPA : 8.42"` or `null`.
pub fn parse_cgpa_text(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let start = s.find(|c: char| c.is_ascii_digit())?;
            leading_decimal(&s[start..])
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginPayload {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn require_object<'a>(
    endpoint: &'static str,
    v: &'a Value,
) -> Result<&'a serde_json::Map<String, Value>, SchemaError> {
    v.as_object().ok_or(SchemaError::NotAnObject { endpoint })
}

fn optional_array<'a>(
    endpoint: &'static str,
    obj: &'a serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<&'a [Value], SchemaError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(SchemaError::NotAnArray { endpoint, field }),
    }
}

pub fn parse_attendance(v: &Value) -> Result<AttendancePayload, SchemaError> {
    let obj = require_object("attendance", v)?;
    let rows = optional_array("attendance", obj, "attendance")?;
    let mut attendance = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(obj) = row.as_object() else {
            tracing::warn!("skipping non-object attendance row");
            continue;
        };
        match AttendanceRecord::deserialize(canonical_attendance_row(obj)) {
            Ok(record) => attendance.push(record),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable attendance row"),
        }
    }
    Ok(AttendancePayload { attendance })
}

pub fn parse_timetable(v: &Value) -> Result<TimetablePayload, SchemaError> {
    let obj = require_object("timetable", v)?;
    let rows = optional_array("timetable", obj, "timetable")?;
    Ok(TimetablePayload {
        timetable: rows.iter().filter_map(TimetableRow::from_value).collect(),
    })
}

pub fn parse_cgpa(v: &Value) -> Result<CgpaPayload, SchemaError> {
    let obj = require_object("cgpa", v)?;
    let rows = optional_array("cgpa", obj, "subjects")?;
    let mut subjects = Vec::with_capacity(rows.len());
    for row in rows.iter().filter(|r| r.is_object()) {
        let grade = GradeRow::deserialize(row).map_err(|source| SchemaError::Invalid {
            endpoint: "cgpa",
            source,
        })?;
        subjects.push(grade);
    }
    Ok(CgpaPayload {
        cgpa: obj.get("cgpa").and_then(parse_cgpa_text),
        cgpa_text: obj
            .get("cgpa")
            .map(text_from_value)
            .filter(|s| !s.is_empty()),
        subjects,
    })
}

pub fn parse_login(v: &Value) -> Result<LoginPayload, SchemaError> {
    require_object("login", v)?;
    LoginPayload::deserialize(v).map_err(|source| SchemaError::Invalid {
        endpoint: "login",
        source,
    })
}

/// Remote endpoints the dashboard reads, all keyed by the portal session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Profile,
    Cgpa,
    Attendance,
    Timetable,
    Subjects,
    InternalMarks,
    CurrentResults,
    OdMlDetails,
    FeePaid,
    FeeDue,
    BankDetails,
    HostelRoomDetails,
    HostelBooking,
    TransportRegistration,
    Announcements,
    EndSemesterFeedback,
    SapFeedback,
    Logout,
}

impl Endpoint {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "profile" => Some(Self::Profile),
            "cgpa" => Some(Self::Cgpa),
            "attendance" => Some(Self::Attendance),
            "timetable" => Some(Self::Timetable),
            "subjects" => Some(Self::Subjects),
            "internalMarks" => Some(Self::InternalMarks),
            "currentResults" => Some(Self::CurrentResults),
            "odMlDetails" => Some(Self::OdMlDetails),
            "feePaid" => Some(Self::FeePaid),
            "feeDue" => Some(Self::FeeDue),
            "bankDetails" => Some(Self::BankDetails),
            "hostelRoomDetails" => Some(Self::HostelRoomDetails),
            "hostelBooking" => Some(Self::HostelBooking),
            "transportRegistration" => Some(Self::TransportRegistration),
            "announcements" => Some(Self::Announcements),
            "endSemesterFeedback" => Some(Self::EndSemesterFeedback),
            "sapFeedback" => Some(Self::SapFeedback),
            "logout" => Some(Self::Logout),
            _ => None,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Profile => "/api/student/profile",
            Self::Cgpa => "/api/student/cgpa",
            Self::Attendance => "/api/student/attendance",
            Self::Timetable => "/api/student/timetable",
            Self::Subjects => "/api/student/subjects",
            Self::InternalMarks => "/api/student/internal-marks",
            Self::CurrentResults => "/api/student/current-semester-results",
            Self::OdMlDetails => "/api/student/od-ml-details",
            Self::FeePaid => "/api/finance/fee-paid",
            Self::FeeDue => "/api/finance/fee-due",
            Self::BankDetails => "/api/finance/bank-details",
            Self::HostelRoomDetails => "/api/hostel/room-details",
            Self::HostelBooking => "/api/hostel/booking",
            Self::TransportRegistration => "/api/transport/registration",
            Self::Announcements => "/api/announcements",
            Self::EndSemesterFeedback => "/api/feedback/end-semester",
            Self::SapFeedback => "/api/sap/feedback",
            Self::Logout => "/api/logout",
        }
    }

    pub fn http_method(self) -> &'static str {
        match self {
            Self::Logout => "DELETE",
            _ => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Value,
    pub timeout_secs: i64,
}

pub fn remote_request(
    endpoint: Endpoint,
    base_url: &str,
    session_id: &str,
    timeout_secs: i64,
) -> RemoteRequest {
    RemoteRequest {
        method: endpoint.http_method(),
        url: format!("{}{}", base_url.trim_end_matches('/'), endpoint.path()),
        body: serde_json::json!({ "session_id": session_id }),
        timeout_secs,
    }
}
