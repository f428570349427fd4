use serde::Serialize;

use crate::calc::ATTENDANCE_THRESHOLD;
use crate::schema::{AttendanceRecord, TimetablePayload, PERIODS_PER_DAY, WEEKDAYS};

/// Shortest label allowed to match by containment in a subject name.
const MIN_CONTAINED_LABEL_LEN: usize = 4;
/// Tokens this short or shorter carry no signal ("of", "&", "II").
const MAX_NOISE_TOKEN_LEN: usize = 2;

fn is_placeholder(label: &str) -> bool {
    label.is_empty() || label == "-"
}

fn significant_tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|t| t.chars().count() > MAX_NOISE_TOKEN_LEN)
        .collect()
}

fn tokens_overlap(label: &str, name: &str) -> bool {
    let label_tokens = significant_tokens(label);
    if label_tokens.is_empty() {
        return false;
    }
    let name_tokens = significant_tokens(name);
    let matched = label_tokens
        .iter()
        .filter(|lt| {
            name_tokens
                .iter()
                .any(|nt| nt.contains(*lt) || lt.contains(*nt))
        })
        .count();
    // At least half of the label's tokens, rounded up.
    let needed = label_tokens.len().div_ceil(2);
    matched > 0 && matched >= needed
}

fn record_matches(label: &str, record: &AttendanceRecord) -> bool {
    let name = record.subject_name.trim().to_lowercase();
    let code = record.subject_code.trim().to_lowercase();
    if name.is_empty() && code.is_empty() {
        return false;
    }

    if name == label || code == label {
        return true;
    }

    if !code.is_empty() && label.contains(code.as_str()) {
        return true;
    }
    if label.chars().count() >= MIN_CONTAINED_LABEL_LEN && name.contains(label) {
        return true;
    }

    tokens_overlap(label, &name)
}

/// Resolve a free-text timetable label to an attendance record.
///
/// Each record is tried in order against exact, containment and token-overlap
/// rules; the first record satisfying any rule is returned.
pub fn match_subject<'a>(
    label: &str,
    records: &'a [AttendanceRecord],
) -> Option<&'a AttendanceRecord> {
    let label = label.trim().to_lowercase();
    if is_placeholder(&label) {
        return None;
    }
    records.iter().find(|r| record_matches(&label, r))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAnnotation {
    pub subject_code: String,
    pub present: u32,
    pub total: u64,
    /// OD/ML counts toward presence here, unlike the bunk planner.
    pub percentage: f64,
    pub is_low: bool,
}

impl SlotAnnotation {
    pub fn for_record(record: &AttendanceRecord) -> Option<Self> {
        let present = u64::from(record.present);
        let odml = u64::from(record.od_ml_taken);
        let total = present + u64::from(record.absent) + odml;
        if total == 0 {
            return None;
        }
        let percentage = 100.0 * ((present + odml) as f64) / (total as f64);
        Some(Self {
            subject_code: record.subject_code.clone(),
            present: record.present,
            total,
            percentage,
            is_low: percentage < ATTENDANCE_THRESHOLD,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSlot {
    pub period: usize,
    pub label: String,
    pub is_empty: bool,
    pub attendance: Option<SlotAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedDay {
    pub day: &'static str,
    pub slots: Vec<AnnotatedSlot>,
}

/// Lay the timetable out as the fixed Monday..Saturday by 8-period grid and
/// attach attendance to every slot whose label resolves to a record.
/// Days missing from the payload come back as all-empty rows.
pub fn annotate_timetable(
    timetable: &TimetablePayload,
    records: &[AttendanceRecord],
) -> Vec<AnnotatedDay> {
    WEEKDAYS
        .iter()
        .map(|&day| {
            let periods = timetable.periods_for(day).unwrap_or(&[]);
            let slots = (0..PERIODS_PER_DAY)
                .map(|period| {
                    let label = periods.get(period).cloned().unwrap_or_default();
                    let is_empty = is_placeholder(label.trim());
                    let attendance = if is_empty {
                        None
                    } else {
                        match_subject(&label, records).and_then(SlotAnnotation::for_record)
                    };
                    AnnotatedSlot {
                        period,
                        label,
                        is_empty,
                        attendance,
                    }
                })
                .collect();
            AnnotatedDay { day, slots }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TimetableRow;

    fn rec(code: &str, name: &str) -> AttendanceRecord {
        AttendanceRecord {
            subject_code: code.to_string(),
            subject_name: name.to_string(),
            present: 30,
            absent: 10,
            ..AttendanceRecord::default()
        }
    }

    #[test]
    fn placeholder_labels_never_match() {
        let records = vec![rec("CS101", "Data Structures")];
        assert!(match_subject("-", &records).is_none());
        assert!(match_subject("", &records).is_none());
        assert!(match_subject("   ", &records).is_none());
    }

    #[test]
    fn exact_code_match() {
        let records = vec![rec("CS101", "Data Structures")];
        let m = match_subject("CS101", &records).expect("match");
        assert_eq!(m.subject_code, "CS101");
        let m = match_subject("  data structures ", &records).expect("match by name");
        assert_eq!(m.subject_code, "CS101");
    }

    #[test]
    fn code_contained_in_label() {
        let records = vec![rec("CS101", "Data Structures")];
        let m = match_subject("CS101 - Lab (Room 4)", &records).expect("match");
        assert_eq!(m.subject_code, "CS101");
    }

    #[test]
    fn label_contained_in_name_needs_four_chars() {
        let records = vec![rec("XX1", "Operating Systems")];
        assert!(match_subject("Operating Sys", &records).is_some());
        assert!(match_subject("sys", &records).is_some(), "token rule still applies");
        assert!(match_subject("ope", &records).is_some(), "token rule substring");
        assert!(match_subject("ms", &records).is_none());
    }

    #[test]
    fn operating_sys_matches_operating_systems() {
        let records = vec![rec("CS202", "Operating Systems")];
        let m = match_subject("Operating Sys", &records).expect("match");
        assert_eq!(m.subject_code, "CS202");
    }

    #[test]
    fn token_overlap_matches_reordered_words() {
        // Not a substring of the name, so only the token rule can accept it.
        let records = vec![rec("CS202", "Operating Systems")];
        assert!(tokens_overlap("systems operating", "operating systems"));
        let m = match_subject("Systems_Operating", &records).expect("match");
        assert_eq!(m.subject_code, "CS202");
    }

    #[test]
    fn token_overlap_needs_half_the_label_tokens() {
        // One of three significant tokens: below ceil(3 / 2) = 2.
        assert!(!tokens_overlap("machine learning lab", "deep machinery"));
        // Two of three.
        assert!(tokens_overlap("machine learning lab", "machine learning"));
        // One of two meets ceil(2 / 2) = 1.
        assert!(tokens_overlap("compiler theory", "compiler design"));
    }

    #[test]
    fn short_tokens_never_match_by_overlap() {
        assert!(!tokens_overlap("xy", "xylophone studies"));
        let records = vec![rec("CS101", "xy analysis")];
        assert!(match_subject("xy", &records).is_none());
    }

    #[test]
    fn first_record_in_order_wins() {
        let records = vec![
            rec("MA101", "Applied Mathematics"),
            rec("MA102", "Mathematics"),
        ];
        let m = match_subject("Mathematics", &records).expect("match");
        assert_eq!(m.subject_code, "MA101");
    }

    #[test]
    fn blank_records_are_skipped() {
        let records = vec![rec("", ""), rec("PH101", "Physics")];
        let m = match_subject("Physics", &records).expect("match");
        assert_eq!(m.subject_code, "PH101");
    }

    #[test]
    fn annotation_counts_odml_as_present() {
        let mut r = rec("CS101", "Data Structures");
        r.present = 25;
        r.absent = 10;
        r.od_ml_taken = 5;
        let a = SlotAnnotation::for_record(&r).expect("annotation");
        assert_eq!(a.total, 40);
        assert_eq!(a.percentage, 75.0);
        assert!(!a.is_low);

        let mut empty = rec("CS102", "Empty");
        empty.present = 0;
        empty.absent = 0;
        assert!(SlotAnnotation::for_record(&empty).is_none());
    }

    #[test]
    fn grid_covers_six_days_by_eight_periods() {
        let timetable = TimetablePayload {
            timetable: vec![TimetableRow {
                day: "Monday".to_string(),
                periods: {
                    let mut p = vec![
                        "CS101".to_string(),
                        String::new(),
                        "Unknown Elective".to_string(),
                    ];
                    p.resize(PERIODS_PER_DAY, String::new());
                    p
                },
            }],
        };
        let records = vec![rec("CS101", "Data Structures")];
        let grid = annotate_timetable(&timetable, &records);
        assert_eq!(grid.len(), 6);
        assert!(grid.iter().all(|d| d.slots.len() == PERIODS_PER_DAY));

        let monday = &grid[0];
        assert_eq!(monday.day, "Monday");
        let first = monday.slots[0].attendance.as_ref().expect("annotated");
        assert_eq!(first.subject_code, "CS101");
        assert_eq!(first.percentage, 75.0);
        assert!(monday.slots[1].is_empty);
        assert!(!monday.slots[2].is_empty);
        assert!(monday.slots[2].attendance.is_none());
        assert!(grid[5].slots.iter().all(|s| s.is_empty));
    }
}
