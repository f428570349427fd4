use serde::Serialize;

use crate::schema::AttendanceRecord;

/// Minimum attendance, in percent, a subject must hold.
pub const ATTENDANCE_THRESHOLD: f64 = 75.0;
/// Lower edge of the "Low" band; anything under it is critical.
pub const LOW_BAND_FLOOR: f64 = 65.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceBand {
    Good,
    Low,
    Critical,
}

impl AttendanceBand {
    pub fn classify(percent: f64) -> Self {
        if percent >= ATTENDANCE_THRESHOLD {
            Self::Good
        } else if percent >= LOW_BAND_FLOOR {
            Self::Low
        } else {
            Self::Critical
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Low => "Low",
            Self::Critical => "Critical",
        }
    }
}

/// Parse-or-zero for counts scraped out of portal tables.
///
/// Takes the leading run of ASCII digits after optional whitespace, so
/// `"12 hrs"` is 12 and `"abc"` is 0. A leading sign of any kind yields 0.
pub fn parse_count(raw: &str) -> u32 {
    let digits: String = raw
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 0;
    }
    // Saturate instead of wrapping on absurdly long digit runs.
    digits.parse::<u32>().unwrap_or(u32::MAX)
}

/// Leading decimal prefix of `raw` (`"87.5%"` -> 87.5), or None when the
/// text does not start with a number.
pub fn leading_decimal(raw: &str) -> Option<f64> {
    let t = raw.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in t.char_indices() {
        if c.is_ascii_digit() {
            end = i + 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
        } else if i == 0 && (c == '-' || c == '+') {
            continue;
        } else {
            break;
        }
    }
    if end == 0 {
        return None;
    }
    t[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse-or-zero for percentages.
pub fn parse_percent(raw: &str) -> f64 {
    leading_decimal(raw).unwrap_or(0.0)
}

fn ratio_percent(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        0.0
    } else {
        100.0 * (num as f64) / (denom as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTotals {
    pub present: u64,
    pub absent: u64,
    pub od_ml: u64,
}

impl AttendanceTotals {
    pub fn classes(&self) -> u64 {
        self.present + self.absent + self.od_ml
    }
}

pub fn attendance_totals<'a, I>(records: I) -> AttendanceTotals
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut totals = AttendanceTotals::default();
    for r in records {
        totals.present += u64::from(r.present);
        totals.absent += u64::from(r.absent);
        totals.od_ml += u64::from(r.od_ml_taken);
    }
    totals
}

/// Overall attendance as a ratio of summed counts across every subject.
/// Not the mean of per-subject percentages.
pub fn aggregate(records: &[AttendanceRecord]) -> f64 {
    let totals = attendance_totals(records);
    ratio_percent(totals.present, totals.classes())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BunkPlan {
    pub total_classes: u64,
    pub current_attendance: f64,
    pub can_bunk: u64,
    pub need_to_attend: u64,
    pub after_bunk_attendance: f64,
    pub after_attend_attendance: f64,
}

impl BunkPlan {
    pub fn meets_threshold(&self) -> bool {
        // Below the threshold need_to_attend is always at least 1.
        self.total_classes > 0 && self.need_to_attend == 0
    }
}

/// Bunk planner for one subject at the 75% threshold.
///
/// With p present and t total:
/// - at or above 75% (4p >= 3t): can_bunk = floor((p - 0.75t) / 0.75) = floor((4p - 3t) / 3)
/// - below 75%: need_to_attend = ceil((0.75t - p) / 0.25) = 3t - 4p
///
/// Integer forms keep the 75% boundary exact.
pub fn plan(present: u32, absent: u32, odml: u32) -> BunkPlan {
    let p = u64::from(present);
    let t = p + u64::from(absent) + u64::from(odml);
    if t == 0 {
        return BunkPlan {
            total_classes: 0,
            current_attendance: 0.0,
            can_bunk: 0,
            need_to_attend: 0,
            after_bunk_attendance: 0.0,
            after_attend_attendance: 0.0,
        };
    }

    let (can_bunk, need_to_attend) = if 4 * p >= 3 * t {
        ((4 * p - 3 * t) / 3, 0)
    } else {
        (0, 3 * t - 4 * p)
    };

    BunkPlan {
        total_classes: t,
        current_attendance: ratio_percent(p, t),
        can_bunk,
        need_to_attend,
        after_bunk_attendance: ratio_percent(p, t + 1),
        after_attend_attendance: ratio_percent(p + 1, t + 1),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BunkAdvice {
    #[serde(rename_all = "camelCase")]
    CanBunk { classes: u64, after_bunk: f64 },
    #[serde(rename_all = "camelCase")]
    Attend { classes: u64 },
    #[serde(rename_all = "camelCase")]
    MustAttend { classes: u64 },
}

impl BunkAdvice {
    pub fn for_band(band: AttendanceBand, plan: &BunkPlan) -> Self {
        match band {
            AttendanceBand::Good => Self::CanBunk {
                classes: plan.can_bunk,
                after_bunk: plan.after_bunk_attendance,
            },
            AttendanceBand::Low => Self::Attend {
                classes: plan.need_to_attend,
            },
            AttendanceBand::Critical => Self::MustAttend {
                classes: plan.need_to_attend,
            },
        }
    }

    pub fn message(&self) -> String {
        fn classes_word(n: u64) -> &'static str {
            if n == 1 {
                "class"
            } else {
                "classes"
            }
        }
        match self {
            Self::CanBunk { classes, .. } => {
                format!("Can bunk {} {}", classes, classes_word(*classes))
            }
            Self::Attend { classes } => {
                format!("Attend {} {} to reach 75%", classes, classes_word(*classes))
            }
            Self::MustAttend { classes } => {
                format!("Must attend {} classes. Critical! Reach 75%", classes)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendance {
    pub subject_code: String,
    pub subject_name: String,
    pub classes_conducted: u32,
    pub present: u32,
    pub absent: u32,
    pub od_ml_taken: u32,
    pub attendance_percentage: f64,
    pub present_percentage: Option<f64>,
    pub od_ml_approved: u32,
    pub band: AttendanceBand,
    pub plan: BunkPlan,
    pub advice: BunkAdvice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub overall_percentage: f64,
    pub overall_band: AttendanceBand,
    pub totals: AttendanceTotals,
    pub subjects: Vec<SubjectAttendance>,
}

pub fn subject_attendance(record: &AttendanceRecord) -> SubjectAttendance {
    let plan = plan(record.present, record.absent, record.od_ml_taken);
    // Rows are banded on the portal's own percentage; the plan works from counts.
    let band = AttendanceBand::classify(record.attendance_percentage);
    SubjectAttendance {
        subject_code: record.subject_code.clone(),
        subject_name: record.subject_name.clone(),
        classes_conducted: record.classes_conducted,
        present: record.present,
        absent: record.absent,
        od_ml_taken: record.od_ml_taken,
        attendance_percentage: record.attendance_percentage,
        present_percentage: record.present_percentage,
        od_ml_approved: record.od_ml_approved,
        band,
        advice: BunkAdvice::for_band(band, &plan),
        plan,
    }
}

pub fn summarize_attendance(records: &[AttendanceRecord]) -> AttendanceSummary {
    let overall_percentage = aggregate(records);
    AttendanceSummary {
        overall_percentage,
        overall_band: AttendanceBand::classify(overall_percentage),
        totals: attendance_totals(records),
        subjects: records.iter().map(subject_attendance).collect(),
    }
}

/// Fixed-decimal rendering for display strings (`87.5%`).
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(present: u32, absent: u32, odml: u32) -> AttendanceRecord {
        AttendanceRecord {
            subject_code: "CS101".to_string(),
            subject_name: "Data Structures".to_string(),
            classes_conducted: present + absent + odml,
            present,
            absent,
            od_ml_taken: odml,
            ..AttendanceRecord::default()
        }
    }

    #[test]
    fn parse_count_takes_leading_digits() {
        assert_eq!(parse_count("12"), 12);
        assert_eq!(parse_count("  7 "), 7);
        assert_eq!(parse_count("12 hrs"), 12);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("abc"), 0);
        assert_eq!(parse_count("-3"), 0);
        assert_eq!(parse_count("99999999999999"), u32::MAX);
    }

    #[test]
    fn parse_percent_takes_leading_decimal() {
        assert_eq!(parse_percent("87.5"), 87.5);
        assert_eq!(parse_percent("87.5%"), 87.5);
        assert_eq!(parse_percent(" 100 "), 100.0);
        assert_eq!(parse_percent("n/a"), 0.0);
        assert_eq!(parse_percent(""), 0.0);
        assert_eq!(parse_percent("."), 0.0);
    }

    #[test]
    fn aggregate_empty_is_zero() {
        assert_eq!(aggregate(&[]), 0.0);
    }

    #[test]
    fn aggregate_single_record_matches_its_ratio() {
        for (p, a, o) in [(30, 10, 0), (0, 5, 0), (7, 2, 3), (0, 0, 0), (1, 0, 0)] {
            let r = record(p, a, o);
            let total = p + a + o;
            let expected = if total == 0 {
                0.0
            } else {
                100.0 * p as f64 / total as f64
            };
            assert_eq!(aggregate(std::slice::from_ref(&r)), expected);
        }
    }

    #[test]
    fn aggregate_is_ratio_of_totals_not_mean() {
        // 10/10 and 0/30: mean of percentages would be 50, ratio of totals is 25.
        let records = vec![record(10, 0, 0), record(0, 30, 0)];
        assert_eq!(aggregate(&records), 25.0);
    }

    #[test]
    fn plan_exactly_at_threshold() {
        let p = plan(30, 10, 0);
        assert_eq!(p.total_classes, 40);
        assert_eq!(p.current_attendance, 75.0);
        assert_eq!(p.can_bunk, 0);
        assert_eq!(p.need_to_attend, 0);
    }

    #[test]
    fn plan_below_threshold_needs_forty() {
        let p = plan(20, 20, 0);
        assert_eq!(p.current_attendance, 50.0);
        assert_eq!(p.need_to_attend, 40);
        assert_eq!(p.can_bunk, 0);
        assert!((20.0 + 40.0) / (40.0 + 40.0) >= 0.75);
    }

    #[test]
    fn plan_above_threshold_can_bunk_six() {
        let p = plan(35, 5, 0);
        assert_eq!(p.current_attendance, 87.5);
        assert_eq!(p.can_bunk, 6);
        assert!(35.0 / 46.0 >= 0.75);
        assert!(35.0 / 47.0 < 0.75);
    }

    #[test]
    fn plan_empty_is_all_zero() {
        let p = plan(0, 0, 0);
        assert_eq!(p.total_classes, 0);
        assert_eq!(p.current_attendance, 0.0);
        assert_eq!(p.can_bunk, 0);
        assert_eq!(p.need_to_attend, 0);
        assert_eq!(p.after_bunk_attendance, 0.0);
        assert_eq!(p.after_attend_attendance, 0.0);
    }

    #[test]
    fn plan_counts_odml_against_presence() {
        // 30 present out of 40 total with 10 OD/ML.
        let p = plan(30, 0, 10);
        assert_eq!(p.current_attendance, 75.0);
        assert_eq!(p.can_bunk, 0);
    }

    #[test]
    fn plan_projections_step_one_class() {
        let p = plan(3, 1, 0);
        assert_eq!(p.after_bunk_attendance, 60.0);
        assert_eq!(p.after_attend_attendance, 80.0);
    }

    #[test]
    fn plan_results_are_tight_for_small_counts() {
        for present in 0..60u32 {
            for absent in 0..60u32 {
                let p = plan(present, absent, 0);
                let t = u64::from(present + absent);
                let pr = u64::from(present);
                if t == 0 {
                    continue;
                }
                if p.meets_threshold() {
                    let x = p.can_bunk;
                    assert!(4 * pr >= 3 * (t + x), "{present}/{absent} bunk {x}");
                    assert!(4 * pr < 3 * (t + x + 1), "{present}/{absent} bunk {x}+1");
                } else {
                    let y = p.need_to_attend;
                    assert!(4 * (pr + y) >= 3 * (t + y), "{present}/{absent} attend {y}");
                    assert!(y == 0 || 4 * (pr + y - 1) < 3 * (t + y - 1));
                }
            }
        }
    }

    #[test]
    fn plan_and_aggregate_are_idempotent() {
        let records = vec![record(12, 4, 1), record(3, 9, 0)];
        assert_eq!(plan(12, 4, 1), plan(12, 4, 1));
        assert_eq!(aggregate(&records), aggregate(&records));
    }

    #[test]
    fn bands_split_at_75_and_65() {
        assert_eq!(AttendanceBand::classify(75.0), AttendanceBand::Good);
        assert_eq!(AttendanceBand::classify(74.99), AttendanceBand::Low);
        assert_eq!(AttendanceBand::classify(65.0), AttendanceBand::Low);
        assert_eq!(AttendanceBand::classify(64.99), AttendanceBand::Critical);
        assert_eq!(AttendanceBand::classify(0.0), AttendanceBand::Critical);
    }

    #[test]
    fn advice_follows_band() {
        let good = plan(35, 5, 0);
        assert_eq!(
            BunkAdvice::for_band(AttendanceBand::Good, &good).message(),
            "Can bunk 6 classes"
        );
        let low = plan(7, 3, 0);
        assert_eq!(low.need_to_attend, 2);
        assert_eq!(
            BunkAdvice::for_band(AttendanceBand::Low, &low).message(),
            "Attend 2 classes to reach 75%"
        );
        let one = plan(2, 1, 0);
        assert_eq!(one.need_to_attend, 1);
        assert_eq!(
            BunkAdvice::for_band(AttendanceBand::Low, &one).message(),
            "Attend 1 class to reach 75%"
        );
    }

    #[test]
    fn format_percent_uses_fixed_decimals() {
        assert_eq!(format_percent(87.5, 1), "87.5%");
        assert_eq!(format_percent(100.0 / 3.0, 2), "33.33%");
        assert_eq!(format_percent(75.0, 0), "75%");
    }
}
