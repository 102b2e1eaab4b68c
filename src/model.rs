use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the persisted multi-class document.
pub const STORAGE_VERSION: &str = "3.0";

/// Lower bound of the plausible timestamp window (2020-01-01T00:00:00Z, ms).
pub const MIN_TIMESTAMP_MS: i64 = 1_577_836_800_000;
/// Upper bound of the plausible timestamp window (2030-12-31T00:00:00Z, ms).
pub const MAX_TIMESTAMP_MS: i64 = 1_924_905_600_000;

/// Ordinal competency rating on the fixed 5-point scale.
///
/// Persisted and exported as the bare integer 0..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rating {
    NotTaught = 0,
    Low = 1,
    Partial = 2,
    Proficient = 3,
    Excellent = 4,
}

impl Rating {
    pub const ALL: [Rating; 5] = [
        Rating::NotTaught,
        Rating::Low,
        Rating::Partial,
        Rating::Proficient,
        Rating::Excellent,
    ];

    pub fn from_i64(v: i64) -> Option<Rating> {
        match v {
            0 => Some(Rating::NotTaught),
            1 => Some(Rating::Low),
            2 => Some(Rating::Partial),
            3 => Some(Rating::Proficient),
            4 => Some(Rating::Excellent),
            _ => None,
        }
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 {
        r as u8
    }
}

impl TryFrom<u8> for Rating {
    type Error = String;

    fn try_from(v: u8) -> Result<Rating, String> {
        Rating::from_i64(v as i64).ok_or_else(|| format!("rating out of range: {}", v))
    }
}

/// One rating decision at one point in time. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingEvent {
    pub rating: Rating,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

impl RatingEvent {
    pub fn new(rating: Rating, timestamp: i64) -> RatingEvent {
        RatingEvent { rating, timestamp }
    }

    /// Whether the timestamp falls inside the plausible date window.
    /// Rejects legacy sentinels (0, negatives) and clock-skew garbage.
    pub fn has_plausible_timestamp(&self) -> bool {
        is_plausible_timestamp(self.timestamp)
    }
}

pub fn is_plausible_timestamp(timestamp: i64) -> bool {
    (MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS).contains(&timestamp)
}

/// Competency id -> rating history. An absent key means "no events".
pub type Assessments = BTreeMap<String, Vec<RatingEvent>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub assessments: Assessments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub competencies: Vec<Competency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub categories: Vec<Category>,
}

/// One named class. Deleted wholesale; its students go with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassData {
    pub id: String,
    pub name: String,
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub last_modified: i64,
}

/// The persisted versioned document: all classes plus the unassigned bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiClassStorage {
    pub version: String,
    pub classes: Vec<ClassData>,
    pub unassigned_students: Vec<Student>,
    pub unassigned_subjects: Vec<Subject>,
    pub current_class_id: Option<String>,
    pub last_modified: i64,
}

/// Flat legacy document shape: one implicit bucket of students/subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDocument {
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
}

/// Export payload for one scope, legacy-compatible plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleClassExport {
    pub version: String,
    pub export_date: String,
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
}

/// Export payload for the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllClassesExport {
    pub version: String,
    pub export_date: String,
    pub classes: Vec<ClassData>,
    pub unassigned_students: Vec<Student>,
    pub unassigned_subjects: Vec<Subject>,
}

/// Line thickness for the rating control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Thickness {
    Thin,
    Medium,
    Thick,
}

/// Visual affordance derived from a competency's history for one rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingDisplayState {
    pub count: usize,
    pub thickness: Thickness,
    pub show_badge: bool,
}

/// Milliseconds since the Unix epoch, from the system clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_round_trips_as_bare_integer() {
        let json = serde_json::to_string(&Rating::Proficient).expect("serialize");
        assert_eq!(json, "3");
        let back: Rating = serde_json::from_str("3").expect("deserialize");
        assert_eq!(back, Rating::Proficient);
    }

    #[test]
    fn out_of_range_rating_fails_to_deserialize() {
        assert!(serde_json::from_str::<Rating>("5").is_err());
        assert!(serde_json::from_str::<Rating>("-1").is_err());
    }

    #[test]
    fn ratings_are_totally_ordered() {
        assert!(Rating::NotTaught < Rating::Low);
        assert!(Rating::Proficient < Rating::Excellent);
        let mut all = Rating::ALL;
        all.sort();
        assert_eq!(all, Rating::ALL);
    }

    #[test]
    fn timestamp_window_rejects_sentinels() {
        assert!(!is_plausible_timestamp(0));
        assert!(!is_plausible_timestamp(-1));
        assert!(!is_plausible_timestamp(MIN_TIMESTAMP_MS - 1));
        assert!(!is_plausible_timestamp(MAX_TIMESTAMP_MS + 1));
        assert!(is_plausible_timestamp(MIN_TIMESTAMP_MS));
        assert!(is_plausible_timestamp(MAX_TIMESTAMP_MS));
    }

    #[test]
    fn class_data_uses_camel_case_wire_names() {
        let class = ClassData {
            id: "class-1".into(),
            name: "1a".into(),
            students: vec![],
            subjects: vec![],
            last_modified: MIN_TIMESTAMP_MS,
        };
        let v = serde_json::to_value(&class).expect("serialize");
        assert!(v.get("lastModified").is_some());
        assert!(v.get("last_modified").is_none());
    }

    #[test]
    fn student_without_assessments_field_deserializes_empty() {
        let s: Student =
            serde_json::from_str(r#"{"id":"s1","name":"Anna"}"#).expect("deserialize");
        assert!(s.assessments.is_empty());
    }
}
