//! Trust-boundary repair for rating events and student records.
//!
//! Input is arbitrary JSON from an import file or the persisted document.
//! Every function here either returns a well-formed value or drops the
//! offending unit; none of them abort the caller's batch.

use crate::model::{
    is_plausible_timestamp, now_ms, Assessments, Rating, RatingEvent, Student,
};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Cap on events per competency; bounds memory from adversarial input.
pub const MAX_EVENTS_PER_COMPETENCY: usize = 1000;

fn rating_from_value(raw: &Value) -> Option<Rating> {
    match raw {
        Value::Number(n) => n.as_i64().and_then(Rating::from_i64),
        // Numeric strings are coerced; anything else is rejected.
        Value::String(s) => s.trim().parse::<i64>().ok().and_then(Rating::from_i64),
        _ => None,
    }
}

fn timestamp_from_value(raw: &Value, now: i64) -> i64 {
    match raw {
        Value::Number(n) => {
            if let Some(ts) = n.as_i64().filter(|ts| is_plausible_timestamp(*ts)) {
                return ts;
            }
        }
        Value::String(s) => {
            if let Some(ts) = s
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|ts| is_plausible_timestamp(*ts))
            {
                return ts;
            }
            // Importers sometimes hand us ISO-8601 strings instead of epoch ms.
            if let Ok(dt) = s.trim().parse::<chrono::DateTime<chrono::Utc>>() {
                let ts = dt.timestamp_millis();
                if is_plausible_timestamp(ts) {
                    return ts;
                }
            }
        }
        _ => {}
    }
    now
}

/// Repairs one raw rating event.
///
/// The rating must be an in-range integer or a numeric string; otherwise the
/// whole event is rejected. The timestamp is judged independently: if it
/// cannot be recovered as a plausible integer, numeric string, or ISO-8601
/// date, it falls back to "now" rather than dropping the event.
pub fn sanitize_rating_event(raw: &Value) -> Option<RatingEvent> {
    sanitize_rating_event_at(raw, now_ms())
}

pub(crate) fn sanitize_rating_event_at(raw: &Value, now: i64) -> Option<RatingEvent> {
    let obj = raw.as_object()?;

    let rating = match rating_from_value(obj.get("rating").unwrap_or(&Value::Null)) {
        Some(r) => r,
        None => {
            warn!(raw = %raw, "dropping rating event with unrecoverable rating");
            return None;
        }
    };

    let timestamp = timestamp_from_value(obj.get("timestamp").unwrap_or(&Value::Null), now);
    Some(RatingEvent { rating, timestamp })
}

/// Sanitizes a whole event list: drops unrecoverable entries, caps the
/// input at [`MAX_EVENTS_PER_COMPETENCY`], and returns the survivors
/// sorted ascending by timestamp.
pub fn sanitize_rating_event_list(raw: &Value) -> Vec<RatingEvent> {
    sanitize_rating_event_list_at(raw, now_ms())
}

pub(crate) fn sanitize_rating_event_list_at(raw: &Value, now: i64) -> Vec<RatingEvent> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    let mut out: Vec<RatingEvent> = items
        .iter()
        .take(MAX_EVENTS_PER_COMPETENCY)
        .filter_map(|item| sanitize_rating_event_at(item, now))
        .collect();

    out.sort_by_key(|e| e.timestamp);
    out
}

/// Repairs one raw student record.
///
/// Returns `None` only for genuinely non-object input. A missing or blank
/// id is replaced with a freshly minted one; a missing or blank name gets a
/// numbered placeholder derived from `fallback_index`. Assessments entries
/// are sanitized individually; blank competency keys are dropped outright.
pub fn sanitize_student(raw: &Value, fallback_index: usize) -> Option<Student> {
    sanitize_student_at(raw, fallback_index, now_ms())
}

pub(crate) fn sanitize_student_at(raw: &Value, fallback_index: usize, now: i64) -> Option<Student> {
    let obj = raw.as_object()?;

    let id = match obj.get("id").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => format!("student-{}-{}", Uuid::new_v4(), fallback_index),
    };

    let name = match obj.get("name").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => format!("Schüler {}", fallback_index + 1),
    };

    let mut assessments = Assessments::new();
    if let Some(map) = obj.get("assessments").and_then(|v| v.as_object()) {
        for (competency_id, data) in map {
            if competency_id.trim().is_empty() {
                warn!(student = %id, "dropping assessments entry with blank competency id");
                continue;
            }
            let events = if data.is_array() {
                sanitize_rating_event_list_at(data, now)
            } else if let Some(rating) = rating_from_value(data) {
                // Legacy single-value shape inside an otherwise usable record.
                vec![RatingEvent {
                    rating,
                    timestamp: now,
                }]
            } else {
                warn!(student = %id, competency = %competency_id, "resetting unreadable assessment value");
                Vec::new()
            };
            assessments.insert(competency_id.clone(), events);
        }
    }

    Some(Student {
        id,
        name,
        assessments,
    })
}

/// Shape of a whole assessments map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentFormat {
    /// Every competency holds a bare rating value.
    Legacy,
    /// Every competency holds a list of rating events.
    Modern,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct AssessmentDataReport {
    pub is_valid: bool,
    pub format: AssessmentFormat,
    pub errors: Vec<String>,
}

/// Classifies an assessments map as legacy, modern, or invalid.
///
/// A map mixing bare ratings and event lists across competencies is
/// reported as invalid with an explicit error, never silently resolved to
/// one interpretation. An empty map counts as modern.
pub fn validate_assessment_data(raw: &Value) -> AssessmentDataReport {
    let Some(map) = raw.as_object() else {
        return AssessmentDataReport {
            is_valid: false,
            format: AssessmentFormat::Invalid,
            errors: vec!["assessment data is not an object".to_string()],
        };
    };

    if map.is_empty() {
        return AssessmentDataReport {
            is_valid: true,
            format: AssessmentFormat::Modern,
            errors: Vec::new(),
        };
    }

    let mut errors = Vec::new();
    let mut has_legacy = false;
    let mut has_modern = false;

    for (competency_id, value) in map {
        if competency_id.trim().is_empty() {
            errors.push(format!("invalid competency id: {:?}", competency_id));
            continue;
        }

        if let Some(items) = value.as_array() {
            has_modern = true;
            for (i, item) in items.iter().enumerate() {
                if !is_valid_event_value(item) {
                    errors.push(format!("invalid rating entry at {}[{}]", competency_id, i));
                }
            }
        } else if rating_from_number_only(value).is_some() {
            has_legacy = true;
        } else {
            errors.push(format!(
                "invalid assessment value for {}: {}",
                competency_id, value
            ));
        }
    }

    let format = if has_legacy && has_modern {
        errors.push("mixed legacy and modern format detected".to_string());
        AssessmentFormat::Invalid
    } else if has_legacy {
        AssessmentFormat::Legacy
    } else if has_modern {
        AssessmentFormat::Modern
    } else {
        AssessmentFormat::Invalid
    };

    AssessmentDataReport {
        is_valid: errors.is_empty(),
        format,
        errors,
    }
}

fn rating_from_number_only(value: &Value) -> Option<Rating> {
    value.as_i64().and_then(Rating::from_i64)
}

fn is_valid_event_value(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let rating_ok = obj
        .get("rating")
        .and_then(|v| v.as_i64())
        .and_then(Rating::from_i64)
        .is_some();
    let ts_ok = obj
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .is_some_and(is_plausible_timestamp);
    rating_ok && ts_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MIN_TIMESTAMP_MS;
    use serde_json::json;

    const NOW: i64 = MIN_TIMESTAMP_MS + 1_000_000;

    #[test]
    fn valid_event_passes_unchanged() {
        let raw = json!({ "rating": 3, "timestamp": MIN_TIMESTAMP_MS + 5 });
        let got = sanitize_rating_event_at(&raw, NOW).expect("event");
        assert_eq!(got, RatingEvent::new(Rating::Proficient, MIN_TIMESTAMP_MS + 5));
    }

    #[test]
    fn sanitize_is_idempotent_on_valid_events() {
        let raw = json!({ "rating": 2, "timestamp": MIN_TIMESTAMP_MS + 42 });
        let once = sanitize_rating_event_at(&raw, NOW).expect("event");
        let again =
            sanitize_rating_event_at(&serde_json::to_value(once).expect("json"), NOW)
                .expect("event");
        assert_eq!(once, again);
    }

    #[test]
    fn numeric_string_rating_is_coerced() {
        let raw = json!({ "rating": "4", "timestamp": MIN_TIMESTAMP_MS });
        let got = sanitize_rating_event_at(&raw, NOW).expect("event");
        assert_eq!(got.rating, Rating::Excellent);
    }

    #[test]
    fn unrecoverable_rating_rejects_the_event() {
        for raw in [
            json!({ "rating": 7, "timestamp": MIN_TIMESTAMP_MS }),
            json!({ "rating": "abc", "timestamp": MIN_TIMESTAMP_MS }),
            json!({ "rating": null, "timestamp": MIN_TIMESTAMP_MS }),
            json!({ "timestamp": MIN_TIMESTAMP_MS }),
            json!("not an object"),
        ] {
            assert_eq!(sanitize_rating_event_at(&raw, NOW), None, "raw: {raw}");
        }
    }

    #[test]
    fn timestamp_falls_back_to_now_independently_of_rating() {
        for ts in [json!(0), json!(-3), json!("garbage"), json!(null)] {
            let raw = json!({ "rating": 1, "timestamp": ts });
            let got = sanitize_rating_event_at(&raw, NOW).expect("event");
            assert_eq!(got.timestamp, NOW);
            assert_eq!(got.rating, Rating::Low);
        }
    }

    #[test]
    fn iso_timestamp_string_is_recovered() {
        let raw = json!({ "rating": 0, "timestamp": "2024-06-01T12:00:00Z" });
        let got = sanitize_rating_event_at(&raw, NOW).expect("event");
        let expected = "2024-06-01T12:00:00Z"
            .parse::<chrono::DateTime<chrono::Utc>>()
            .expect("date")
            .timestamp_millis();
        assert_eq!(got.timestamp, expected);
    }

    #[test]
    fn numeric_string_timestamp_is_recovered() {
        let ts = MIN_TIMESTAMP_MS + 123;
        let raw = json!({ "rating": 0, "timestamp": ts.to_string() });
        let got = sanitize_rating_event_at(&raw, NOW).expect("event");
        assert_eq!(got.timestamp, ts);
    }

    #[test]
    fn event_list_drops_bad_entries_and_sorts_ascending() {
        let raw = json!([
            { "rating": 1, "timestamp": MIN_TIMESTAMP_MS + 300 },
            { "rating": 99, "timestamp": MIN_TIMESTAMP_MS + 100 },
            { "rating": 2, "timestamp": MIN_TIMESTAMP_MS + 100 },
        ]);
        let got = sanitize_rating_event_list_at(&raw, NOW);
        assert_eq!(
            got,
            vec![
                RatingEvent::new(Rating::Partial, MIN_TIMESTAMP_MS + 100),
                RatingEvent::new(Rating::Low, MIN_TIMESTAMP_MS + 300),
            ]
        );
    }

    #[test]
    fn event_list_is_capped() {
        let items: Vec<Value> = (0..(MAX_EVENTS_PER_COMPETENCY + 50))
            .map(|i| json!({ "rating": 1, "timestamp": MIN_TIMESTAMP_MS + i as i64 }))
            .collect();
        let got = sanitize_rating_event_list_at(&Value::Array(items), NOW);
        assert_eq!(got.len(), MAX_EVENTS_PER_COMPETENCY);
    }

    #[test]
    fn non_array_event_list_becomes_empty() {
        assert!(sanitize_rating_event_list_at(&json!({"a": 1}), NOW).is_empty());
        assert!(sanitize_rating_event_list_at(&json!(null), NOW).is_empty());
    }

    #[test]
    fn student_with_blank_fields_gets_fallbacks() {
        let raw = json!({ "id": "  ", "name": "", "assessments": {} });
        let got = sanitize_student_at(&raw, 4, NOW).expect("student");
        assert!(got.id.starts_with("student-"));
        assert_eq!(got.name, "Schüler 5");
    }

    #[test]
    fn student_non_object_is_rejected() {
        assert!(sanitize_student_at(&json!([1, 2]), 0, NOW).is_none());
        assert!(sanitize_student_at(&json!("x"), 0, NOW).is_none());
        assert!(sanitize_student_at(&json!(null), 0, NOW).is_none());
    }

    #[test]
    fn student_blank_competency_keys_are_dropped() {
        let raw = json!({
            "id": "s1",
            "name": "Anna",
            "assessments": {
                "   ": [{ "rating": 1, "timestamp": MIN_TIMESTAMP_MS }],
                "comp-1": [{ "rating": 1, "timestamp": MIN_TIMESTAMP_MS }],
            }
        });
        let got = sanitize_student_at(&raw, 0, NOW).expect("student");
        assert_eq!(got.assessments.len(), 1);
        assert!(got.assessments.contains_key("comp-1"));
    }

    #[test]
    fn student_legacy_bare_rating_is_upgraded_in_place() {
        let raw = json!({ "id": "s1", "name": "Anna", "assessments": { "comp-1": 4 } });
        let got = sanitize_student_at(&raw, 0, NOW).expect("student");
        assert_eq!(
            got.assessments["comp-1"],
            vec![RatingEvent::new(Rating::Excellent, NOW)]
        );
    }

    #[test]
    fn student_unreadable_assessment_value_resets_to_empty() {
        let raw = json!({ "id": "s1", "name": "Anna", "assessments": { "comp-1": "junk" } });
        let got = sanitize_student_at(&raw, 0, NOW).expect("student");
        assert_eq!(got.assessments["comp-1"], Vec::<RatingEvent>::new());
    }

    #[test]
    fn validate_empty_map_is_modern() {
        let report = validate_assessment_data(&json!({}));
        assert!(report.is_valid);
        assert_eq!(report.format, AssessmentFormat::Modern);
    }

    #[test]
    fn validate_classifies_pure_shapes() {
        let legacy = json!({ "c1": 3, "c2": 0 });
        assert_eq!(validate_assessment_data(&legacy).format, AssessmentFormat::Legacy);

        let modern = json!({
            "c1": [{ "rating": 3, "timestamp": MIN_TIMESTAMP_MS }],
            "c2": [],
        });
        let report = validate_assessment_data(&modern);
        assert_eq!(report.format, AssessmentFormat::Modern);
        assert!(report.is_valid);
    }

    #[test]
    fn validate_mixed_shapes_is_invalid_with_explicit_error() {
        let mixed = json!({
            "c1": 3,
            "c2": [{ "rating": 1, "timestamp": MIN_TIMESTAMP_MS }],
        });
        let report = validate_assessment_data(&mixed);
        assert_eq!(report.format, AssessmentFormat::Invalid);
        assert!(!report.is_valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("mixed legacy and modern")));
    }

    #[test]
    fn validate_flags_bad_entries_without_aborting() {
        let raw = json!({
            "c1": [{ "rating": 9, "timestamp": MIN_TIMESTAMP_MS }],
            "c2": [{ "rating": 1, "timestamp": MIN_TIMESTAMP_MS }],
        });
        let report = validate_assessment_data(&raw);
        assert_eq!(report.format, AssessmentFormat::Modern);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn validate_non_object_is_invalid() {
        let report = validate_assessment_data(&json!([1, 2, 3]));
        assert_eq!(report.format, AssessmentFormat::Invalid);
        assert!(!report.is_valid);
    }
}
