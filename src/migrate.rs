//! Upgrades legacy assessment and document shapes to the current format.
//!
//! The persisted format evolved from a bare rating per competency to a list
//! of timestamped events, and from a single flat bucket to the multi-class
//! document. Each migration runs at most once, on load.

use crate::error::MigrationError;
use crate::model::{
    now_ms, Assessments, MultiClassStorage, Rating, RatingEvent, Student, Subject,
    STORAGE_VERSION,
};
use crate::sanitize::sanitize_student_at;
use crate::taxonomy::default_subjects;
use serde_json::Value;
use tracing::{debug, warn};

/// True iff at least one value in the map is a bare in-range rating rather
/// than an event array.
pub fn is_legacy_format(assessments: &Value) -> bool {
    let Some(map) = assessments.as_object() else {
        return false;
    };
    map.values()
        .any(|v| v.as_i64().and_then(Rating::from_i64).is_some())
}

/// Converts a legacy bare-rating map to the event-list shape.
///
/// All events produced by one pass carry the same migration timestamp.
/// Blank competency keys are skipped. An out-of-range rating migrates to an
/// empty event list: the data loss stays visible instead of being defaulted
/// to some valid rating. Input that is not iterable as an object at all
/// fails loudly.
pub fn migrate_legacy_assessments(legacy: &Value) -> Result<Assessments, MigrationError> {
    migrate_legacy_assessments_at(legacy, now_ms())
}

pub(crate) fn migrate_legacy_assessments_at(
    legacy: &Value,
    migration_ts: i64,
) -> Result<Assessments, MigrationError> {
    let map = legacy.as_object().ok_or_else(|| {
        MigrationError::new(format!(
            "legacy assessments are not an object: {}",
            shape_name(legacy)
        ))
    })?;

    let mut modern = Assessments::new();
    for (competency_id, value) in map {
        if competency_id.trim().is_empty() {
            warn!("skipping blank competency id during migration");
            continue;
        }

        match value.as_i64().and_then(Rating::from_i64) {
            Some(rating) => {
                modern.insert(
                    competency_id.clone(),
                    vec![RatingEvent {
                        rating,
                        timestamp: migration_ts,
                    }],
                );
            }
            None => {
                warn!(competency = %competency_id, value = %value, "invalid rating during migration, keeping empty history");
                modern.insert(competency_id.clone(), Vec::new());
            }
        }
    }

    Ok(modern)
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Wraps a flat legacy `{students, subjects}` document into the multi-class
/// shape: no classes, everything in the unassigned bucket, no active class.
pub fn migrate_legacy_document(legacy: &Value) -> MultiClassStorage {
    migrate_legacy_document_at(legacy, now_ms())
}

pub(crate) fn migrate_legacy_document_at(legacy: &Value, now: i64) -> MultiClassStorage {
    let students: Vec<Student> = legacy
        .get("students")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, raw)| sanitize_student_at(raw, i, now))
                .collect()
        })
        .unwrap_or_default();

    let subjects: Vec<Subject> = legacy
        .get("subjects")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .filter(|s: &Vec<Subject>| !s.is_empty())
        .unwrap_or_else(default_subjects);

    debug!(students = students.len(), "migrated legacy document to multi-class shape");

    MultiClassStorage {
        version: STORAGE_VERSION.to_string(),
        classes: Vec::new(),
        unassigned_students: students,
        unassigned_subjects: subjects,
        current_class_id: None,
        last_modified: now,
    }
}
