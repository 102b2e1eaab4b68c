//! Assessment-history and class-scoped persistence engine for the
//! Bewertung form tool.
//!
//! The crate owns three concerns: the rating-event history model with its
//! consensus reduction, the trust-boundary sanitizers and legacy-format
//! migrations, and the versioned multi-class document store. Rendering,
//! PDF layout, and all other UI glue live in the consuming application.

pub mod consensus;
pub mod error;
pub mod migrate;
pub mod model;
pub mod sanitize;
pub mod store;
pub mod taxonomy;

pub use consensus::{
    append_event, count_by_rating, display_state, events_for_rating, most_frequent_rating,
    remove_event,
};
pub use error::{BackendError, MigrationError, StoreError};
pub use migrate::{is_legacy_format, migrate_legacy_assessments, migrate_legacy_document};
pub use model::{
    AllClassesExport, Assessments, Category, ClassData, Competency, LegacyDocument,
    MultiClassStorage, Rating, RatingDisplayState, RatingEvent, SingleClassExport, Student,
    Subject, Thickness,
};
pub use sanitize::{
    sanitize_rating_event, sanitize_rating_event_list, sanitize_student, validate_assessment_data,
    AssessmentDataReport, AssessmentFormat,
};
pub use store::{
    detect_format, export_file_name, validate_class_name, ClassStore, DataFormat, FileBackend,
    ImportOutcome, ImportTarget, MemoryBackend, Scope, StorageBackend,
};
pub use taxonomy::default_subjects;
