//! Class-scoped persistence engine.
//!
//! `ClassStore` is the sole owner of the on-device document. It loads the
//! current-version document (migrating the legacy single-bucket shape at
//! most once), manages the class/unassigned scope state machine, and
//! performs multi-class import/export with format detection.

use crate::error::{BackendError, StoreError};
use crate::migrate::migrate_legacy_document_at;
use crate::model::{
    now_ms, AllClassesExport, ClassData, MultiClassStorage, SingleClassExport, Student, Subject,
    STORAGE_VERSION,
};
use crate::sanitize::sanitize_student_at;
use crate::taxonomy::default_subjects;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Key holding the current multi-class document.
pub const MULTI_CLASS_KEY: &str = "zeugnis-assistent-multi-class";
/// Key of the legacy single-bucket document, read-only going forward.
pub const LEGACY_KEY: &str = "zeugnis-assistent-state";

/// Ceiling on the serialized document size (browser storage limit).
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// Ceiling on class name length.
pub const MAX_CLASS_NAME_LEN: usize = 50;

/// Durable key/value storage underneath the store.
pub trait StorageBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), BackendError>;
    fn remove(&mut self, key: &str) -> Result<(), BackendError>;
}

/// In-memory backend for tests, optionally with a byte quota.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    /// A backend that rejects any value larger than `quota_bytes`, the way
    /// a browser rejects writes past its storage quota.
    pub fn with_quota(quota_bytes: usize) -> MemoryBackend {
        MemoryBackend {
            entries: HashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        if let Some(quota) = self.quota_bytes {
            if value.len() > quota {
                return Err(BackendError::QuotaExceeded);
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), BackendError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: &Path) -> Result<FileBackend, BackendError> {
        std::fs::create_dir_all(dir)?;
        Ok(FileBackend {
            dir: dir.to_path_buf(),
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let path = self.key_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        // Write through a temp file so a crash never leaves a torn document.
        let path = self.key_path(key);
        let tmp = self.dir.join(format!("{}.json.writing", key));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), BackendError> {
        let path = self.key_path(key);
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Classification of an import payload or persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Versioned document carrying a `classes` array.
    MultiClass,
    /// Flat `{students, subjects}` shape.
    Legacy,
    Invalid,
}

/// Pure classifier for untrusted payloads. Every import path runs through
/// this; consumers match on the result instead of probing fields ad hoc.
pub fn detect_format(data: &Value) -> DataFormat {
    let Some(obj) = data.as_object() else {
        return DataFormat::Invalid;
    };

    let has_version = obj.get("version").is_some_and(|v| !v.is_null());
    if has_version && obj.get("classes").is_some_and(|v| v.is_array()) {
        return DataFormat::MultiClass;
    }

    if obj.get("students").is_some_and(|v| v.is_array())
        && obj.get("subjects").is_some_and(|v| v.is_array())
    {
        return DataFormat::Legacy;
    }

    DataFormat::Invalid
}

/// A single bucket of students/subjects: a named class or "unassigned".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Unassigned,
    Class(String),
}

/// Target of an import operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Wholesale replacement of the entire document.
    All,
    Unassigned,
    Class(String),
}

/// Result of [`ClassStore::handle_import`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Completed(DataFormat),
    /// A multi-class file was aimed at a single scope. The caller must ask
    /// the user before the destructive full overwrite may proceed (via
    /// [`ClassStore::import_all_classes`]).
    NeedsConfirmation,
}

/// Validates a class name: non-empty after trimming, at most
/// [`MAX_CLASS_NAME_LEN`] characters, and no trimmed case-sensitive
/// duplicate among the other classes. `exclude_id` skips the class being
/// renamed. Pure function, no I/O.
pub fn validate_class_name(
    name: &str,
    existing: &[ClassData],
    exclude_id: Option<&str>,
) -> Result<(), StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidClassName {
            reason: "name must not be empty".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_CLASS_NAME_LEN {
        return Err(StoreError::InvalidClassName {
            reason: format!("name longer than {} characters", MAX_CLASS_NAME_LEN),
        });
    }
    let duplicate = existing.iter().any(|c| {
        if exclude_id.is_some_and(|ex| ex == c.id) {
            return false;
        }
        c.name == trimmed
    });
    if duplicate {
        return Err(StoreError::InvalidClassName {
            reason: format!("a class named {:?} already exists", trimmed),
        });
    }
    Ok(())
}

fn fresh_storage(now: i64) -> MultiClassStorage {
    MultiClassStorage {
        version: STORAGE_VERSION.to_string(),
        classes: Vec::new(),
        unassigned_students: Vec::new(),
        unassigned_subjects: default_subjects(),
        current_class_id: None,
        last_modified: now,
    }
}

fn sanitize_students(raw: Option<&Value>, now: i64) -> Vec<Student> {
    raw.and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, s)| sanitize_student_at(s, i, now))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_subjects_or(raw: Option<&Value>, fallback: Vec<Subject>) -> Vec<Subject> {
    raw.and_then(|v| serde_json::from_value::<Vec<Subject>>(v.clone()).ok())
        .unwrap_or(fallback)
}

/// Repairs one raw class entry. Returns `None` only for non-object input.
fn repair_class(raw: &Value, index: usize, now: i64) -> Option<ClassData> {
    let obj = raw.as_object()?;

    let id = match obj.get("id").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => format!("class-{}", Uuid::new_v4()),
    };
    let name = match obj.get("name").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => format!("Klasse {}", index + 1),
    };

    Some(ClassData {
        id,
        name,
        students: sanitize_students(obj.get("students"), now),
        subjects: parse_subjects_or(obj.get("subjects"), default_subjects()),
        last_modified: obj
            .get("lastModified")
            .and_then(|v| v.as_i64())
            .unwrap_or(now),
    })
}

/// Field-by-field repair of a parsed multi-class document. Missing arrays
/// become empty, corrupt students are dropped individually, and a
/// `currentClassId` that names no surviving class heals to `None`.
fn validate_and_repair(raw: &Value, now: i64) -> MultiClassStorage {
    let classes: Vec<ClassData> = raw
        .get("classes")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, c)| repair_class(c, i, now))
                .collect()
        })
        .unwrap_or_default();

    let current_class_id = raw
        .get("currentClassId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|id| classes.iter().any(|c| &c.id == id));

    MultiClassStorage {
        version: raw
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or(STORAGE_VERSION)
            .to_string(),
        unassigned_students: sanitize_students(raw.get("unassignedStudents"), now),
        unassigned_subjects: parse_subjects_or(raw.get("unassignedSubjects"), default_subjects()),
        classes,
        current_class_id,
        last_modified: raw
            .get("lastModified")
            .and_then(|v| v.as_i64())
            .unwrap_or(now),
    }
}

/// The persistence engine. Construct one per document; tests construct
/// isolated instances over a [`MemoryBackend`].
pub struct ClassStore<B: StorageBackend> {
    backend: B,
    storage: MultiClassStorage,
}

impl<B: StorageBackend> ClassStore<B> {
    /// Loads the document: current key first, then the legacy key (migrated
    /// and persisted immediately so migration runs at most once), else a
    /// fresh document seeded with the default taxonomy.
    pub fn open(backend: B) -> Result<ClassStore<B>, StoreError> {
        let mut store = ClassStore {
            backend,
            storage: fresh_storage(now_ms()),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&mut self) -> Result<(), StoreError> {
        let now = now_ms();

        if let Some(text) = self.backend.get(MULTI_CLASS_KEY)? {
            match serde_json::from_str::<Value>(&text) {
                Ok(parsed) if detect_format(&parsed) == DataFormat::MultiClass => {
                    self.storage = validate_and_repair(&parsed, now);
                    return Ok(());
                }
                Ok(_) => warn!("multi-class document has unrecognized shape, ignoring"),
                Err(e) => warn!(error = %e, "multi-class document is not valid JSON, ignoring"),
            }
        }

        if let Some(text) = self.backend.get(LEGACY_KEY)? {
            match serde_json::from_str::<Value>(&text) {
                Ok(parsed) if detect_format(&parsed) == DataFormat::Legacy => {
                    debug!("migrating legacy single-bucket document");
                    self.storage = migrate_legacy_document_at(&parsed, now);
                    self.save()?;
                    return Ok(());
                }
                Ok(_) => warn!("legacy document has unrecognized shape, ignoring"),
                Err(e) => warn!(error = %e, "legacy document is not valid JSON, ignoring"),
            }
        }

        self.storage = fresh_storage(now);
        Ok(())
    }

    /// Re-reads the backend, simulating an application reload.
    pub fn reload(&mut self) -> Result<&MultiClassStorage, StoreError> {
        self.initialize()?;
        Ok(&self.storage)
    }

    /// Serializes and persists the document. Fails fast with
    /// [`StoreError::StorageFull`] past the size ceiling or on a backend
    /// quota error; in-memory state is not rolled back either way.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let json = serde_json::to_string(&self.storage)?;
        if json.len() > MAX_DOCUMENT_BYTES {
            return Err(StoreError::StorageFull);
        }
        match self.backend.set(MULTI_CLASS_KEY, &json) {
            Ok(()) => Ok(()),
            Err(BackendError::QuotaExceeded) => Err(StoreError::StorageFull),
            Err(e) => Err(StoreError::Backend(e)),
        }
    }

    // Class management

    /// Creates a class and persists. Does not switch scope; callers decide.
    pub fn create_class(
        &mut self,
        name: &str,
        students: Vec<Student>,
        subjects: Vec<Subject>,
    ) -> Result<ClassData, StoreError> {
        validate_class_name(name, &self.storage.classes, None)?;
        let class = ClassData {
            id: format!("class-{}", Uuid::new_v4()),
            name: name.trim().to_string(),
            students,
            subjects,
            last_modified: now_ms(),
        };
        self.storage.classes.push(class.clone());
        self.touch_and_save()?;
        Ok(class)
    }

    /// Renames a class, enforcing the same name rules with self-exclusion.
    pub fn rename_class(&mut self, id: &str, name: &str) -> Result<(), StoreError> {
        validate_class_name(name, &self.storage.classes, Some(id))?;
        let class = self
            .storage
            .classes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::ClassNotFound(id.to_string()))?;
        class.name = name.trim().to_string();
        class.last_modified = now_ms();
        self.touch_and_save()
    }

    pub fn get_class(&self, id: &str) -> Option<&ClassData> {
        self.storage.classes.iter().find(|c| c.id == id)
    }

    pub fn all_classes(&self) -> &[ClassData] {
        &self.storage.classes
    }

    pub fn has_classes(&self) -> bool {
        !self.storage.classes.is_empty()
    }

    /// Fails if `id` names no existing class.
    pub fn switch_to_class(&mut self, id: &str) -> Result<(), StoreError> {
        if self.get_class(id).is_none() {
            return Err(StoreError::ClassNotFound(id.to_string()));
        }
        self.storage.current_class_id = Some(id.to_string());
        self.touch_and_save()
    }

    pub fn switch_to_unassigned(&mut self) -> Result<(), StoreError> {
        self.storage.current_class_id = None;
        self.touch_and_save()
    }

    /// Removes the class wholesale. Its students are discarded with it, not
    /// moved to the unassigned bucket; callers that want to keep them must
    /// export first. Deleting the active class re-homes the scope to
    /// unassigned.
    pub fn delete_class(&mut self, id: &str) -> Result<(), StoreError> {
        let index = self
            .storage
            .classes
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::ClassNotFound(id.to_string()))?;
        self.storage.classes.remove(index);
        if self.storage.current_class_id.as_deref() == Some(id) {
            self.storage.current_class_id = None;
        }
        self.touch_and_save()
    }

    // Current scope

    pub fn current_class_id(&self) -> Option<&str> {
        self.storage.current_class_id.as_deref()
    }

    pub fn current_class(&self) -> Option<&ClassData> {
        self.storage
            .current_class_id
            .as_deref()
            .and_then(|id| self.get_class(id))
    }

    pub fn current_students(&self) -> &[Student] {
        match self.current_class() {
            Some(class) => &class.students,
            None => &self.storage.unassigned_students,
        }
    }

    pub fn current_subjects(&self) -> &[Subject] {
        match self.current_class() {
            Some(class) => &class.subjects,
            None => &self.storage.unassigned_subjects,
        }
    }

    pub fn unassigned_students(&self) -> &[Student] {
        &self.storage.unassigned_students
    }

    pub fn unassigned_subjects(&self) -> &[Subject] {
        &self.storage.unassigned_subjects
    }

    pub fn has_unassigned_students(&self) -> bool {
        !self.storage.unassigned_students.is_empty()
    }

    pub fn storage(&self) -> &MultiClassStorage {
        &self.storage
    }

    /// Replaces the full student/subject lists of whichever scope is active
    /// and persists immediately. No merge happens at this layer.
    pub fn update_current_class(
        &mut self,
        students: Vec<Student>,
        subjects: Vec<Subject>,
    ) -> Result<(), StoreError> {
        match self.storage.current_class_id.clone() {
            Some(id) => {
                let class = self
                    .storage
                    .classes
                    .iter_mut()
                    .find(|c| c.id == id)
                    .ok_or(StoreError::ClassNotFound(id))?;
                class.students = students;
                class.subjects = subjects;
                class.last_modified = now_ms();
            }
            None => {
                self.storage.unassigned_students = students;
                self.storage.unassigned_subjects = subjects;
            }
        }
        self.touch_and_save()
    }

    pub fn update_unassigned(
        &mut self,
        students: Vec<Student>,
        subjects: Vec<Subject>,
    ) -> Result<(), StoreError> {
        self.storage.unassigned_students = students;
        self.storage.unassigned_subjects = subjects;
        self.touch_and_save()
    }

    // Import / export

    /// Exports one scope in the flat legacy-compatible shape, for older
    /// single-class tooling.
    pub fn export_class(&self, scope: &Scope) -> Result<SingleClassExport, StoreError> {
        let (students, subjects) = match scope {
            Scope::Unassigned => (
                self.storage.unassigned_students.clone(),
                self.storage.unassigned_subjects.clone(),
            ),
            Scope::Class(id) => {
                let class = self
                    .get_class(id)
                    .ok_or_else(|| StoreError::ClassNotFound(id.clone()))?;
                (class.students.clone(), class.subjects.clone())
            }
        };
        Ok(SingleClassExport {
            version: STORAGE_VERSION.to_string(),
            export_date: Utc::now().to_rfc3339(),
            students,
            subjects,
        })
    }

    /// Exports the full versioned document plus an export timestamp.
    pub fn export_all_classes(&self) -> AllClassesExport {
        AllClassesExport {
            version: STORAGE_VERSION.to_string(),
            export_date: Utc::now().to_rfc3339(),
            classes: self.storage.classes.clone(),
            unassigned_students: self.storage.unassigned_students.clone(),
            unassigned_subjects: self.storage.unassigned_subjects.clone(),
        }
    }

    /// Overwrites exactly the named scope's students/subjects from a
    /// legacy-shaped payload. Other classes are untouched.
    pub fn import_to_class(&mut self, data: &Value, scope: &Scope) -> Result<(), StoreError> {
        let now = now_ms();
        let students = sanitize_students(data.get("students"), now);
        match scope {
            Scope::Unassigned => {
                self.storage.unassigned_students = students;
                self.storage.unassigned_subjects =
                    parse_subjects_or(data.get("subjects"), default_subjects());
            }
            Scope::Class(id) => {
                let existing_subjects = self
                    .get_class(id)
                    .ok_or_else(|| StoreError::ClassNotFound(id.clone()))?
                    .subjects
                    .clone();
                let subjects = parse_subjects_or(data.get("subjects"), existing_subjects);
                let class = self
                    .storage
                    .classes
                    .iter_mut()
                    .find(|c| &c.id == id)
                    .ok_or_else(|| StoreError::ClassNotFound(id.clone()))?;
                class.students = students;
                class.subjects = subjects;
                class.last_modified = now;
            }
        }
        self.touch_and_save()
    }

    /// Wholesale-replaces the entire document from a multi-class payload
    /// and resets the active scope to unassigned. Destructive by design;
    /// [`handle_import`](Self::handle_import) gates this behind an explicit
    /// confirmation when the caller aimed at a single scope.
    pub fn import_all_classes(&mut self, data: &Value) -> Result<(), StoreError> {
        let now = now_ms();
        let repaired = validate_and_repair(data, now);
        self.storage = MultiClassStorage {
            version: STORAGE_VERSION.to_string(),
            classes: repaired.classes,
            unassigned_students: repaired.unassigned_students,
            unassigned_subjects: repaired.unassigned_subjects,
            current_class_id: None,
            last_modified: now,
        };
        self.save()
    }

    /// Format-detecting import entry point.
    ///
    /// A multi-class file aimed at a single scope is never imported
    /// silently: the caller receives [`ImportOutcome::NeedsConfirmation`],
    /// obtains user consent, and then calls
    /// [`import_all_classes`](Self::import_all_classes) itself.
    pub fn handle_import(
        &mut self,
        data: &Value,
        target: ImportTarget,
    ) -> Result<ImportOutcome, StoreError> {
        let format = detect_format(data);
        match format {
            DataFormat::Invalid => Err(StoreError::InvalidFormat),
            DataFormat::MultiClass => match target {
                ImportTarget::All => {
                    self.import_all_classes(data)?;
                    Ok(ImportOutcome::Completed(DataFormat::MultiClass))
                }
                _ => Ok(ImportOutcome::NeedsConfirmation),
            },
            DataFormat::Legacy => {
                let scope = match target {
                    ImportTarget::Class(id) => Scope::Class(id),
                    // A legacy file against "everything" lands in the
                    // unassigned bucket.
                    ImportTarget::Unassigned | ImportTarget::All => Scope::Unassigned,
                };
                self.import_to_class(data, &scope)?;
                Ok(ImportOutcome::Completed(DataFormat::Legacy))
            }
        }
    }

    fn touch_and_save(&mut self) -> Result<(), StoreError> {
        self.storage.last_modified = now_ms();
        self.save()
    }
}

/// Builds the export filename: `BewertungSaph_<prefix>_<date>_<time>.json`,
/// spaces in class names replaced with underscores.
pub fn export_file_name(target: &ImportTarget, class_name: Option<&str>) -> String {
    export_file_name_at(target, class_name, Utc::now())
}

pub(crate) fn export_file_name_at(
    target: &ImportTarget,
    class_name: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let prefix = match target {
        ImportTarget::All => "Alle_Klassen".to_string(),
        ImportTarget::Unassigned => "Ohne_Klasse".to_string(),
        ImportTarget::Class(_) => class_name
            .filter(|n| !n.trim().is_empty())
            .map(|n| n.split_whitespace().collect::<Vec<_>>().join("_"))
            .unwrap_or_else(|| "Klasse".to_string()),
    };
    format!(
        "BewertungSaph_{}_{}_{}.json",
        prefix,
        now.format("%Y-%m-%d"),
        now.format("%H-%M-%S")
    )
}
