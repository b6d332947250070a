//! Conflict naming for keep-both resolution
//!
//! The local version of a both-sides-changed file is moved aside under a
//! name of the form `stem (conflict YYYY-MM-DD xxxxxxxx).ext` before the
//! remote version is downloaded in its place.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates unique conflict copy names
pub struct ConflictNamer;

impl ConflictNamer {
    /// Generates a conflict copy name stamped with today's date
    ///
    /// Given "report.docx", produces something like
    /// "report (conflict 2026-02-07 a1b2c3d4).docx".
    pub fn generate(original_name: &str) -> String {
        Self::generate_at(original_name, Utc::now())
    }

    /// Generates a conflict copy name stamped with `when`
    pub fn generate_at(original_name: &str, when: DateTime<Utc>) -> String {
        let date = when.format("%Y-%m-%d");
        let tag = Uuid::new_v4().simple().to_string();
        let (stem, ext) = split_extension(original_name);
        format!("{stem} (conflict {date} {}){ext}", &tag[..8])
    }

    /// Generates a name for which `exists` returns false
    ///
    /// Falls back to numbered variants and finally to a full UUID suffix.
    pub fn generate_unique<F>(original_name: &str, mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let candidate = Self::generate(original_name);
        if !exists(&candidate) {
            return candidate;
        }

        let (stem, ext) = split_extension(&candidate);
        for i in 2..=99 {
            let numbered = format!("{stem} {i}{ext}");
            if !exists(&numbered) {
                return numbered;
            }
        }

        format!("{original_name}.conflict-{}", Uuid::new_v4().simple())
    }
}

/// Splits `name` into stem and extension (with its dot)
///
/// A leading dot belongs to the stem, so `.bashrc` has no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(pos) => name.split_at(pos),
    }
}
