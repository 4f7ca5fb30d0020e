// src/extract/tracker.rs

use crate::config::SectionHeaders;

/// What a structural (non-numeric, labeled) row turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Label is a configured section header: section set, parent cleared.
    Section,
    /// Parent-label column was populated: parent replaced.
    Parent,
    /// Separator or annotation; context untouched.
    Skipped,
}

/// Section and parent-label context inherited by the data rows below them.
/// One tracker per sheet; never shared or carried over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionTracker {
    section: String,
    parent: String,
}

impl SectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Feed a structural row. `parent_cell` is the normalized text of the
    /// parent-label column, `None` when no such column is configured.
    pub fn mark(
        &mut self,
        label: &str,
        parent_cell: Option<&str>,
        headers: &SectionHeaders,
    ) -> Marker {
        if headers.contains(label) {
            self.section = label.to_owned();
            self.parent.clear();
            return Marker::Section;
        }
        match parent_cell {
            Some(parent) if !parent.is_empty() => {
                self.parent = parent.to_owned();
                Marker::Parent
            }
            _ => Marker::Skipped,
        }
    }
}
