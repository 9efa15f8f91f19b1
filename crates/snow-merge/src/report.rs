use crate::error::MergeError;

/// What a merge did: the fields whose value changed, and the fields that were
/// skipped as malformed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub changed: Vec<&'static str>,
    pub skipped: Vec<MergeError>,
}

impl MergeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the merge changed nothing and skipped nothing.
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.skipped.is_empty()
    }

    pub fn changed(&self, field: &str) -> bool {
        self.changed.iter().any(|f| *f == field)
    }

    pub fn record_change(&mut self, field: &'static str) {
        if !self.changed.contains(&field) {
            self.changed.push(field);
        }
    }

    pub fn record_skip(&mut self, error: MergeError) {
        self.skipped.push(error);
    }

    /// Fold another report (typically a child entity's) into this one.
    pub fn absorb(&mut self, other: MergeReport) {
        for field in other.changed {
            self.record_change(field);
        }
        self.skipped.extend(other.skipped);
    }
}
