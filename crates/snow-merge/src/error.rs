/// A payload field that could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// An explicit null was sent for a field that cannot be empty.
    #[error("field '{field}' is required but was sent as null")]
    NullForRequired { field: &'static str },

    /// The sent value failed validation.
    #[error("field '{field}' rejected: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl MergeError {
    /// The offending field name.
    pub fn field(&self) -> &'static str {
        match self {
            Self::NullForRequired { field } | Self::Invalid { field, .. } => field,
        }
    }
}
