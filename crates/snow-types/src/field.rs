//! Tri-state payload fields.
//!
//! Payloads mirror entity shapes but are only partially populated. Each field
//! is [`FieldState::Absent`] (not sent), [`FieldState::Null`] (sent as an
//! explicit null) or [`FieldState::Present`]. The merge engine pattern-matches
//! on this instead of comparing against sentinel values.
//!
//! Serde integration: declare payload fields as
//! `#[serde(default, skip_serializing_if = "FieldState::is_absent")]`. A missing
//! key then decodes to `Absent`, `null` to `Null` and anything else to
//! `Present`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One payload field: absent, explicitly null, or carrying a value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum FieldState<T> {
    /// The payload did not mention the field.
    #[default]
    Absent,
    /// The payload explicitly cleared the field.
    Null,
    /// The payload carries a value.
    Present(T),
}

impl<T> FieldState<T> {
    /// Returns `true` if the field was not sent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns `true` if the field was sent (as null or as a value).
    pub fn is_sent(&self) -> bool {
        !self.is_absent()
    }

    /// Returns `true` if the field carries a value.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Borrow the carried value, if any.
    pub fn as_ref(&self) -> FieldState<&T> {
        match self {
            Self::Absent => FieldState::Absent,
            Self::Null => FieldState::Null,
            Self::Present(v) => FieldState::Present(v),
        }
    }

    /// The carried value, collapsing `Absent` and `Null` into `None`.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the carried value, collapsing `Absent` and `Null` into `None`.
    pub fn present(&self) -> Option<&T> {
        match self {
            Self::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Map the carried value, preserving absence and nullness.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FieldState<U> {
        match self {
            Self::Absent => FieldState::Absent,
            Self::Null => FieldState::Null,
            Self::Present(v) => FieldState::Present(f(v)),
        }
    }
}

impl<T> From<Option<T>> for FieldState<T> {
    /// `None` becomes an explicit null; use [`FieldState::Absent`] for "not sent".
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Null,
        }
    }
}

impl<T: Serialize> Serialize for FieldState<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Present(v) => v.serialize(serializer),
            // Absent is normally skipped by `skip_serializing_if`.
            Self::Absent | Self::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldState<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Into::into)
    }
}
