use serde::{Deserialize, Serialize};
use snow_types::FieldState;
use tracing::warn;

use crate::error::MergeError;
use crate::report::MergeReport;

/// How to interpret the fields a payload leaves out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Complete snapshot: incoming always wins, absence means empty.
    Full,
    /// Partial payload: absence means unchanged.
    Patch,
}

impl MergeMode {
    pub fn from_full_flag(is_full_snapshot: bool) -> Self {
        if is_full_snapshot {
            Self::Full
        } else {
            Self::Patch
        }
    }
}

/// State types that absorb a payload shape.
pub trait Merge<P> {
    fn merge(&mut self, payload: P, mode: MergeMode, report: &mut MergeReport);
}

fn assign<T: PartialEq>(field: &'static str, current: &mut T, next: T, report: &mut MergeReport) {
    if *current != next {
        *current = next;
        report.record_change(field);
    }
}

fn skip(error: MergeError, report: &mut MergeReport) {
    warn!(field = error.field(), %error, "skipping malformed payload field");
    report.record_skip(error);
}

/// Merge a field that always has a value.
///
/// A full snapshot that omits the field resets it to `T::default()`. An
/// explicit null is malformed for such a field and is skipped in both modes.
pub fn merge_value<T: PartialEq + Default>(
    field: &'static str,
    current: &mut T,
    incoming: FieldState<T>,
    mode: MergeMode,
    report: &mut MergeReport,
) {
    match (incoming, mode) {
        (FieldState::Present(next), _) => assign(field, current, next, report),
        (FieldState::Null, _) => skip(MergeError::NullForRequired { field }, report),
        (FieldState::Absent, MergeMode::Full) => assign(field, current, T::default(), report),
        (FieldState::Absent, MergeMode::Patch) => {}
    }
}

/// Merge a nullable field. Null clears it; a full snapshot that omits it
/// clears it too.
pub fn merge_option<T: PartialEq>(
    field: &'static str,
    current: &mut Option<T>,
    incoming: FieldState<T>,
    mode: MergeMode,
    report: &mut MergeReport,
) {
    match (incoming, mode) {
        (FieldState::Present(next), _) => assign(field, current, Some(next), report),
        (FieldState::Null, _) | (FieldState::Absent, MergeMode::Full) => {
            assign(field, current, None, report)
        }
        (FieldState::Absent, MergeMode::Patch) => {}
    }
}

/// Like [`merge_value`], but a present value must pass `validate` first.
pub fn merge_validated<T: PartialEq + Default>(
    field: &'static str,
    current: &mut T,
    incoming: FieldState<T>,
    mode: MergeMode,
    report: &mut MergeReport,
    validate: impl FnOnce(&T) -> Result<(), String>,
) {
    if let FieldState::Present(ref value) = incoming {
        if let Err(reason) = validate(value) {
            skip(MergeError::Invalid { field, reason }, report);
            return;
        }
    }
    merge_value(field, current, incoming, mode, report);
}

/// What to do with an owned collection after reading its payload field.
#[derive(Clone, Debug, PartialEq)]
pub enum CollectionUpdate<P> {
    /// The payload did not send the collection; it is unknown, not empty.
    Keep,
    /// Rebuild the collection from exactly these items.
    Replace(Vec<P>),
}

/// Decide how an owned collection merges.
///
/// Collections are replaced wholesale whenever the payload sends them; an
/// explicit null replaces with nothing. Absence keeps the current collection
/// in both modes, because snapshots routinely omit heavy lists.
pub fn merge_collection<P>(incoming: FieldState<Vec<P>>) -> CollectionUpdate<P> {
    match incoming {
        FieldState::Present(items) => CollectionUpdate::Replace(items),
        FieldState::Null => CollectionUpdate::Replace(Vec::new()),
        FieldState::Absent => CollectionUpdate::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Sample {
        name: String,
        topic: Option<String>,
        color: u32,
    }

    #[derive(Default)]
    struct SamplePatch {
        name: FieldState<String>,
        topic: FieldState<String>,
        color: FieldState<u32>,
    }

    impl Merge<SamplePatch> for Sample {
        fn merge(&mut self, payload: SamplePatch, mode: MergeMode, report: &mut MergeReport) {
            merge_value("name", &mut self.name, payload.name, mode, report);
            merge_option("topic", &mut self.topic, payload.topic, mode, report);
            merge_validated("color", &mut self.color, payload.color, mode, report, |c| {
                if *c <= 0xFF_FFFF {
                    Ok(())
                } else {
                    Err(format!("{c:#x} is not an RGB color"))
                }
            });
        }
    }

    fn populated() -> Sample {
        Sample {
            name: "general".into(),
            topic: Some("chat".into()),
            color: 0x00FF00,
        }
    }

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let mut s = populated();
        let mut report = MergeReport::new();
        s.merge(
            SamplePatch {
                name: FieldState::Present("lobby".into()),
                ..Default::default()
            },
            MergeMode::Patch,
            &mut report,
        );
        assert_eq!(s.name, "lobby");
        assert_eq!(s.topic.as_deref(), Some("chat"));
        assert_eq!(s.color, 0x00FF00);
        assert_eq!(report.changed, vec!["name"]);
    }

    #[test]
    fn patch_null_clears_nullable_field() {
        let mut s = populated();
        let mut report = MergeReport::new();
        s.merge(
            SamplePatch {
                topic: FieldState::Null,
                ..Default::default()
            },
            MergeMode::Patch,
            &mut report,
        );
        assert_eq!(s.topic, None);
        assert!(report.changed("topic"));
    }

    #[test]
    fn full_resets_omitted_fields() {
        let mut s = populated();
        let mut report = MergeReport::new();
        s.merge(
            SamplePatch {
                name: FieldState::Present("general".into()),
                ..Default::default()
            },
            MergeMode::Full,
            &mut report,
        );
        assert_eq!(s.name, "general");
        assert_eq!(s.topic, None);
        assert_eq!(s.color, 0);
        assert_eq!(report.changed, vec!["topic", "color"]);
    }

    #[test]
    fn null_for_required_field_is_skipped() {
        let mut s = populated();
        let mut report = MergeReport::new();
        s.merge(
            SamplePatch {
                name: FieldState::Null,
                color: FieldState::Present(0x123456),
                ..Default::default()
            },
            MergeMode::Patch,
            &mut report,
        );
        assert_eq!(s.name, "general");
        assert_eq!(s.color, 0x123456);
        assert_eq!(report.skipped, vec![MergeError::NullForRequired { field: "name" }]);
    }

    #[test]
    fn invalid_value_is_skipped_rest_applies() {
        let mut s = populated();
        let mut report = MergeReport::new();
        s.merge(
            SamplePatch {
                name: FieldState::Present("lobby".into()),
                color: FieldState::Present(0x1_000_000),
                ..Default::default()
            },
            MergeMode::Full,
            &mut report,
        );
        assert_eq!(s.name, "lobby");
        assert_eq!(s.color, 0x00FF00);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].field(), "color");
    }

    #[test]
    fn unchanged_values_are_not_reported() {
        let mut s = populated();
        let mut report = MergeReport::new();
        s.merge(
            SamplePatch {
                name: FieldState::Present("general".into()),
                ..Default::default()
            },
            MergeMode::Patch,
            &mut report,
        );
        assert!(report.is_noop());
    }

    #[test]
    fn collection_updates() {
        assert_eq!(merge_collection::<u8>(FieldState::Absent), CollectionUpdate::Keep);
        assert_eq!(merge_collection::<u8>(FieldState::Null), CollectionUpdate::Replace(vec![]));
        assert_eq!(
            merge_collection(FieldState::Present(vec![1, 2])),
            CollectionUpdate::Replace(vec![1, 2])
        );
    }

    #[test]
    fn report_absorb_dedups_changes() {
        let mut a = MergeReport::new();
        a.record_change("name");
        let mut b = MergeReport::new();
        b.record_change("name");
        b.record_change("topic");
        b.record_skip(MergeError::NullForRequired { field: "kind" });
        a.absorb(b);
        assert_eq!(a.changed, vec!["name", "topic"]);
        assert_eq!(a.skipped.len(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn field_state() -> impl Strategy<Value = FieldState<u32>> {
            prop_oneof![
                Just(FieldState::Absent),
                Just(FieldState::Null),
                any::<u32>().prop_map(FieldState::Present),
            ]
        }

        proptest! {
            #[test]
            fn patch_without_field_is_non_destructive(current in proptest::option::of(any::<u32>())) {
                let mut value = current;
                let mut report = MergeReport::new();
                merge_option("f", &mut value, FieldState::Absent, MergeMode::Patch, &mut report);
                prop_assert_eq!(value, current);
                prop_assert!(report.is_noop());
            }

            #[test]
            fn full_always_takes_incoming(current in proptest::option::of(any::<u32>()), incoming in field_state()) {
                let mut value = current;
                let mut report = MergeReport::new();
                merge_option("f", &mut value, incoming.clone(), MergeMode::Full, &mut report);
                prop_assert_eq!(value, incoming.value());
            }

            #[test]
            fn full_required_takes_incoming_or_default(current in any::<u32>(), incoming in field_state()) {
                let mut value = current;
                let mut report = MergeReport::new();
                merge_value("f", &mut value, incoming.clone(), MergeMode::Full, &mut report);
                match incoming {
                    FieldState::Present(v) => prop_assert_eq!(value, v),
                    FieldState::Absent => prop_assert_eq!(value, 0),
                    FieldState::Null => prop_assert_eq!(value, current),
                }
            }
        }
    }
}
