//! Field-level change detection between two snapshots of one entity.

use crate::model::snapshot::{FieldValue, Snapshot};
use serde::Serialize;

/// One differing field, with both sides in rendered form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

/// Compare `previous` against `current` and return every non-ignored field
/// whose rendered value differs, in `current`'s declaration order.
///
/// With no `previous` snapshot the entity is new: every non-blank field is
/// reported as a change from `""`. Values are compared by their rendered
/// form only, so two values that render identically count as unchanged.
#[must_use]
pub fn detect(
    previous: Option<&Snapshot>,
    current: &Snapshot,
    ignored: &[String],
) -> Vec<FieldChange> {
    current
        .iter()
        .filter(|(name, _)| !ignored.iter().any(|skip| skip == name))
        .filter_map(|(field, value)| {
            let new = value.render();
            let old = match previous {
                None if value.is_blank() => return None,
                None => String::new(),
                Some(prev) => prev.get(field).map(FieldValue::render).unwrap_or_default(),
            };
            (old != new).then_some(FieldChange { field, old, new })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{FieldChange, detect};
    use crate::model::snapshot::Snapshot;
    use proptest::prelude::*;

    fn snap(name: &str, status: i64, remarks: Option<&str>) -> Snapshot {
        Snapshot::new()
            .field("name", name)
            .field("status", status)
            .field("remarks", remarks)
    }

    #[test]
    fn identical_snapshots_produce_nothing() {
        let a = snap("Foo", 2, None);
        assert!(detect(Some(&a), &a.clone(), &[]).is_empty());
    }

    #[test]
    fn changed_fields_are_reported_in_declaration_order() {
        let before = snap("Foo", 2, None);
        let after = snap("Bar", 3, Some("moved"));
        let changes = detect(Some(&before), &after, &[]);
        assert_eq!(
            changes,
            vec![
                FieldChange {
                    field: "name",
                    old: "Foo".into(),
                    new: "Bar".into()
                },
                FieldChange {
                    field: "status",
                    old: "2".into(),
                    new: "3".into()
                },
                FieldChange {
                    field: "remarks",
                    old: String::new(),
                    new: "moved".into()
                },
            ]
        );
    }

    #[test]
    fn creation_produces_history_for_filled_fields() {
        let created = Snapshot::new()
            .field("name", "Foo")
            .field("barcode", None::<String>)
            .field("deleted", false);
        let changes = detect(None, &created, &[]);
        assert_eq!(
            changes,
            vec![FieldChange {
                field: "name",
                old: String::new(),
                new: "Foo".into()
            }]
        );
    }

    #[test]
    fn ignored_fields_are_skipped() {
        let before = snap("Foo", 2, None);
        let after = snap("Bar", 3, None);
        let changes = detect(Some(&before), &after, &["status".to_string()]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "name");
    }

    #[test]
    fn comparison_uses_rendered_form() {
        let before = Snapshot::new().field("code", "7");
        let after = Snapshot::new().field("code", 7_i64);
        assert!(detect(Some(&before), &after, &[]).is_empty());
    }

    proptest! {
        #[test]
        fn reports_exactly_the_differing_fields(
            base in proptest::collection::vec("[a-z]{0,6}", 1..12),
            flips in proptest::collection::vec(any::<bool>(), 12),
        ) {
            const NAMES: [&str; 12] = [
                "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11",
            ];
            let mut before = Snapshot::new();
            let mut after = Snapshot::new();
            let mut expected = 0;
            for (idx, value) in base.iter().enumerate() {
                before = before.field(NAMES[idx], value.as_str());
                if flips[idx] {
                    after = after.field(NAMES[idx], format!("{value}!"));
                    expected += 1;
                } else {
                    after = after.field(NAMES[idx], value.as_str());
                }
            }

            let changes = detect(Some(&before), &after, &[]);
            prop_assert_eq!(changes.len(), expected);
            for change in &changes {
                prop_assert_eq!(format!("{}!", change.old), change.new.clone());
            }
        }
    }
}
