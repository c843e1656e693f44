//! Ordered field snapshots of a persisted entity.
//!
//! A snapshot is what the change detector compares: the entity's tracked
//! fields in declaration order, each with a value that knows how to render
//! itself for the audit log.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// One tracked field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    /// True for values a freshly created entity carries when the field was
    /// never filled in.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null | Self::Bool(false) => true,
            Self::Text(text) => text.is_empty(),
            Self::Bool(true) | Self::Int(_) | Self::Decimal(_) | Self::Date(_) => false,
        }
    }

    /// Rendered form written to `old_value`/`new_value`.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value:.2}"),
            Self::Text(value) => f.write_str(value),
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Tracked fields of one entity, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    fields: Vec<(&'static str, FieldValue)>,
}

impl Snapshot {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a field. Builder-style so entity impls read as a field list.
    #[must_use]
    pub fn field(mut self, name: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// An entity whose saves the history subsystem observes.
pub trait Tracked {
    /// Current tracked field values.
    fn snapshot(&self) -> Snapshot;
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Snapshot};
    use chrono::NaiveDate;

    #[test]
    fn values_render_for_audit_log() {
        assert_eq!(FieldValue::Null.render(), "");
        assert_eq!(FieldValue::from(true).render(), "true");
        assert_eq!(FieldValue::from(7_i64).render(), "7");
        assert_eq!(FieldValue::from(12.5_f64).render(), "12.50");
        assert_eq!(FieldValue::from("SN-1").render(), "SN-1");
        let date = NaiveDate::from_ymd_opt(2014, 2, 3).expect("valid date");
        assert_eq!(FieldValue::from(date).render(), "2014-02-03");
        assert_eq!(FieldValue::from(None::<String>).render(), "");
    }

    #[test]
    fn blank_values() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::from("").is_blank());
        assert!(FieldValue::from(false).is_blank());
        assert!(!FieldValue::from(0_i64).is_blank());
        assert!(!FieldValue::from("x").is_blank());
    }

    #[test]
    fn snapshot_keeps_declaration_order() {
        let snap = Snapshot::new()
            .field("sn", "A1")
            .field("barcode", None::<String>)
            .field("status", 2_i64);
        let names: Vec<_> = snap.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["sn", "barcode", "status"]);
        assert_eq!(snap.get("status"), Some(&FieldValue::Int(2)));
        assert_eq!(snap.len(), 3);
    }
}
