use super::snapshot::{Snapshot, Tracked};
use super::{AssetId, DeviceInfoId, OfficeInfoId, PartInfoId, Status, SubRecordLinks, UserId};
use chrono::NaiveDate;
use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Whether an asset is a standalone device or a part installed into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    #[default]
    Device,
    Part,
}

impl AssetKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Part => "part",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for AssetKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "device" => Ok(Self::Device),
            "part" => Ok(Self::Part),
            _ => Err(ParseEnumError {
                expected: "asset kind",
                got: s.to_string(),
            }),
        }
    }
}

impl ToSql for AssetKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AssetKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

/// The asset aggregate root.
///
/// `id` is `None` until the asset store first persists it. The three
/// sub-record ids are the 1:1 extensions the history linker follows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Asset {
    pub id: Option<AssetId>,
    pub kind: AssetKind,
    pub status: Status,
    pub sn: Option<String>,
    pub barcode: Option<String>,
    pub model: String,
    pub price: Option<f64>,
    pub remarks: String,
    pub niw: Option<String>,
    pub order_no: Option<String>,
    pub invoice_no: Option<String>,
    pub owner_id: Option<UserId>,
    pub user_id: Option<UserId>,
    pub warehouse: Option<String>,
    pub device_info: Option<DeviceInfoId>,
    pub part_info: Option<PartInfoId>,
    pub office_info: Option<OfficeInfoId>,
    pub deleted: bool,
}

impl Asset {
    #[must_use]
    pub const fn links(&self) -> SubRecordLinks {
        SubRecordLinks {
            device_info: self.device_info,
            part_info: self.part_info,
            office_info: self.office_info,
        }
    }
}

impl Tracked for Asset {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
            .field("type", self.kind.as_str())
            .field("status", self.status)
            .field("sn", self.sn.clone())
            .field("barcode", self.barcode.clone())
            .field("model", self.model.as_str())
            .field("price", self.price)
            .field("remarks", self.remarks.as_str())
            .field("niw", self.niw.clone())
            .field("order_no", self.order_no.clone())
            .field("invoice_no", self.invoice_no.clone())
            .field("owner", self.owner_id)
            .field("user", self.user_id)
            .field("warehouse", self.warehouse.clone())
            .field("device_info", self.device_info)
            .field("part_info", self.part_info)
            .field("office_info", self.office_info)
            .field("deleted", self.deleted)
    }
}

/// Rack placement details of a device asset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub id: Option<DeviceInfoId>,
    pub ralph_device_id: Option<i64>,
    pub u_level: Option<String>,
    pub u_height: Option<String>,
    pub rack: Option<String>,
}

impl Tracked for DeviceInfo {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
            .field("ralph_device_id", self.ralph_device_id)
            .field("u_level", self.u_level.clone())
            .field("u_height", self.u_height.clone())
            .field("rack", self.rack.clone())
    }
}

/// Where a part asset came from and which device it is installed in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartInfo {
    pub id: Option<PartInfoId>,
    pub barcode_salvaged: Option<String>,
    pub source_device: Option<AssetId>,
    pub device: Option<AssetId>,
}

impl Tracked for PartInfo {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
            .field("barcode_salvaged", self.barcode_salvaged.clone())
            .field("source_device", self.source_device)
            .field("device", self.device)
    }
}

/// Software license details attached to an asset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficeInfo {
    pub id: Option<OfficeInfoId>,
    pub license_key: Option<String>,
    pub version: Option<String>,
    pub unit_price: Option<f64>,
    pub license_type: Option<String>,
    pub date_of_last_inventory: Option<NaiveDate>,
    pub last_logged_user: Option<String>,
}

impl Tracked for OfficeInfo {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
            .field("license_key", self.license_key.clone())
            .field("version", self.version.clone())
            .field("unit_price", self.unit_price)
            .field("license_type", self.license_type.clone())
            .field("date_of_last_inventory", self.date_of_last_inventory)
            .field("last_logged_user", self.last_logged_user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{Asset, AssetKind, DeviceInfo};
    use crate::model::snapshot::{FieldValue, Tracked};
    use crate::model::{DeviceInfoId, Status};
    use std::str::FromStr;

    #[test]
    fn asset_kind_parses_case_insensitively() {
        assert_eq!(AssetKind::from_str(" Part ").expect("parse"), AssetKind::Part);
        assert!(AssetKind::from_str("rack").is_err());
    }

    #[test]
    fn asset_snapshot_exposes_links_and_status() {
        let asset = Asset {
            status: Status::USED,
            device_info: Some(DeviceInfoId(9)),
            ..Asset::default()
        };
        let snap = asset.snapshot();
        assert_eq!(snap.get("status"), Some(&FieldValue::Int(4)));
        assert_eq!(snap.get("device_info"), Some(&FieldValue::Int(9)));
        assert_eq!(snap.get("part_info"), Some(&FieldValue::Null));
        assert_eq!(asset.links().device_info, Some(DeviceInfoId(9)));
    }

    #[test]
    fn default_asset_is_new_device() {
        let asset = Asset::default();
        assert!(asset.id.is_none());
        assert_eq!(asset.kind, AssetKind::Device);
        assert_eq!(asset.status, Status::NEW);
        assert!(asset.links().is_empty());
    }

    #[test]
    fn device_info_snapshot_field_order() {
        let names: Vec<_> = DeviceInfo::default()
            .snapshot()
            .iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["ralph_device_id", "u_level", "u_height", "rack"]);
    }
}
