//! Inventory domain types: identifiers, statuses, the asset aggregate, and the
//! field snapshots the change detector compares.

pub mod asset;
pub mod snapshot;

use rusqlite::ToSql;
use snapshot::FieldValue;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::{fmt, num::ParseIntError, str::FromStr};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }

        impl From<$name> for FieldValue {
            fn from(id: $name) -> Self {
                Self::Int(id.0)
            }
        }
    };
}

define_id!(
    /// Identity of an asset row.
    AssetId
);
define_id!(
    /// Identity of a device-info sub-record.
    DeviceInfoId
);
define_id!(
    /// Identity of a part-info sub-record.
    PartInfoId
);
define_id!(
    /// Identity of an office-info (license) sub-record.
    OfficeInfoId
);
define_id!(
    /// Identity of a user. Users live outside the inventory; only the id is stored.
    UserId
);
define_id!(
    /// Identity of a transition definition.
    TransitionId
);
define_id!(
    /// Identity of a reusable transition action.
    ActionId
);
define_id!(
    /// Identity of a recorded transition execution.
    ExecutionId
);

/// Integer asset status code.
///
/// Codes are owned by the inventory; the well-known ones are exposed as
/// associated constants. Unknown codes are still valid statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub u16);

impl Status {
    pub const NEW: Self = Self(1);
    pub const IN_PROGRESS: Self = Self(2);
    pub const WAITING_FOR_RELEASE: Self = Self(3);
    pub const USED: Self = Self(4);
    pub const LOAN: Self = Self(5);
    pub const DAMAGED: Self = Self(6);
    pub const LIQUIDATED: Self = Self(7);
    pub const IN_SERVICE: Self = Self(8);
    pub const IN_REPAIR: Self = Self(9);
    pub const OK: Self = Self(10);

    /// Human label for well-known codes.
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("new"),
            2 => Some("in progress"),
            3 => Some("waiting for release"),
            4 => Some("in use"),
            5 => Some("loan"),
            6 => Some("damaged"),
            7 => Some("liquidated"),
            8 => Some("in service"),
            9 => Some("in repair"),
            10 => Some("ok"),
            _ => None,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::NEW
    }
}

// History stores the raw code, so Display must stay the bare integer.
impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Status {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}

impl From<Status> for FieldValue {
    fn from(status: Status) -> Self {
        Self::Int(i64::from(status.0))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        u16::try_from(raw)
            .map(Self)
            .map_err(|_| rusqlite::types::FromSqlError::OutOfRange(raw))
    }
}

/// The four entity kinds whose saves are observed by the history subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Asset,
    DeviceInfo,
    PartInfo,
    OfficeInfo,
}

impl SubjectKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::DeviceInfo => "device_info",
            Self::PartInfo => "part_info",
            Self::OfficeInfo => "office_info",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(Self::Asset),
            "device_info" => Ok(Self::DeviceInfo),
            "part_info" => Ok(Self::PartInfo),
            "office_info" => Ok(Self::OfficeInfo),
            other => Err(format!("unknown subject kind '{other}'")),
        }
    }
}

/// The entity a change record was originally attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Asset(AssetId),
    DeviceInfo(DeviceInfoId),
    PartInfo(PartInfoId),
    OfficeInfo(OfficeInfoId),
}

impl Subject {
    #[must_use]
    pub const fn kind(self) -> SubjectKind {
        match self {
            Self::Asset(_) => SubjectKind::Asset,
            Self::DeviceInfo(_) => SubjectKind::DeviceInfo,
            Self::PartInfo(_) => SubjectKind::PartInfo,
            Self::OfficeInfo(_) => SubjectKind::OfficeInfo,
        }
    }

    #[must_use]
    pub const fn raw_id(self) -> i64 {
        match self {
            Self::Asset(id) => id.0,
            Self::DeviceInfo(id) => id.0,
            Self::PartInfo(id) => id.0,
            Self::OfficeInfo(id) => id.0,
        }
    }

    #[must_use]
    pub const fn from_parts(kind: SubjectKind, id: i64) -> Self {
        match kind {
            SubjectKind::Asset => Self::Asset(AssetId(id)),
            SubjectKind::DeviceInfo => Self::DeviceInfo(DeviceInfoId(id)),
            SubjectKind::PartInfo => Self::PartInfo(PartInfoId(id)),
            SubjectKind::OfficeInfo => Self::OfficeInfo(OfficeInfoId(id)),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.raw_id())
    }
}

/// The sub-record ids an asset currently links to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRecordLinks {
    pub device_info: Option<DeviceInfoId>,
    pub part_info: Option<PartInfoId>,
    pub office_info: Option<OfficeInfoId>,
}

impl SubRecordLinks {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.device_info.is_none() && self.part_info.is_none() && self.office_info.is_none()
    }
}
