//! Append-only persistence for [`ChangeRecord`]s.

use super::linker::Relinked;
use super::{
    ChangeRecord, FIELD_NAME_MAX_LEN, HistoryPage, HistoryQuery, NewChange, Paging,
    VALUE_MAX_LEN, truncate_chars,
};
use crate::db::{from_us, now_us};
use crate::error::StorageError;
use crate::history::detect::FieldChange;
use crate::model::{AssetId, Subject, SubRecordLinks, SubjectKind, UserId};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use std::str::FromStr;
use tracing::debug;

const SELECT_COLUMNS: &str = "SELECT change_id, changed_at_us, subject_kind, subject_id, \
     asset_id, user_id, field_name, old_value, new_value, comment \
     FROM asset_history_changes";

/// Handle over the `asset_history_changes` table.
#[derive(Debug, Clone, Copy)]
pub struct HistoryStore<'c> {
    conn: &'c Connection,
}

impl<'c> HistoryStore<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append one change record.
    ///
    /// Field name and values are truncated to their storage bounds. Asset
    /// subjects get `asset_id` set immediately; sub-record subjects are left
    /// for the linker.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the insert fails.
    pub fn record(&self, change: NewChange) -> Result<ChangeRecord, StorageError> {
        let at = change.at.map_or_else(now_us, |ts| ts.timestamp_micros());
        let field_name = truncate_chars(&change.field_name, FIELD_NAME_MAX_LEN);
        let old_value = truncate_chars(&change.old_value, VALUE_MAX_LEN);
        let new_value = truncate_chars(&change.new_value, VALUE_MAX_LEN);

        let (asset_id, device_info_id, part_info_id, office_info_id) = match change.subject {
            Subject::Asset(id) => (Some(id.get()), None, None, None),
            Subject::DeviceInfo(id) => (None, Some(id.get()), None, None),
            Subject::PartInfo(id) => (None, None, Some(id.get()), None),
            Subject::OfficeInfo(id) => (None, None, None, Some(id.get())),
        };

        self.conn.execute(
            "INSERT INTO asset_history_changes (
                changed_at_us, subject_kind, subject_id,
                asset_id, device_info_id, part_info_id, office_info_id,
                user_id, field_name, old_value, new_value, comment
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                at,
                change.subject.kind().as_str(),
                change.subject.raw_id(),
                asset_id,
                device_info_id,
                part_info_id,
                office_info_id,
                change.actor_user_id,
                field_name,
                old_value,
                new_value,
                change.comment,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(change_id = id, subject = %change.subject, field = %field_name, "recorded history change");

        Ok(ChangeRecord {
            id,
            timestamp: from_us(at),
            subject: change.subject,
            asset_id: asset_id.map(AssetId),
            actor_user_id: change.actor_user_id,
            field_name,
            old_value,
            new_value,
            comment: change.comment,
        })
    }

    /// Append one asset-attributed record per detected change.
    ///
    /// Takes the [`Relinked`] receipt of the same save so the linker always
    /// runs before an asset's own changes are written. Each record is
    /// attempted independently; the result lists one outcome per change.
    pub fn record_asset_changes(
        &self,
        receipt: &Relinked,
        changes: &[FieldChange],
        actor: Option<UserId>,
        comment: Option<&str>,
    ) -> Vec<(&'static str, Result<ChangeRecord, StorageError>)> {
        let subject = Subject::Asset(receipt.asset_id());
        changes
            .iter()
            .map(|change| {
                let entry = NewChange::new(subject, change.field, &change.old, &change.new)
                    .by(actor)
                    .with_comment(comment.map(str::to_string));
                (change.field, self.record(entry))
            })
            .collect()
    }

    /// Every record written against `subject`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails or a row is corrupt.
    pub fn records_for_subject(&self, subject: Subject) -> Result<Vec<ChangeRecord>, StorageError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE subject_kind = ?1 AND subject_id = ?2 \
             ORDER BY changed_at_us ASC, change_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![subject.kind().as_str(), subject.raw_id()],
                RawChange::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawChange::into_record).collect()
    }

    /// History of one asset, newest first.
    ///
    /// Matches records whose `asset_id` is the asset, or whose device/part/
    /// office column equals the corresponding sub-record in `links`. Ties on
    /// timestamp are broken by record id, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails or a row is corrupt.
    pub fn query_for_asset(
        &self,
        asset_id: AssetId,
        links: SubRecordLinks,
        query: HistoryQuery,
    ) -> Result<HistoryPage, StorageError> {
        let mut filter = String::from(
            " WHERE (asset_id = ?1 OR device_info_id = ?2 OR part_info_id = ?3 OR office_info_id = ?4)",
        );
        if query.status_only {
            filter.push_str(" AND field_name = 'status'");
        }

        let mut bind: Vec<Value> = vec![
            Value::Integer(asset_id.get()),
            links.device_info.map_or(Value::Null, |id| Value::Integer(id.get())),
            links.part_info.map_or(Value::Null, |id| Value::Integer(id.get())),
            links.office_info.map_or(Value::Null, |id| Value::Integer(id.get())),
        ];

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM asset_history_changes{filter}"),
            params_from_iter(bind.iter()),
            |row| row.get(0),
        )?;
        let total = u64::try_from(total).unwrap_or_default();

        let mut sql = format!("{SELECT_COLUMNS}{filter} ORDER BY changed_at_us DESC, change_id DESC");
        let (page, page_size, num_pages) = match query.paging {
            Paging::All => (None, None, u32::from(total > 0)),
            Paging::Page { number, size } => {
                sql.push_str(" LIMIT ?5 OFFSET ?6");
                let offset = i64::from(number.saturating_sub(1)) * i64::from(size);
                bind.push(Value::Integer(i64::from(size)));
                bind.push(Value::Integer(offset));
                let pages = total.div_ceil(u64::from(size));
                (
                    Some(number),
                    Some(size),
                    u32::try_from(pages).unwrap_or(u32::MAX),
                )
            }
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind.iter()), RawChange::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let records = rows
            .into_iter()
            .map(RawChange::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HistoryPage {
            records,
            total,
            page,
            page_size,
            num_pages,
        })
    }
}

struct RawChange {
    id: i64,
    changed_at_us: i64,
    subject_kind: String,
    subject_id: i64,
    asset_id: Option<AssetId>,
    user_id: Option<UserId>,
    field_name: String,
    old_value: String,
    new_value: String,
    comment: Option<String>,
}

impl RawChange {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            changed_at_us: row.get(1)?,
            subject_kind: row.get(2)?,
            subject_id: row.get(3)?,
            asset_id: row.get(4)?,
            user_id: row.get(5)?,
            field_name: row.get(6)?,
            old_value: row.get(7)?,
            new_value: row.get(8)?,
            comment: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<ChangeRecord, StorageError> {
        let kind = SubjectKind::from_str(&self.subject_kind).map_err(|reason| {
            StorageError::Corrupt {
                table: "asset_history_changes",
                id: self.id,
                reason,
            }
        })?;
        Ok(ChangeRecord {
            id: self.id,
            timestamp: from_us(self.changed_at_us),
            subject: Subject::from_parts(kind, self.subject_id),
            asset_id: self.asset_id,
            actor_user_id: self.user_id,
            field_name: self.field_name,
            old_value: self.old_value,
            new_value: self.new_value,
            comment: self.comment,
        })
    }
}
