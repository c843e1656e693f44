//! SQLite persistence for assets and their sub-records.
//!
//! Every successful write is followed by a [`SaveEvent`] into the history
//! dispatcher, with the persisted state from before the write as the
//! baseline. History failures are returned in the [`HookReport`], never as an
//! error of the save itself.

use super::now_us;
use crate::error::StorageError;
use crate::history::hooks::{HookReport, SaveEvent, SaveHookDispatcher};
use crate::model::asset::{Asset, DeviceInfo, OfficeInfo, PartInfo};
use crate::model::snapshot::{Snapshot, Tracked};
use crate::model::{
    AssetId, DeviceInfoId, OfficeInfoId, PartInfoId, Subject, SubRecordLinks, UserId,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Who saved and why; copied onto every history record of the save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveContext {
    pub actor: Option<UserId>,
    pub comment: Option<String>,
}

impl SaveContext {
    #[must_use]
    pub const fn by(actor: Option<UserId>) -> Self {
        Self {
            actor,
            comment: None,
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Asset persistence as seen by the transition engine.
pub trait AssetStore {
    /// # Errors
    ///
    /// Returns [`StorageError`] if the lookup fails.
    fn load_asset(&self, id: AssetId) -> Result<Option<Asset>, StorageError>;

    /// Insert (`asset.id == None`) or update the asset, then record its
    /// history. On insert the new id is written back into `asset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the asset write fails. History write
    /// failures are reported in the returned [`HookReport`] instead.
    fn save_asset(&self, asset: &mut Asset, ctx: &SaveContext)
    -> Result<HookReport, StorageError>;
}

/// [`AssetStore`] over the stockroom SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteAssetStore<'c> {
    conn: &'c Connection,
    hooks: SaveHookDispatcher<'c>,
}

impl<'c> SqliteAssetStore<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            hooks: SaveHookDispatcher::new(conn),
        }
    }

    /// Fields left out of history for every entity this store saves.
    #[must_use]
    pub fn with_ignored_fields(mut self, ignored: Vec<String>) -> Self {
        self.hooks = self.hooks.with_ignored_fields(ignored);
        self
    }

    #[must_use]
    pub const fn connection(&self) -> &'c Connection {
        self.conn
    }

    fn dispatch(
        &self,
        subject: Subject,
        links: SubRecordLinks,
        before: Option<&Snapshot>,
        after: &Snapshot,
        ctx: &SaveContext,
    ) -> HookReport {
        self.hooks.on_saved(&SaveEvent {
            subject,
            links,
            before,
            after,
            actor: ctx.actor,
            comment: ctx.comment.as_deref(),
        })
    }

    // ------------------------------------------------------------------
    // Assets
    // ------------------------------------------------------------------

    /// Delete an asset row. Its history stays, with `asset_id` nulled.
    ///
    /// Returns `false` if no such asset existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the delete fails.
    pub fn delete_asset(&self, id: AssetId) -> Result<bool, StorageError> {
        let deleted = self
            .conn
            .execute("DELETE FROM assets WHERE asset_id = ?1", params![id])?;
        if deleted > 0 {
            debug!(asset_id = %id, "deleted asset");
        }
        Ok(deleted > 0)
    }

    /// Every asset, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub fn list_assets(&self) -> Result<Vec<Asset>, StorageError> {
        let sql = format!("{ASSET_COLUMNS} ORDER BY asset_id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], asset_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ------------------------------------------------------------------
    // Sub-records
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`StorageError`] if the lookup fails.
    pub fn load_device_info(&self, id: DeviceInfoId) -> Result<Option<DeviceInfo>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT device_info_id, ralph_device_id, u_level, u_height, rack
                 FROM device_info WHERE device_info_id = ?1",
                params![id],
                |row| {
                    Ok(DeviceInfo {
                        id: row.get(0)?,
                        ralph_device_id: row.get(1)?,
                        u_level: row.get(2)?,
                        u_height: row.get(3)?,
                        rack: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    /// Insert or update device info and record its history.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails or an update targets a
    /// missing row.
    pub fn save_device_info(
        &self,
        info: &mut DeviceInfo,
        ctx: &SaveContext,
    ) -> Result<HookReport, StorageError> {
        let now = now_us();
        let (id, before) = match info.id {
            None => {
                self.conn.execute(
                    "INSERT INTO device_info (
                        ralph_device_id, u_level, u_height, rack, created_at_us, updated_at_us
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![info.ralph_device_id, info.u_level, info.u_height, info.rack, now],
                )?;
                let id = DeviceInfoId(self.conn.last_insert_rowid());
                info.id = Some(id);
                (id, None)
            }
            Some(id) => {
                let before = self
                    .load_device_info(id)?
                    .ok_or(StorageError::Missing {
                        table: "device_info",
                        id: id.get(),
                    })?
                    .snapshot();
                self.conn.execute(
                    "UPDATE device_info SET
                        ralph_device_id = ?2, u_level = ?3, u_height = ?4, rack = ?5,
                        updated_at_us = ?6
                     WHERE device_info_id = ?1",
                    params![id, info.ralph_device_id, info.u_level, info.u_height, info.rack, now],
                )?;
                (id, Some(before))
            }
        };
        Ok(self.dispatch(
            Subject::DeviceInfo(id),
            SubRecordLinks::default(),
            before.as_ref(),
            &info.snapshot(),
            ctx,
        ))
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the lookup fails.
    pub fn load_part_info(&self, id: PartInfoId) -> Result<Option<PartInfo>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT part_info_id, barcode_salvaged, source_device_id, device_id
                 FROM part_info WHERE part_info_id = ?1",
                params![id],
                |row| {
                    Ok(PartInfo {
                        id: row.get(0)?,
                        barcode_salvaged: row.get(1)?,
                        source_device: row.get(2)?,
                        device: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Insert or update part info and record its history.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails or an update targets a
    /// missing row.
    pub fn save_part_info(
        &self,
        info: &mut PartInfo,
        ctx: &SaveContext,
    ) -> Result<HookReport, StorageError> {
        let now = now_us();
        let (id, before) = match info.id {
            None => {
                self.conn.execute(
                    "INSERT INTO part_info (
                        barcode_salvaged, source_device_id, device_id, created_at_us, updated_at_us
                     ) VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![info.barcode_salvaged, info.source_device, info.device, now],
                )?;
                let id = PartInfoId(self.conn.last_insert_rowid());
                info.id = Some(id);
                (id, None)
            }
            Some(id) => {
                let before = self
                    .load_part_info(id)?
                    .ok_or(StorageError::Missing {
                        table: "part_info",
                        id: id.get(),
                    })?
                    .snapshot();
                self.conn.execute(
                    "UPDATE part_info SET
                        barcode_salvaged = ?2, source_device_id = ?3, device_id = ?4,
                        updated_at_us = ?5
                     WHERE part_info_id = ?1",
                    params![id, info.barcode_salvaged, info.source_device, info.device, now],
                )?;
                (id, Some(before))
            }
        };
        Ok(self.dispatch(
            Subject::PartInfo(id),
            SubRecordLinks::default(),
            before.as_ref(),
            &info.snapshot(),
            ctx,
        ))
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the lookup fails or a stored date is
    /// malformed.
    pub fn load_office_info(&self, id: OfficeInfoId) -> Result<Option<OfficeInfo>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT office_info_id, license_key, version, unit_price, license_type,
                        date_of_last_inventory, last_logged_user
                 FROM office_info WHERE office_info_id = ?1",
                params![id],
                |row| {
                    Ok(OfficeInfo {
                        id: row.get(0)?,
                        license_key: row.get(1)?,
                        version: row.get(2)?,
                        unit_price: row.get(3)?,
                        license_type: row.get(4)?,
                        date_of_last_inventory: date_column(row, 5)?,
                        last_logged_user: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    /// Insert or update office info and record its history.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails or an update targets a
    /// missing row.
    pub fn save_office_info(
        &self,
        info: &mut OfficeInfo,
        ctx: &SaveContext,
    ) -> Result<HookReport, StorageError> {
        let now = now_us();
        let inventory_date = info
            .date_of_last_inventory
            .map(|date| date.format(DATE_FORMAT).to_string());
        let (id, before) = match info.id {
            None => {
                self.conn.execute(
                    "INSERT INTO office_info (
                        license_key, version, unit_price, license_type,
                        date_of_last_inventory, last_logged_user, created_at_us, updated_at_us
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![
                        info.license_key,
                        info.version,
                        info.unit_price,
                        info.license_type,
                        inventory_date,
                        info.last_logged_user,
                        now
                    ],
                )?;
                let id = OfficeInfoId(self.conn.last_insert_rowid());
                info.id = Some(id);
                (id, None)
            }
            Some(id) => {
                let before = self
                    .load_office_info(id)?
                    .ok_or(StorageError::Missing {
                        table: "office_info",
                        id: id.get(),
                    })?
                    .snapshot();
                self.conn.execute(
                    "UPDATE office_info SET
                        license_key = ?2, version = ?3, unit_price = ?4, license_type = ?5,
                        date_of_last_inventory = ?6, last_logged_user = ?7, updated_at_us = ?8
                     WHERE office_info_id = ?1",
                    params![
                        id,
                        info.license_key,
                        info.version,
                        info.unit_price,
                        info.license_type,
                        inventory_date,
                        info.last_logged_user,
                        now
                    ],
                )?;
                (id, Some(before))
            }
        };
        Ok(self.dispatch(
            Subject::OfficeInfo(id),
            SubRecordLinks::default(),
            before.as_ref(),
            &info.snapshot(),
            ctx,
        ))
    }
}

impl AssetStore for SqliteAssetStore<'_> {
    fn load_asset(&self, id: AssetId) -> Result<Option<Asset>, StorageError> {
        load_asset(self.conn, id)
    }

    fn save_asset(
        &self,
        asset: &mut Asset,
        ctx: &SaveContext,
    ) -> Result<HookReport, StorageError> {
        let now = now_us();
        let (id, before) = match asset.id {
            None => {
                self.conn.execute(
                    "INSERT INTO assets (
                        kind, status, sn, barcode, model, price, remarks, niw, order_no,
                        invoice_no, owner_id, user_id, warehouse,
                        device_info_id, part_info_id, office_info_id, deleted,
                        created_at_us, updated_at_us
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                               ?14, ?15, ?16, ?17, ?18, ?18)",
                    params![
                        asset.kind,
                        asset.status,
                        asset.sn,
                        asset.barcode,
                        asset.model,
                        asset.price,
                        asset.remarks,
                        asset.niw,
                        asset.order_no,
                        asset.invoice_no,
                        asset.owner_id,
                        asset.user_id,
                        asset.warehouse,
                        asset.device_info,
                        asset.part_info,
                        asset.office_info,
                        asset.deleted,
                        now
                    ],
                )?;
                let id = AssetId(self.conn.last_insert_rowid());
                asset.id = Some(id);
                debug!(asset_id = %id, kind = %asset.kind, "inserted asset");
                (id, None)
            }
            Some(id) => {
                let before = load_asset(self.conn, id)?
                    .ok_or(StorageError::Missing {
                        table: "assets",
                        id: id.get(),
                    })?
                    .snapshot();
                self.conn.execute(
                    "UPDATE assets SET
                        kind = ?2, status = ?3, sn = ?4, barcode = ?5, model = ?6, price = ?7,
                        remarks = ?8, niw = ?9, order_no = ?10, invoice_no = ?11,
                        owner_id = ?12, user_id = ?13, warehouse = ?14,
                        device_info_id = ?15, part_info_id = ?16, office_info_id = ?17,
                        deleted = ?18, updated_at_us = ?19
                     WHERE asset_id = ?1",
                    params![
                        id,
                        asset.kind,
                        asset.status,
                        asset.sn,
                        asset.barcode,
                        asset.model,
                        asset.price,
                        asset.remarks,
                        asset.niw,
                        asset.order_no,
                        asset.invoice_no,
                        asset.owner_id,
                        asset.user_id,
                        asset.warehouse,
                        asset.device_info,
                        asset.part_info,
                        asset.office_info,
                        asset.deleted,
                        now
                    ],
                )?;
                (id, Some(before))
            }
        };
        Ok(self.dispatch(
            Subject::Asset(id),
            asset.links(),
            before.as_ref(),
            &asset.snapshot(),
            ctx,
        ))
    }
}

// ---------------------------------------------------------------------------
// Free-standing readers
// ---------------------------------------------------------------------------

const ASSET_COLUMNS: &str = "SELECT asset_id, kind, status, sn, barcode, model, price, remarks, \
     niw, order_no, invoice_no, owner_id, user_id, warehouse, \
     device_info_id, part_info_id, office_info_id, deleted \
     FROM assets";

/// Load one asset by id.
///
/// # Errors
///
/// Returns [`StorageError`] if the query fails or the row is malformed.
pub fn load_asset(conn: &Connection, id: AssetId) -> Result<Option<Asset>, StorageError> {
    let sql = format!("{ASSET_COLUMNS} WHERE asset_id = ?1");
    Ok(conn
        .query_row(&sql, params![id], asset_from_row)
        .optional()?)
}

/// Current sub-record links of an asset, `None` if the asset does not exist.
///
/// # Errors
///
/// Returns [`StorageError`] if the query fails.
pub fn load_links(conn: &Connection, id: AssetId) -> Result<Option<SubRecordLinks>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT device_info_id, part_info_id, office_info_id FROM assets WHERE asset_id = ?1",
            params![id],
            |row| {
                Ok(SubRecordLinks {
                    device_info: row.get(0)?,
                    part_info: row.get(1)?,
                    office_info: row.get(2)?,
                })
            },
        )
        .optional()?)
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: row.get(0)?,
        kind: row.get(1)?,
        status: row.get(2)?,
        sn: row.get(3)?,
        barcode: row.get(4)?,
        model: row.get(5)?,
        price: row.get(6)?,
        remarks: row.get(7)?,
        niw: row.get(8)?,
        order_no: row.get(9)?,
        invoice_no: row.get(10)?,
        owner_id: row.get(11)?,
        user_id: row.get(12)?,
        warehouse: row.get(13)?,
        device_info: row.get(14)?,
        part_info: row.get(15)?,
        office_info: row.get(16)?,
        deleted: row.get(17)?,
    })
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
        })
    })
    .transpose()
}
