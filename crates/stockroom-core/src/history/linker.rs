//! Re-attribution of sub-record history to the asset that owns it.
//!
//! A device, part or office record can accumulate history before it is
//! attached to an asset, or while attached to a different one. Each time an
//! asset is saved, every record written against its current sub-records is
//! re-pointed at it. Last save wins.

use crate::error::StorageError;
use crate::model::{AssetId, SubRecordLinks};
use rusqlite::{Connection, params};
use tracing::debug;

/// Proof that [`relink`] ran for an asset's current links.
///
/// [`super::store::HistoryStore::record_asset_changes`] requires one, which
/// keeps the asset's own changes ordered after the relink of the same save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relinked {
    asset_id: AssetId,
    relinked: usize,
}

impl Relinked {
    #[must_use]
    pub const fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    /// Records whose `asset_id` actually changed.
    #[must_use]
    pub const fn relinked(&self) -> usize {
        self.relinked
    }
}

/// Set `asset_id` on every history record written against one of `links`.
///
/// Absent links are skipped. Running it twice with the same arguments leaves
/// the store unchanged and reports zero moved records the second time.
///
/// # Errors
///
/// Returns [`StorageError`] if an update statement fails.
pub fn relink(
    conn: &Connection,
    asset_id: AssetId,
    links: SubRecordLinks,
) -> Result<Relinked, StorageError> {
    let mut relinked = 0;

    if let Some(id) = links.device_info {
        relinked += conn.execute(
            "UPDATE asset_history_changes SET asset_id = ?1
             WHERE device_info_id = ?2 AND asset_id IS NOT ?1",
            params![asset_id, id],
        )?;
    }
    if let Some(id) = links.part_info {
        relinked += conn.execute(
            "UPDATE asset_history_changes SET asset_id = ?1
             WHERE part_info_id = ?2 AND asset_id IS NOT ?1",
            params![asset_id, id],
        )?;
    }
    if let Some(id) = links.office_info {
        relinked += conn.execute(
            "UPDATE asset_history_changes SET asset_id = ?1
             WHERE office_info_id = ?2 AND asset_id IS NOT ?1",
            params![asset_id, id],
        )?;
    }

    if relinked > 0 {
        debug!(%asset_id, relinked, "relinked sub-record history");
    }

    Ok(Relinked { asset_id, relinked })
}

#[cfg(test)]
mod tests {
    use super::relink;
    use crate::db::open_in_memory;
    use crate::history::NewChange;
    use crate::history::store::HistoryStore;
    use crate::model::{AssetId, DeviceInfoId, Subject, SubRecordLinks};
    use proptest::prelude::*;
    use rusqlite::{Connection, params};

    fn seed(conn: &Connection) -> (AssetId, AssetId, DeviceInfoId) {
        conn.execute_batch(
            "INSERT INTO device_info (device_info_id, created_at_us, updated_at_us) VALUES (1, 0, 0);
             INSERT INTO assets (asset_id, kind, status, created_at_us, updated_at_us)
                 VALUES (10, 'device', 1, 0, 0), (11, 'device', 1, 0, 0);",
        )
        .expect("seed rows");
        (AssetId(10), AssetId(11), DeviceInfoId(1))
    }

    fn owner_of_device_rows(conn: &Connection, device: DeviceInfoId) -> Vec<Option<i64>> {
        let mut stmt = conn
            .prepare("SELECT asset_id FROM asset_history_changes WHERE device_info_id = ?1")
            .expect("prepare");
        stmt.query_map(params![device], |row| row.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows")
    }

    #[test]
    fn relink_points_device_history_at_asset() {
        let conn = open_in_memory().expect("db");
        let (asset, _, device) = seed(&conn);
        let store = HistoryStore::new(&conn);
        store
            .record(NewChange::new(Subject::DeviceInfo(device), "rack", "", "R1"))
            .expect("record");

        let links = SubRecordLinks {
            device_info: Some(device),
            ..SubRecordLinks::default()
        };
        let receipt = relink(&conn, asset, links).expect("relink");
        assert_eq!(receipt.relinked(), 1);
        assert_eq!(receipt.asset_id(), asset);
        assert_eq!(owner_of_device_rows(&conn, device), [Some(asset.get())]);
    }

    #[test]
    fn last_relink_wins() {
        let conn = open_in_memory().expect("db");
        let (first, second, device) = seed(&conn);
        HistoryStore::new(&conn)
            .record(NewChange::new(Subject::DeviceInfo(device), "rack", "", "R1"))
            .expect("record");
        let links = SubRecordLinks {
            device_info: Some(device),
            ..SubRecordLinks::default()
        };

        relink(&conn, first, links).expect("first relink");
        relink(&conn, second, links).expect("second relink");
        assert_eq!(owner_of_device_rows(&conn, device), [Some(second.get())]);
    }

    #[test]
    fn empty_links_touch_nothing() {
        let conn = open_in_memory().expect("db");
        let (asset, _, _) = seed(&conn);
        let receipt = relink(&conn, asset, SubRecordLinks::default()).expect("relink");
        assert_eq!(receipt.relinked(), 0);
    }

    proptest! {
        #[test]
        fn relink_is_idempotent(records in 0_usize..8) {
            let conn = open_in_memory().expect("db");
            let (asset, _, device) = seed(&conn);
            let store = HistoryStore::new(&conn);
            for n in 0..records {
                store
                    .record(NewChange::new(Subject::DeviceInfo(device), "rack", "", n.to_string()))
                    .expect("record");
            }
            let links = SubRecordLinks { device_info: Some(device), ..SubRecordLinks::default() };

            let first = relink(&conn, asset, links).expect("first");
            let after_first = owner_of_device_rows(&conn, device);
            let second = relink(&conn, asset, links).expect("second");

            prop_assert_eq!(first.relinked(), records);
            prop_assert_eq!(second.relinked(), 0);
            prop_assert_eq!(owner_of_device_rows(&conn, device), after_first);
        }
    }
}
