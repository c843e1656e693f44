//! Change-history flows through the public API:
//! - creation and update history on assets and sub-records
//! - relinking sub-record history when a sub-record moves between assets
//! - the paged, status-filtered asset history view
//! - detach-on-delete

use stockroom_core::db::assets::{AssetStore, SaveContext, SqliteAssetStore, load_links};
use stockroom_core::db::{open_db, open_in_memory};
use stockroom_core::history::store::HistoryStore;
use stockroom_core::history::{HistoryError, VALUE_MAX_LEN, get_history_for_asset};
use stockroom_core::model::asset::{Asset, DeviceInfo, OfficeInfo};
use stockroom_core::model::{AssetId, Status, Subject, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_asset(store: &SqliteAssetStore<'_>, sn: &str) -> Asset {
    let mut asset = Asset {
        sn: Some(sn.to_string()),
        model: "PowerEdge R640".to_string(),
        ..Asset::default()
    };
    let report = store
        .save_asset(&mut asset, &SaveContext::by(Some(UserId(1))))
        .expect("save asset");
    assert!(report.is_clean());
    asset
}

fn fields(page: &stockroom_core::history::HistoryPage) -> Vec<&str> {
    page.records.iter().map(|r| r.field_name.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn device_history_written_before_attachment_shows_on_asset() {
    let conn = open_in_memory().expect("db");
    let store = SqliteAssetStore::new(&conn);

    let mut device = DeviceInfo {
        rack: Some("R-01".into()),
        ..DeviceInfo::default()
    };
    store
        .save_device_info(&mut device, &SaveContext::default())
        .expect("device");

    let mut asset = new_asset(&store, "SN-100");
    let id = asset.id.expect("id");
    let before_attach = get_history_for_asset(&conn, id, false, 0, 25).expect("history");
    assert!(!fields(&before_attach).contains(&"rack"));

    asset.device_info = device.id;
    let report = store
        .save_asset(&mut asset, &SaveContext::default())
        .expect("attach");
    assert_eq!(report.relinked, 1);

    let page = get_history_for_asset(&conn, id, false, 0, 25).expect("history");
    let names = fields(&page);
    assert_eq!(names.first(), Some(&"device_info"));
    assert_eq!(names.last(), Some(&"rack"));
    let rack = page.records.last().expect("rack change");
    assert_eq!(rack.subject, Subject::DeviceInfo(device.id.expect("device id")));
    assert_eq!(rack.asset_id, Some(id));
}

#[test]
fn sub_record_moved_to_another_asset_follows_it() {
    let conn = open_in_memory().expect("db");
    let store = SqliteAssetStore::new(&conn);

    let mut office = OfficeInfo {
        license_key: Some("AAAA-BBBB".into()),
        ..OfficeInfo::default()
    };
    store
        .save_office_info(&mut office, &SaveContext::default())
        .expect("office");

    let mut first = new_asset(&store, "SN-1");
    first.office_info = office.id;
    store
        .save_asset(&mut first, &SaveContext::default())
        .expect("attach to first");

    first.office_info = None;
    store
        .save_asset(&mut first, &SaveContext::default())
        .expect("detach from first");

    let mut second = new_asset(&store, "SN-2");
    second.office_info = office.id;
    store
        .save_asset(&mut second, &SaveContext::default())
        .expect("attach to second");

    let license = HistoryStore::new(&conn)
        .records_for_subject(Subject::OfficeInfo(office.id.expect("office id")))
        .expect("history");
    assert_eq!(license.len(), 1);
    assert_eq!(license[0].asset_id, second.id);

    let first_page =
        get_history_for_asset(&conn, first.id.expect("id"), false, 0, 25).expect("history");
    assert!(!fields(&first_page).contains(&"license_key"));
}

#[test]
fn status_only_history_is_paged_newest_first() {
    let conn = open_in_memory().expect("db");
    let store = SqliteAssetStore::new(&conn);
    let mut asset = new_asset(&store, "SN-PAGE");
    let id = asset.id.expect("id");

    for code in 2..=6 {
        asset.status = Status(code);
        asset.remarks = format!("step {code}");
        store
            .save_asset(&mut asset, &SaveContext::default())
            .expect("update");
    }

    // Creation status plus five updates.
    let all_status = get_history_for_asset(&conn, id, true, 0, 2).expect("history");
    assert_eq!(all_status.total, 6);
    assert_eq!(all_status.records.len(), 6);
    assert_eq!(all_status.page, None);

    let first = get_history_for_asset(&conn, id, true, 1, 2).expect("page 1");
    let news: Vec<_> = first.records.iter().map(|r| r.new_value.as_str()).collect();
    assert_eq!(news, ["6", "5"]);
    assert_eq!(first.num_pages, 3);

    let past_end = get_history_for_asset(&conn, id, true, 4, 2).expect("page 4");
    assert!(past_end.records.is_empty());
    assert_eq!(past_end.total, 6);
}

#[test]
fn unknown_asset_history_is_an_error() {
    let conn = open_in_memory().expect("db");
    let err = get_history_for_asset(&conn, AssetId(12), false, 0, 25).expect_err("unknown");
    assert!(matches!(err, HistoryError::AssetNotFound(AssetId(12))));
}

#[test]
fn overlong_values_are_truncated() {
    let conn = open_in_memory().expect("db");
    let store = SqliteAssetStore::new(&conn);
    let mut asset = new_asset(&store, "SN-LONG");
    asset.remarks = "r".repeat(400);
    store
        .save_asset(&mut asset, &SaveContext::default())
        .expect("update");

    let page = get_history_for_asset(&conn, asset.id.expect("id"), false, 0, 25).expect("history");
    let remarks = page
        .records
        .iter()
        .find(|r| r.field_name == "remarks")
        .expect("remarks change");
    assert_eq!(remarks.new_value.chars().count(), VALUE_MAX_LEN);

    // The asset itself keeps the full value.
    let loaded = store
        .load_asset(asset.id.expect("id"))
        .expect("load")
        .expect("exists");
    assert_eq!(loaded.remarks.len(), 400);
}

#[test]
fn deleted_asset_history_survives_detached() {
    let dir = tempfile::tempdir().expect("temp dir");
    let conn = open_db(&dir.path().join("stockroom.sqlite3")).expect("db");
    let store = SqliteAssetStore::new(&conn);
    let asset = new_asset(&store, "SN-GONE");
    let id = asset.id.expect("id");

    assert!(store.delete_asset(id).expect("delete"));
    assert_eq!(load_links(&conn, id).expect("links"), None);

    let kept = HistoryStore::new(&conn)
        .records_for_subject(Subject::Asset(id))
        .expect("history");
    assert_eq!(kept.len(), 4);
    assert!(kept.iter().all(|r| r.asset_id.is_none()));
}

#[test]
fn ignored_fields_from_config_are_not_recorded() {
    let conn = open_in_memory().expect("db");
    let store = SqliteAssetStore::new(&conn).with_ignored_fields(vec!["remarks".into()]);
    let mut asset = new_asset(&store, "SN-QUIET");
    asset.remarks = "noisy".into();
    asset.status = Status::IN_PROGRESS;
    let report = store
        .save_asset(&mut asset, &SaveContext::default())
        .expect("update");
    let changed: Vec<_> = report.changes.iter().map(|c| c.field_name.as_str()).collect();
    assert_eq!(changed, ["status"]);
}
