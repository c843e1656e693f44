//! Post-save dispatch into the history subsystem.

use super::ChangeRecord;
use super::NewChange;
use super::detect::{FieldChange, detect};
use super::linker::relink;
use super::store::HistoryStore;
use crate::error::StorageError;
use crate::model::snapshot::Snapshot;
use crate::model::{Subject, SubRecordLinks, UserId};
use rusqlite::Connection;
use std::fmt;
use tracing::error;

/// One successful persistence of a watched entity.
#[derive(Debug, Clone, Copy)]
pub struct SaveEvent<'a> {
    pub subject: Subject,
    /// Current sub-record links; only read for asset subjects.
    pub links: SubRecordLinks,
    /// Persisted state before the save, `None` on creation.
    pub before: Option<&'a Snapshot>,
    pub after: &'a Snapshot,
    pub actor: Option<UserId>,
    pub comment: Option<&'a str>,
}

/// Step of the history write that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStage {
    Relink,
    Record { field: &'static str },
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relink => f.write_str("relink"),
            Self::Record { field } => write!(f, "record field '{field}'"),
        }
    }
}

/// A history write that failed without failing the save.
#[derive(Debug, thiserror::Error)]
#[error("history {stage} failed for {subject}: {source}")]
pub struct HistoryWriteFailure {
    pub subject: Subject,
    pub stage: WriteStage,
    #[source]
    pub source: StorageError,
}

/// Outcome of one dispatch.
#[derive(Debug, Default)]
pub struct HookReport {
    /// Records appended by this save.
    pub changes: Vec<ChangeRecord>,
    /// Sub-record records re-pointed at the saved asset.
    pub relinked: usize,
    pub failures: Vec<HistoryWriteFailure>,
}

impl HookReport {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, subject: Subject, stage: WriteStage, source: StorageError) {
        error!(%subject, %stage, error = %source, "history write failed");
        self.failures.push(HistoryWriteFailure {
            subject,
            stage,
            source,
        });
    }
}

/// Runs detector, linker and store for every save it is told about.
#[derive(Debug, Clone)]
pub struct SaveHookDispatcher<'c> {
    conn: &'c Connection,
    ignored: Vec<String>,
}

impl<'c> SaveHookDispatcher<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            ignored: Vec::new(),
        }
    }

    /// Fields the detector skips for every subject kind.
    #[must_use]
    pub fn with_ignored_fields(mut self, ignored: Vec<String>) -> Self {
        self.ignored = ignored;
        self
    }

    #[must_use]
    pub fn ignored_fields(&self) -> &[String] {
        &self.ignored
    }

    /// Record the history of one save.
    ///
    /// Never fails: storage errors are logged and collected in the report.
    #[must_use]
    pub fn on_saved(&self, event: &SaveEvent<'_>) -> HookReport {
        let changes = detect(event.before, event.after, &self.ignored);
        let mut report = HookReport::default();
        if changes.is_empty() {
            return report;
        }

        let store = HistoryStore::new(self.conn);
        match event.subject {
            Subject::Asset(asset_id) => {
                let receipt = match relink(self.conn, asset_id, event.links) {
                    Ok(receipt) => receipt,
                    Err(source) => {
                        report.fail(event.subject, WriteStage::Relink, source);
                        return report;
                    }
                };
                report.relinked = receipt.relinked();
                for (field, outcome) in
                    store.record_asset_changes(&receipt, &changes, event.actor, event.comment)
                {
                    match outcome {
                        Ok(record) => report.changes.push(record),
                        Err(source) => report.fail(event.subject, WriteStage::Record { field }, source),
                    }
                }
            }
            Subject::DeviceInfo(_) | Subject::PartInfo(_) | Subject::OfficeInfo(_) => {
                for FieldChange { field, old, new } in changes {
                    let entry = NewChange::new(event.subject, field, old, new)
                        .by(event.actor)
                        .with_comment(event.comment.map(str::to_string));
                    match store.record(entry) {
                        Ok(record) => report.changes.push(record),
                        Err(source) => report.fail(event.subject, WriteStage::Record { field }, source),
                    }
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::{SaveEvent, SaveHookDispatcher, WriteStage};
    use crate::db::open_in_memory;
    use crate::history::store::HistoryStore;
    use crate::model::snapshot::Snapshot;
    use crate::model::{AssetId, DeviceInfoId, Subject, SubRecordLinks, UserId};
    use rusqlite::Connection;

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO device_info (device_info_id, created_at_us, updated_at_us) VALUES (1, 0, 0);
             INSERT INTO assets (asset_id, kind, status, device_info_id, created_at_us, updated_at_us)
                 VALUES (10, 'device', 1, 1, 0, 0);",
        )
        .expect("seed rows");
    }

    #[test]
    fn asset_save_relinks_then_records() {
        let conn = open_in_memory().expect("db");
        seed(&conn);
        let dispatcher = SaveHookDispatcher::new(&conn);

        let device_before = Snapshot::new().field("rack", None::<String>);
        let device_after = Snapshot::new().field("rack", "R-01");
        let device_report = dispatcher.on_saved(&SaveEvent {
            subject: Subject::DeviceInfo(DeviceInfoId(1)),
            links: SubRecordLinks::default(),
            before: Some(&device_before),
            after: &device_after,
            actor: None,
            comment: None,
        });
        assert_eq!(device_report.changes.len(), 1);
        assert_eq!(device_report.changes[0].asset_id, None);

        let before = Snapshot::new().field("status", 1_i64);
        let after = Snapshot::new().field("status", 2_i64);
        let report = dispatcher.on_saved(&SaveEvent {
            subject: Subject::Asset(AssetId(10)),
            links: SubRecordLinks {
                device_info: Some(DeviceInfoId(1)),
                ..SubRecordLinks::default()
            },
            before: Some(&before),
            after: &after,
            actor: Some(UserId(7)),
            comment: Some("moved to testing"),
        });
        assert!(report.is_clean());
        assert_eq!(report.relinked, 1);
        assert_eq!(report.changes.len(), 1);
        let status = &report.changes[0];
        assert_eq!((status.old_value.as_str(), status.new_value.as_str()), ("1", "2"));
        assert_eq!(status.actor_user_id, Some(UserId(7)));
        assert_eq!(status.comment.as_deref(), Some("moved to testing"));
    }

    #[test]
    fn unchanged_save_writes_nothing() {
        let conn = open_in_memory().expect("db");
        seed(&conn);
        let snap = Snapshot::new().field("status", 1_i64);
        let report = SaveHookDispatcher::new(&conn).on_saved(&SaveEvent {
            subject: Subject::Asset(AssetId(10)),
            links: SubRecordLinks::default(),
            before: Some(&snap),
            after: &snap,
            actor: None,
            comment: None,
        });
        assert!(report.changes.is_empty());
        assert_eq!(report.relinked, 0);
    }

    #[test]
    fn ignored_fields_leave_no_history() {
        let conn = open_in_memory().expect("db");
        seed(&conn);
        let dispatcher =
            SaveHookDispatcher::new(&conn).with_ignored_fields(vec!["remarks".to_string()]);
        let before = Snapshot::new().field("remarks", "");
        let after = Snapshot::new().field("remarks", "dusty");
        let report = dispatcher.on_saved(&SaveEvent {
            subject: Subject::Asset(AssetId(10)),
            links: SubRecordLinks::default(),
            before: Some(&before),
            after: &after,
            actor: None,
            comment: None,
        });
        assert!(report.changes.is_empty());
        let stored = HistoryStore::new(&conn)
            .records_for_subject(Subject::Asset(AssetId(10)))
            .expect("read");
        assert!(stored.is_empty());
    }

    #[test]
    fn write_failures_are_reported_not_raised() {
        let conn = open_in_memory().expect("db");
        // No device_info row 99 exists, so the foreign key rejects the write.
        let before = Snapshot::new().field("rack", "");
        let after = Snapshot::new().field("rack", "R-02");
        let report = SaveHookDispatcher::new(&conn).on_saved(&SaveEvent {
            subject: Subject::DeviceInfo(DeviceInfoId(99)),
            links: SubRecordLinks::default(),
            before: Some(&before),
            after: &after,
            actor: None,
            comment: None,
        });
        assert!(report.changes.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, WriteStage::Record { field: "rack" });
    }
}
