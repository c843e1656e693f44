//! Applying a transition to a batch of assets.

use super::actions::{ActionContext, ActionRegistry};
use super::{InvalidAsset, Transition, TransitionError, TransitionExecution, catalog};
use crate::db::assets::{AssetStore, SaveContext};
use crate::model::asset::Asset;
use crate::model::{AssetId, UserId};
use rusqlite::Connection;
use tracing::{info, warn};

/// Applies transitions through an [`AssetStore`] so every status change and
/// action edit goes through the save hooks.
pub struct TransitionEngine<'a, S: AssetStore> {
    conn: &'a Connection,
    store: &'a S,
    registry: &'a ActionRegistry,
}

impl<'a, S: AssetStore> TransitionEngine<'a, S> {
    #[must_use]
    pub const fn new(conn: &'a Connection, store: &'a S, registry: &'a ActionRegistry) -> Self {
        Self {
            conn,
            store,
            registry,
        }
    }

    /// Move `assets` to the transition's target status, run its actions, and
    /// log the execution.
    ///
    /// Steps, in order:
    /// 1. reject the whole batch if it is empty, holds an unsaved asset, or
    ///    any asset fails [`Transition::can_apply`];
    /// 2. save every asset with the new status;
    /// 3. run each action over every asset, saving assets the action changed;
    /// 4. write one execution record for the batch.
    ///
    /// A failing action or save stops the run. Statuses saved in step 2 stay
    /// saved and no execution record is written; the error lists those assets.
    ///
    /// # Errors
    ///
    /// [`TransitionError::InvalidDefinition`] for an empty or unsaved batch,
    /// [`TransitionError::NotApplicable`], [`TransitionError::ActionFailed`],
    /// [`TransitionError::StatusSaveFailed`] if an asset save fails, or
    /// [`TransitionError::Storage`] if the execution write fails.
    pub fn apply(
        &self,
        transition: &Transition,
        mut assets: Vec<Asset>,
        logged_user: UserId,
        affected_user: UserId,
    ) -> Result<TransitionExecution, TransitionError> {
        if assets.is_empty() {
            return Err(TransitionError::InvalidDefinition(format!(
                "transition '{}' needs at least one asset",
                transition.name
            )));
        }
        let ids: Vec<AssetId> = assets
            .iter()
            .map(|asset| asset.id)
            .collect::<Option<_>>()
            .ok_or_else(|| {
                TransitionError::InvalidDefinition(format!(
                    "transition '{}' can only move saved assets",
                    transition.name
                ))
            })?;

        let invalid: Vec<InvalidAsset> = assets
            .iter()
            .zip(&ids)
            .filter(|(asset, _)| !transition.can_apply(asset.status))
            .map(|(asset, &asset_id)| InvalidAsset {
                asset_id,
                status: asset.status,
            })
            .collect();
        if !invalid.is_empty() {
            warn!(
                transition = %transition.name,
                rejected = invalid.len(),
                batch = assets.len(),
                "transition rejected"
            );
            return Err(TransitionError::NotApplicable {
                transition: transition.name.clone(),
                invalid,
            });
        }

        let ctx = SaveContext::by(Some(logged_user))
            .with_comment(format!("transition: {}", transition.name));

        let mut saved = Vec::with_capacity(assets.len());
        for (asset, &asset_id) in assets.iter_mut().zip(&ids) {
            asset.status = transition.to_status;
            self.save(transition, asset, asset_id, &ctx, &saved)?;
            saved.push(asset_id);
        }

        for action in &transition.actions {
            for (asset, &asset_id) in assets.iter_mut().zip(&ids) {
                let before = asset.clone();
                let mut action_ctx = ActionContext {
                    asset: &mut *asset,
                    transition,
                    logged_user,
                    affected_user,
                };
                if let Err(err) = self.registry.run(&action.name, &mut action_ctx) {
                    warn!(
                        transition = %transition.name,
                        action = %action.name,
                        %asset_id,
                        error = %err,
                        "transition action failed"
                    );
                    return Err(TransitionError::ActionFailed {
                        action: action.name.clone(),
                        asset: asset_id,
                        reason: err.to_string(),
                        saved_assets: saved,
                    });
                }
                if *asset != before {
                    self.save(transition, asset, asset_id, &ctx, &saved)?;
                }
            }
        }

        let execution = catalog::record_execution(
            self.conn,
            transition.id,
            logged_user,
            affected_user,
            &saved,
        )?;
        info!(
            transition = %transition.name,
            execution_id = %execution.id,
            assets = execution.asset_ids.len(),
            "transition applied"
        );
        Ok(execution)
    }

    fn save(
        &self,
        transition: &Transition,
        asset: &mut Asset,
        asset_id: AssetId,
        ctx: &SaveContext,
        saved: &[AssetId],
    ) -> Result<(), TransitionError> {
        match self.store.save_asset(asset, ctx) {
            Ok(report) => {
                if !report.is_clean() {
                    warn!(%asset_id, failures = report.failures.len(), "status history incomplete");
                }
                Ok(())
            }
            Err(source) => {
                warn!(
                    transition = %transition.name,
                    %asset_id,
                    error = %source,
                    "transition save failed"
                );
                Err(TransitionError::StatusSaveFailed {
                    asset: asset_id,
                    saved_assets: saved.to_vec(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TransitionEngine;
    use crate::db::assets::{AssetStore, SaveContext, SqliteAssetStore};
    use crate::db::open_in_memory;
    use crate::error::StorageError;
    use crate::history::hooks::HookReport;
    use crate::history::store::HistoryStore;
    use crate::model::asset::Asset;
    use crate::model::{AssetId, ExecutionId, Status, Subject, UserId};
    use crate::transition::actions::{ActionError, ActionRegistry};
    use crate::transition::catalog::{
        NewTransition, create_transition, executions_for_asset, get_execution,
    };
    use crate::transition::TransitionError;
    use rusqlite::Connection;
    use std::cell::Cell;

    /// Lets the first `allowed` saves through, then reports the row missing.
    struct FlakyStore<'c> {
        inner: SqliteAssetStore<'c>,
        allowed: Cell<usize>,
    }

    impl AssetStore for FlakyStore<'_> {
        fn load_asset(&self, id: AssetId) -> Result<Option<Asset>, StorageError> {
            self.inner.load_asset(id)
        }

        fn save_asset(
            &self,
            asset: &mut Asset,
            ctx: &SaveContext,
        ) -> Result<HookReport, StorageError> {
            let left = self.allowed.get();
            if left == 0 {
                return Err(StorageError::Missing {
                    table: "assets",
                    id: asset.id.map_or(0, |id| id.0),
                });
            }
            self.allowed.set(left - 1);
            self.inner.save_asset(asset, ctx)
        }
    }

    fn asset_in(store: &SqliteAssetStore<'_>, status: Status) -> Asset {
        let mut asset = Asset {
            status,
            ..Asset::default()
        };
        store
            .save_asset(&mut asset, &SaveContext::default())
            .expect("save asset");
        asset
    }

    fn release(conn: &Connection, actions: &[&str]) -> crate::transition::Transition {
        create_transition(
            conn,
            &NewTransition {
                name: "Release".into(),
                from_status: Some(Status::WAITING_FOR_RELEASE),
                to_status: Status::USED,
                actions: actions.iter().map(ToString::to_string).collect(),
            },
        )
        .expect("create transition")
    }

    #[test]
    fn apply_saves_status_runs_actions_and_logs_execution() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let registry = ActionRegistry::with_builtins();
        let transition = release(&conn, &["assign_user"]);
        let asset = asset_in(&store, Status::WAITING_FOR_RELEASE);
        let id = asset.id.expect("id");

        let execution = TransitionEngine::new(&conn, &store, &registry)
            .apply(&transition, vec![asset], UserId(1), UserId(42))
            .expect("apply");
        assert_eq!(execution.asset_ids, [id]);
        assert_eq!(execution.affected_user_id, UserId(42));

        let saved = store.load_asset(id).expect("load").expect("exists");
        assert_eq!(saved.status, Status::USED);
        assert_eq!(saved.user_id, Some(UserId(42)));

        let history = HistoryStore::new(&conn)
            .records_for_subject(Subject::Asset(id))
            .expect("history");
        let status = history
            .iter()
            .rfind(|record| record.field_name == "status")
            .expect("status change");
        assert_eq!((status.old_value.as_str(), status.new_value.as_str()), ("3", "4"));
        assert_eq!(status.actor_user_id, Some(UserId(1)));
        assert_eq!(status.comment.as_deref(), Some("transition: Release"));
        assert!(history.iter().any(|r| r.field_name == "user" && r.new_value == "42"));
    }

    #[test]
    fn one_mismatch_rejects_the_batch() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let registry = ActionRegistry::with_builtins();
        let transition = release(&conn, &[]);
        let ready = asset_in(&store, Status::WAITING_FOR_RELEASE);
        let fresh = asset_in(&store, Status::NEW);
        let (ready_id, fresh_id) = (ready.id.expect("id"), fresh.id.expect("id"));

        let err = TransitionEngine::new(&conn, &store, &registry)
            .apply(&transition, vec![ready, fresh], UserId(1), UserId(1))
            .expect_err("mismatch");
        let TransitionError::NotApplicable { invalid, .. } = err else {
            panic!("expected NotApplicable");
        };
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].asset_id, fresh_id);
        assert_eq!(invalid[0].status, Status::NEW);

        let untouched = store.load_asset(ready_id).expect("load").expect("exists");
        assert_eq!(untouched.status, Status::WAITING_FOR_RELEASE);
        assert!(executions_for_asset(&conn, ready_id).expect("executions").is_empty());
    }

    #[test]
    fn failing_action_keeps_statuses_and_skips_execution() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let mut registry = ActionRegistry::with_builtins();
        registry.register_fn("print_receipt", |_ctx| {
            Err(ActionError::Failed("printer offline".into()))
        });
        let transition = release(&conn, &["print_receipt"]);
        let first = asset_in(&store, Status::WAITING_FOR_RELEASE);
        let second = asset_in(&store, Status::WAITING_FOR_RELEASE);
        let ids = [first.id.expect("id"), second.id.expect("id")];

        let err = TransitionEngine::new(&conn, &store, &registry)
            .apply(&transition, vec![first, second], UserId(1), UserId(1))
            .expect_err("action fails");
        let TransitionError::ActionFailed {
            action,
            asset,
            reason,
            saved_assets,
        } = err
        else {
            panic!("expected ActionFailed");
        };
        assert_eq!(action, "print_receipt");
        assert_eq!(asset, ids[0]);
        assert_eq!(reason, "printer offline");
        assert_eq!(saved_assets, ids);

        for id in ids {
            let asset = store.load_asset(id).expect("load").expect("exists");
            assert_eq!(asset.status, Status::USED);
            assert!(executions_for_asset(&conn, id).expect("executions").is_empty());
        }
    }

    #[test]
    fn unregistered_action_fails_at_execution() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let registry = ActionRegistry::new();
        let transition = release(&conn, &["assign_user"]);
        let asset = asset_in(&store, Status::WAITING_FOR_RELEASE);

        let err = TransitionEngine::new(&conn, &store, &registry)
            .apply(&transition, vec![asset], UserId(1), UserId(1))
            .expect_err("no handler");
        assert!(matches!(err, TransitionError::ActionFailed { .. }));
    }

    #[test]
    fn failed_status_save_names_assets_already_moved() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let registry = ActionRegistry::with_builtins();
        let transition = release(&conn, &[]);
        let first = asset_in(&store, Status::WAITING_FOR_RELEASE);
        let second = asset_in(&store, Status::WAITING_FOR_RELEASE);
        let ids = [first.id.expect("id"), second.id.expect("id")];

        let flaky = FlakyStore {
            inner: SqliteAssetStore::new(&conn),
            allowed: Cell::new(1),
        };
        let err = TransitionEngine::new(&conn, &flaky, &registry)
            .apply(&transition, vec![first, second], UserId(1), UserId(1))
            .expect_err("second save fails");
        let TransitionError::StatusSaveFailed {
            asset,
            saved_assets,
            source,
        } = err
        else {
            panic!("expected StatusSaveFailed");
        };
        assert_eq!(asset, ids[1]);
        assert_eq!(saved_assets, [ids[0]]);
        assert!(matches!(source, StorageError::Missing { table: "assets", .. }));

        let moved = store.load_asset(ids[0]).expect("load").expect("exists");
        assert_eq!(moved.status, Status::USED);
        let kept = store.load_asset(ids[1]).expect("load").expect("exists");
        assert_eq!(kept.status, Status::WAITING_FOR_RELEASE);
        assert!(executions_for_asset(&conn, ids[0]).expect("executions").is_empty());
    }

    #[test]
    fn failed_save_after_an_action_lists_every_moved_asset() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let registry = ActionRegistry::with_builtins();
        let transition = release(&conn, &["assign_user"]);
        let asset = asset_in(&store, Status::WAITING_FOR_RELEASE);
        let id = asset.id.expect("id");

        let flaky = FlakyStore {
            inner: SqliteAssetStore::new(&conn),
            allowed: Cell::new(1),
        };
        let err = TransitionEngine::new(&conn, &flaky, &registry)
            .apply(&transition, vec![asset], UserId(1), UserId(9))
            .expect_err("action save fails");
        let TransitionError::StatusSaveFailed {
            asset, saved_assets, ..
        } = err
        else {
            panic!("expected StatusSaveFailed");
        };
        assert_eq!(asset, id);
        assert_eq!(saved_assets, [id]);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let registry = ActionRegistry::with_builtins();
        let transition = release(&conn, &[]);

        let err = TransitionEngine::new(&conn, &store, &registry)
            .apply(&transition, Vec::new(), UserId(1), UserId(1))
            .expect_err("empty batch");
        assert!(matches!(err, TransitionError::InvalidDefinition(_)));
        assert!(get_execution(&conn, ExecutionId(1)).expect("lookup").is_none());
    }

    #[test]
    fn unsaved_asset_is_rejected_without_inserting() {
        let conn = open_in_memory().expect("db");
        let store = SqliteAssetStore::new(&conn);
        let registry = ActionRegistry::with_builtins();
        let transition = release(&conn, &[]);
        let unsaved = Asset {
            status: Status::WAITING_FOR_RELEASE,
            ..Asset::default()
        };

        let err = TransitionEngine::new(&conn, &store, &registry)
            .apply(&transition, vec![unsaved], UserId(1), UserId(1))
            .expect_err("unsaved asset");
        assert!(matches!(err, TransitionError::InvalidDefinition(_)));
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
    }
}
