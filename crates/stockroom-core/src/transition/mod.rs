//! Status-transition workflow.
//!
//! A [`Transition`] moves a batch of assets from one status (or any status)
//! to another and then runs its ordered actions against each asset. Every
//! successful application is logged as a [`TransitionExecution`].

pub mod actions;
pub mod catalog;
pub mod engine;

use crate::db::assets::AssetStore;
use crate::error::{ErrorCode, StorageError};
use crate::model::{ActionId, AssetId, ExecutionId, Status, TransitionId, UserId};
use actions::ActionRegistry;
use chrono::{DateTime, Utc};
use engine::TransitionEngine;
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

pub use catalog::{executions_for_asset, list_transitions_applicable};

/// Maximum length of transition and action names, in characters.
pub const NAME_MAX_LEN: usize = 75;

/// Maximum length of a transition slug, in characters.
pub const SLUG_MAX_LEN: usize = 100;

/// A reusable, named step run after a transition's status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDef {
    pub id: ActionId,
    pub name: String,
}

/// A named, directed status-change rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub id: TransitionId,
    pub name: String,
    pub slug: String,
    /// `None` applies to assets in any status.
    pub from_status: Option<Status>,
    pub to_status: Status,
    /// Run in this order, after every status has been saved.
    pub actions: Vec<ActionDef>,
}

impl Transition {
    #[must_use]
    pub fn can_apply(&self, current: Status) -> bool {
        self.from_status.is_none_or(|from| from == current)
    }
}

/// One firing of a transition over a batch of assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionExecution {
    pub id: ExecutionId,
    pub transition_id: TransitionId,
    pub logged_user_id: UserId,
    pub affected_user_id: UserId,
    pub asset_ids: Vec<AssetId>,
    pub created_at: DateTime<Utc>,
}

/// An asset whose status does not match the transition's from-status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvalidAsset {
    pub asset_id: AssetId,
    pub status: Status,
}

impl fmt::Display for InvalidAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset {} (status {})", self.asset_id, self.status)
    }
}

fn join_invalid(invalid: &[InvalidAsset]) -> String {
    invalid
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_ids(ids: &[AssetId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("transition '{0}' not found")]
    UnknownTransition(String),

    #[error("asset {0} not found")]
    UnknownAsset(AssetId),

    #[error("transition '{transition}' cannot be applied to {}", join_invalid(.invalid))]
    NotApplicable {
        transition: String,
        invalid: Vec<InvalidAsset>,
    },

    #[error(
        "action '{action}' failed on asset {asset}: {reason} (status already saved for: {})",
        join_ids(.saved_assets)
    )]
    ActionFailed {
        action: String,
        asset: AssetId,
        reason: String,
        /// Assets whose new status was persisted before the failure.
        saved_assets: Vec<AssetId>,
    },

    #[error(
        "saving asset {asset} failed: {source} (status already saved for: {})",
        join_ids(.saved_assets)
    )]
    StatusSaveFailed {
        asset: AssetId,
        /// Assets whose new status was persisted before the failure.
        saved_assets: Vec<AssetId>,
        #[source]
        source: StorageError,
    },

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for TransitionError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl TransitionError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownTransition(_) => ErrorCode::TransitionNotFound,
            Self::UnknownAsset(_) => ErrorCode::AssetNotFound,
            Self::NotApplicable { .. } => ErrorCode::TransitionNotApplicable,
            Self::ActionFailed { .. } => ErrorCode::ActionExecutionFailed,
            Self::StatusSaveFailed { source, .. } => source.code(),
            Self::InvalidDefinition(_) => ErrorCode::InvalidDefinition,
            Self::Storage(err) => err.code(),
        }
    }
}

/// URL-safe identifier derived from a transition name.
///
/// Lowercases, keeps alphanumerics, and collapses every other run of
/// characters into a single `-`. Capped at [`SLUG_MAX_LEN`].
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed = slug.trim_end_matches('-');
    crate::history::truncate_chars(trimmed, SLUG_MAX_LEN)
        .trim_end_matches('-')
        .to_string()
}

/// Apply the transition called `name` to `asset_ids`.
///
/// Duplicate ids are applied once. Unknown transitions and assets fail
/// before anything is saved.
///
/// # Errors
///
/// See [`TransitionError`]; [`engine::TransitionEngine::apply`] documents the
/// per-step failures.
pub fn apply_transition<S: AssetStore>(
    conn: &Connection,
    store: &S,
    registry: &ActionRegistry,
    name: &str,
    asset_ids: &[AssetId],
    logged_user: UserId,
    affected_user: UserId,
) -> Result<TransitionExecution, TransitionError> {
    let transition = catalog::get_transition_by_name(conn, name)?
        .ok_or_else(|| TransitionError::UnknownTransition(name.to_string()))?;

    let mut seen = Vec::with_capacity(asset_ids.len());
    let mut assets = Vec::with_capacity(asset_ids.len());
    for &id in asset_ids {
        if seen.contains(&id) {
            continue;
        }
        seen.push(id);
        let asset = store.load_asset(id)?.ok_or(TransitionError::UnknownAsset(id))?;
        assets.push(asset);
    }

    TransitionEngine::new(conn, store, registry).apply(&transition, assets, logged_user, affected_user)
}
