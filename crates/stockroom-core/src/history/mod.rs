//! Asset change-history audit trail.
//!
//! Every save of an asset or one of its sub-records is observed by the
//! [`hooks::SaveHookDispatcher`], diffed by [`detect::detect`], and appended to
//! `asset_history_changes` by the [`store::HistoryStore`]. History written
//! against a sub-record before it was attached to an asset is pulled under
//! that asset by [`linker::relink`].

pub mod detect;
pub mod hooks;
pub mod linker;
pub mod store;

use crate::db::assets;
use crate::error::StorageError;
use crate::model::{AssetId, Subject, UserId};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

/// Maximum stored length of `field_name`, in characters.
pub const FIELD_NAME_MAX_LEN: usize = 64;

/// Maximum stored length of `old_value`/`new_value`, in characters.
/// Longer values are truncated, never rejected.
pub const VALUE_MAX_LEN: usize = 255;

/// One immutable audit entry for a single field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Entity the change was written against.
    pub subject: Subject,
    /// Asset the record currently belongs to. Set at write time for asset
    /// subjects, later by the linker for sub-record subjects.
    pub asset_id: Option<AssetId>,
    pub actor_user_id: Option<UserId>,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    pub comment: Option<String>,
}

/// A change about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub subject: Subject,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    pub actor_user_id: Option<UserId>,
    pub comment: Option<String>,
    /// Write time override; `None` means now.
    pub at: Option<DateTime<Utc>>,
}

impl NewChange {
    #[must_use]
    pub fn new(
        subject: Subject,
        field_name: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            subject,
            field_name: field_name.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
            actor_user_id: None,
            comment: None,
            at: None,
        }
    }

    #[must_use]
    pub const fn by(mut self, actor: Option<UserId>) -> Self {
        self.actor_user_id = actor;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    #[must_use]
    pub const fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

/// Paging mode for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// Every matching record.
    All,
    /// One 1-based page of `size` records.
    Page { number: u32, size: u32 },
}

impl Paging {
    /// Interpret the history view's `(page, page_size)` pair: page `0` means unpaged.
    #[must_use]
    pub fn from_request(page: u32, page_size: u32) -> Self {
        if page == 0 {
            Self::All
        } else {
            Self::Page {
                number: page,
                size: page_size.max(1),
            }
        }
    }
}

/// Filter and paging for [`store::HistoryStore::query_for_asset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Only records whose `field_name` is `status`.
    pub status_only: bool,
    pub paging: Paging,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            status_only: false,
            paging: Paging::All,
        }
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub records: Vec<ChangeRecord>,
    /// Matching records across all pages.
    pub total: u64,
    /// Requested page, `None` when unpaged.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub num_pages: u32,
}

/// Errors from the asset history view.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("asset {0} not found")]
    AssetNotFound(AssetId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// History of one asset as shown on its detail page.
///
/// Includes records written against the sub-records the asset links to now,
/// whether or not the linker has re-pointed them yet. `page == 0` returns
/// every record and ignores `page_size`.
///
/// # Errors
///
/// Returns [`HistoryError::AssetNotFound`] for an unknown asset, or
/// [`HistoryError::Storage`] if the database query fails.
pub fn get_history_for_asset(
    conn: &Connection,
    asset_id: AssetId,
    status_only: bool,
    page: u32,
    page_size: u32,
) -> Result<HistoryPage, HistoryError> {
    let links = assets::load_links(conn, asset_id)?.ok_or(HistoryError::AssetNotFound(asset_id))?;
    let query = HistoryQuery {
        status_only,
        paging: Paging::from_request(page, page_size),
    };
    Ok(store::HistoryStore::new(conn).query_for_asset(asset_id, links, query)?)
}

/// Cut `value` to at most `max` characters.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Paging, truncate_chars};

    #[test]
    fn page_zero_is_unpaged() {
        assert_eq!(Paging::from_request(0, 25), Paging::All);
        assert_eq!(Paging::from_request(0, 0), Paging::All);
        assert_eq!(
            Paging::from_request(2, 25),
            Paging::Page {
                number: 2,
                size: 25
            }
        );
        assert_eq!(
            Paging::from_request(1, 0),
            Paging::Page { number: 1, size: 1 }
        );
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("żółwie", 3), "żół");
    }
}
