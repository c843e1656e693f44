pub mod action;
pub mod asset;
pub mod completions;
pub mod history;
pub mod init;
pub mod transition;

use anyhow::{Context as _, Result};
use rusqlite::Connection;
use std::path::Path;
use stockroom_core::config::{self, EffectiveConfig};
use stockroom_core::db::assets::SqliteAssetStore;
use stockroom_core::db::open_db;
use stockroom_core::error::{ErrorCode, StorageError};
use stockroom_core::history::HistoryError;
use stockroom_core::model::Status;
use stockroom_core::transition::TransitionError;

/// Failure carrying an explicit code, for errors raised by the CLI itself.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Status from a CLI code; codes start at 1.
pub fn status_arg(code: u16) -> Result<Status> {
    if code == 0 {
        return Err(CodedError::new(ErrorCode::InvalidStatus, "status code 0 is not valid").into());
    }
    Ok(Status(code))
}

/// Stable code for an error chain; the first typed error found wins.
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(coded) = cause.downcast_ref::<CodedError>() {
            return coded.code;
        }
        if let Some(err) = cause.downcast_ref::<TransitionError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<HistoryError>() {
            return match err {
                HistoryError::AssetNotFound(_) => ErrorCode::AssetNotFound,
                HistoryError::Storage(storage) => storage.code(),
            };
        }
        if let Some(err) = cause.downcast_ref::<StorageError>() {
            return err.code();
        }
        if cause.downcast_ref::<rusqlite::Error>().is_some() {
            return ErrorCode::StorageFailure;
        }
    }
    ErrorCode::InternalUnexpected
}

/// An opened project: its resolved config and migrated database.
pub struct Project {
    pub config: EffectiveConfig,
    pub conn: Connection,
}

impl Project {
    /// Locate the project above `cwd` and open its database.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::NotInitialized`] when no `.stockroom/` is found,
    /// [`ErrorCode::ConfigParseError`] for a malformed config, or a storage
    /// error if the database cannot be opened.
    pub fn open(cwd: &Path, cli_format: Option<&str>) -> Result<Self> {
        let root = config::find_project_root(cwd).ok_or_else(|| {
            CodedError::new(
                ErrorCode::NotInitialized,
                format!("no {} directory found above {}", config::STOCKROOM_DIR, cwd.display()),
            )
        })?;
        let config = config::resolve_config(&root, cli_format).map_err(|err| {
            CodedError::new(ErrorCode::ConfigParseError, format!("{err:#}"))
        })?;
        let db_path = config::database_path(&root, &config.project);
        let conn = open_db(&db_path)
            .with_context(|| format!("open database {}", db_path.display()))?;
        Ok(Self { config, conn })
    }

    /// Asset store honouring the configured ignored fields.
    pub fn store(&self) -> SqliteAssetStore<'_> {
        SqliteAssetStore::new(&self.conn)
            .with_ignored_fields(self.config.project.history.ignored_fields.clone())
    }
}
