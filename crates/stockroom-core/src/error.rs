use std::fmt;

/// Machine-readable error codes surfaced by the CLI and other front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    MissingActor,
    AssetNotFound,
    TransitionNotFound,
    TransitionNotApplicable,
    ActionExecutionFailed,
    ConstraintViolation,
    InvalidStatus,
    InvalidDefinition,
    StorageFailure,
    CorruptHistoryRow,
    HistoryWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::MissingActor => "E1003",
            Self::AssetNotFound => "E2001",
            Self::TransitionNotFound => "E2002",
            Self::TransitionNotApplicable => "E2003",
            Self::ActionExecutionFailed => "E2004",
            Self::ConstraintViolation => "E2005",
            Self::InvalidStatus => "E2006",
            Self::InvalidDefinition => "E2007",
            Self::StorageFailure => "E3001",
            Self::CorruptHistoryRow => "E3002",
            Self::HistoryWriteFailed => "E3003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::MissingActor => "Acting user required",
            Self::AssetNotFound => "Asset not found",
            Self::TransitionNotFound => "Transition not found",
            Self::TransitionNotApplicable => "Transition not applicable to asset status",
            Self::ActionExecutionFailed => "Transition action failed",
            Self::ConstraintViolation => "Uniqueness or reference constraint violated",
            Self::InvalidStatus => "Invalid status code",
            Self::InvalidDefinition => "Invalid transition or action definition",
            Self::StorageFailure => "Database read/write failed",
            Self::CorruptHistoryRow => "Corrupt history row",
            Self::HistoryWriteFailed => "History entry could not be written",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `sr init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .stockroom/config.toml and retry."),
            Self::MissingActor => Some("Pass the acting user with `--user <id>`."),
            Self::AssetNotFound => Some("Check the asset id with `sr asset show`."),
            Self::TransitionNotFound => Some("List known transitions with `sr transition list`."),
            Self::TransitionNotApplicable => {
                Some("Only apply a transition to assets in its from-status.")
            }
            Self::ActionExecutionFailed => Some(
                "Asset statuses were already saved; review them before retrying the transition.",
            ),
            Self::ConstraintViolation => Some("Names must be unique and referenced rows must exist."),
            Self::InvalidStatus => Some("Status codes are positive integers."),
            Self::InvalidDefinition => {
                Some("Names must be non-empty, at most 75 characters, and list each action once.")
            }
            Self::StorageFailure => Some("Check disk space and write permissions."),
            Self::CorruptHistoryRow => None,
            Self::HistoryWriteFailed => {
                Some("The asset was saved, but its audit entry is missing; check the logs.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of the durable store underneath history, assets, or transitions.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// SQLite rejected a statement or the connection failed.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row could not be mapped back to its domain type.
    #[error("corrupt {table} row {id}: {reason}")]
    Corrupt {
        table: &'static str,
        id: i64,
        reason: String,
    },

    /// An update targeted a row that does not exist.
    #[error("no {table} row {id}")]
    Missing { table: &'static str, id: i64 },
}

impl StorageError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if matches!(err.code, rusqlite::ErrorCode::ConstraintViolation) =>
            {
                ErrorCode::ConstraintViolation
            }
            Self::Sqlite(_) => ErrorCode::StorageFailure,
            Self::Corrupt { .. } => ErrorCode::CorruptHistoryRow,
            Self::Missing { table: "assets", .. } => ErrorCode::AssetNotFound,
            Self::Missing { .. } => ErrorCode::StorageFailure,
        }
    }
}
