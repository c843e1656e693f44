//! Persistence of actions, transitions and their execution log.

use super::{
    ActionDef, NAME_MAX_LEN, Transition, TransitionError, TransitionExecution, slugify,
};
use crate::db::{from_us, now_us, with_savepoint};
use crate::error::StorageError;
use crate::model::{ActionId, AssetId, ExecutionId, Status, TransitionId, UserId};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

/// Definition of a transition to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransition {
    pub name: String,
    pub from_status: Option<Status>,
    pub to_status: Status,
    /// Action names, in execution order. Missing actions are created.
    pub actions: Vec<String>,
}

fn validate_name(what: &str, name: &str) -> Result<(), TransitionError> {
    if name.trim().is_empty() {
        return Err(TransitionError::InvalidDefinition(format!(
            "{what} name must not be empty"
        )));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(TransitionError::InvalidDefinition(format!(
            "{what} name '{name}' exceeds {NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Create a new action.
///
/// # Errors
///
/// Returns [`TransitionError::InvalidDefinition`] for an empty or overlong
/// name, or [`TransitionError::Storage`] if the name is taken.
pub fn create_action(conn: &Connection, name: &str) -> Result<ActionDef, TransitionError> {
    validate_name("action", name)?;
    conn.execute("INSERT INTO actions (name) VALUES (?1)", params![name])?;
    let id = ActionId(conn.last_insert_rowid());
    debug!(action_id = %id, name, "created action");
    Ok(ActionDef {
        id,
        name: name.to_string(),
    })
}

/// Look up an action by name, creating it if absent.
///
/// # Errors
///
/// Returns [`StorageError`] if the insert or lookup fails.
pub fn ensure_action(conn: &Connection, name: &str) -> Result<ActionDef, StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO actions (name) VALUES (?1)",
        params![name],
    )?;
    let id = conn.query_row(
        "SELECT action_id FROM actions WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(ActionDef {
        id,
        name: name.to_string(),
    })
}

/// Every action, ordered by name.
///
/// # Errors
///
/// Returns [`StorageError`] if the query fails.
pub fn list_actions(conn: &Connection) -> Result<Vec<ActionDef>, StorageError> {
    let mut stmt = conn.prepare("SELECT action_id, name FROM actions ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(ActionDef {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Create a transition and its ordered action list in one savepoint.
///
/// # Errors
///
/// Returns [`TransitionError::InvalidDefinition`] for bad names, an empty
/// slug, or a repeated action; [`TransitionError::Storage`] if the name or
/// slug is already taken.
pub fn create_transition(
    conn: &Connection,
    new: &NewTransition,
) -> Result<Transition, TransitionError> {
    validate_name("transition", &new.name)?;
    let slug = slugify(&new.name);
    if slug.is_empty() {
        return Err(TransitionError::InvalidDefinition(format!(
            "transition name '{}' has no characters usable in a slug",
            new.name
        )));
    }
    for (idx, action) in new.actions.iter().enumerate() {
        validate_name("action", action)?;
        if new.actions[..idx].contains(action) {
            return Err(TransitionError::InvalidDefinition(format!(
                "action '{action}' listed twice"
            )));
        }
    }

    with_savepoint(conn, "create_transition", |conn| {
        let now = now_us();
        conn.execute(
            "INSERT INTO transitions (name, slug, from_status, to_status, created_at_us, updated_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![new.name, slug, new.from_status, new.to_status, now],
        )?;
        let id = TransitionId(conn.last_insert_rowid());

        let mut actions = Vec::with_capacity(new.actions.len());
        for (position, name) in new.actions.iter().enumerate() {
            let action = ensure_action(conn, name)?;
            conn.execute(
                "INSERT INTO transition_actions (transition_id, action_id, position)
                 VALUES (?1, ?2, ?3)",
                params![id, action.id, i64::try_from(position).unwrap_or(i64::MAX)],
            )?;
            actions.push(action);
        }

        debug!(transition_id = %id, name = %new.name, actions = actions.len(), "created transition");
        Ok(Transition {
            id,
            name: new.name.clone(),
            slug,
            from_status: new.from_status,
            to_status: new.to_status,
            actions,
        })
    })
}

struct TransitionRow {
    id: TransitionId,
    name: String,
    slug: String,
    from_status: Option<Status>,
    to_status: Status,
}

impl TransitionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            from_status: row.get(3)?,
            to_status: row.get(4)?,
        })
    }

    fn with_actions(self, conn: &Connection) -> Result<Transition, StorageError> {
        let mut stmt = conn.prepare(
            "SELECT a.action_id, a.name
             FROM transition_actions ta
             JOIN actions a ON a.action_id = ta.action_id
             WHERE ta.transition_id = ?1
             ORDER BY ta.position ASC",
        )?;
        let actions = stmt
            .query_map(params![self.id], |row| {
                Ok(ActionDef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Transition {
            id: self.id,
            name: self.name,
            slug: self.slug,
            from_status: self.from_status,
            to_status: self.to_status,
            actions,
        })
    }
}

const TRANSITION_COLUMNS: &str =
    "SELECT transition_id, name, slug, from_status, to_status FROM transitions";

/// # Errors
///
/// Returns [`StorageError`] if the query fails.
pub fn get_transition_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<Transition>, StorageError> {
    let sql = format!("{TRANSITION_COLUMNS} WHERE name = ?1");
    conn.query_row(&sql, params![name], TransitionRow::from_row)
        .optional()?
        .map(|row| row.with_actions(conn))
        .transpose()
}

fn query_transitions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Transition>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, TransitionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| row.with_actions(conn)).collect()
}

/// Every transition, ordered by name.
///
/// # Errors
///
/// Returns [`StorageError`] if the query fails.
pub fn list_transitions(conn: &Connection) -> Result<Vec<Transition>, StorageError> {
    query_transitions(conn, &format!("{TRANSITION_COLUMNS} ORDER BY name ASC"), [])
}

/// Transitions an asset in `current` status may take: those leaving exactly
/// that status plus the wildcards, ordered by name.
///
/// # Errors
///
/// Returns [`StorageError`] if the query fails.
pub fn list_transitions_applicable(
    conn: &Connection,
    current: Status,
) -> Result<Vec<Transition>, StorageError> {
    query_transitions(
        conn,
        &format!(
            "{TRANSITION_COLUMNS} WHERE from_status IS NULL OR from_status = ?1 ORDER BY name ASC"
        ),
        params![current],
    )
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

/// Append one execution record covering `asset_ids`.
///
/// The asset set is stored sorted and without duplicates.
///
/// # Errors
///
/// Returns [`StorageError`] if any insert fails; nothing is written then.
pub fn record_execution(
    conn: &Connection,
    transition_id: TransitionId,
    logged_user: UserId,
    affected_user: UserId,
    asset_ids: &[AssetId],
) -> Result<TransitionExecution, StorageError> {
    let mut assets = asset_ids.to_vec();
    assets.sort_unstable();
    assets.dedup();

    with_savepoint(conn, "record_execution", |conn| {
        let at = now_us();
        conn.execute(
            "INSERT INTO transitions_history (transition_id, logged_user_id, affected_user_id, created_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![transition_id, logged_user, affected_user, at],
        )?;
        let id = ExecutionId(conn.last_insert_rowid());
        for asset in &assets {
            conn.execute(
                "INSERT INTO transitions_history_assets (execution_id, asset_id) VALUES (?1, ?2)",
                params![id, asset],
            )?;
        }
        Ok(TransitionExecution {
            id,
            transition_id,
            logged_user_id: logged_user,
            affected_user_id: affected_user,
            asset_ids: assets,
            created_at: from_us(at),
        })
    })
}

struct ExecutionRow {
    id: ExecutionId,
    transition_id: TransitionId,
    logged_user_id: UserId,
    affected_user_id: UserId,
    created_at_us: i64,
}

impl ExecutionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            transition_id: row.get(1)?,
            logged_user_id: row.get(2)?,
            affected_user_id: row.get(3)?,
            created_at_us: row.get(4)?,
        })
    }

    fn with_assets(self, conn: &Connection) -> Result<TransitionExecution, StorageError> {
        let mut stmt = conn.prepare(
            "SELECT asset_id FROM transitions_history_assets
             WHERE execution_id = ?1 ORDER BY asset_id ASC",
        )?;
        let asset_ids = stmt
            .query_map(params![self.id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TransitionExecution {
            id: self.id,
            transition_id: self.transition_id,
            logged_user_id: self.logged_user_id,
            affected_user_id: self.affected_user_id,
            asset_ids,
            created_at: from_us(self.created_at_us),
        })
    }
}

/// # Errors
///
/// Returns [`StorageError`] if the query fails.
pub fn get_execution(
    conn: &Connection,
    id: ExecutionId,
) -> Result<Option<TransitionExecution>, StorageError> {
    conn.query_row(
        "SELECT execution_id, transition_id, logged_user_id, affected_user_id, created_at_us
         FROM transitions_history WHERE execution_id = ?1",
        params![id],
        ExecutionRow::from_row,
    )
    .optional()?
    .map(|row| row.with_assets(conn))
    .transpose()
}

/// Executions that moved `asset_id`, newest first.
///
/// # Errors
///
/// Returns [`StorageError`] if the query fails.
pub fn executions_for_asset(
    conn: &Connection,
    asset_id: AssetId,
) -> Result<Vec<TransitionExecution>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT th.execution_id, th.transition_id, th.logged_user_id, th.affected_user_id,
                th.created_at_us
         FROM transitions_history th
         JOIN transitions_history_assets tha ON tha.execution_id = th.execution_id
         WHERE tha.asset_id = ?1
         ORDER BY th.created_at_us DESC, th.execution_id DESC",
    )?;
    let rows = stmt
        .query_map(params![asset_id], ExecutionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| row.with_assets(conn)).collect()
}
