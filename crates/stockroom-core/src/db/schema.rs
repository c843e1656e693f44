//! Canonical SQLite schema for stockroom.
//!
//! - `assets` is the aggregate root; `device_info`, `part_info` and
//!   `office_info` are its optional 1:1 sub-records
//! - `asset_history_changes` is the append-only audit trail, attributed to one
//!   subject and carrying four nullable columns for the union history query
//! - transition tables hold workflow definitions and their execution log
//! - `store_meta` mirrors the applied schema version

/// Migration v1: inventory tables and the change-history audit trail.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS device_info (
    device_info_id INTEGER PRIMARY KEY AUTOINCREMENT,
    ralph_device_id INTEGER,
    u_level TEXT,
    u_height TEXT,
    rack TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS part_info (
    part_info_id INTEGER PRIMARY KEY AUTOINCREMENT,
    barcode_salvaged TEXT,
    source_device_id INTEGER,
    device_id INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS office_info (
    office_info_id INTEGER PRIMARY KEY AUTOINCREMENT,
    license_key TEXT,
    version TEXT,
    unit_price REAL,
    license_type TEXT,
    date_of_last_inventory TEXT,
    last_logged_user TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS assets (
    asset_id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN ('device', 'part')),
    status INTEGER NOT NULL CHECK (status >= 0),
    sn TEXT UNIQUE,
    barcode TEXT UNIQUE,
    model TEXT NOT NULL DEFAULT '',
    price REAL,
    remarks TEXT NOT NULL DEFAULT '',
    niw TEXT,
    order_no TEXT,
    invoice_no TEXT,
    owner_id INTEGER,
    user_id INTEGER,
    warehouse TEXT,
    device_info_id INTEGER UNIQUE REFERENCES device_info(device_info_id) ON DELETE SET NULL,
    part_info_id INTEGER UNIQUE REFERENCES part_info(part_info_id) ON DELETE SET NULL,
    office_info_id INTEGER UNIQUE REFERENCES office_info(office_info_id) ON DELETE SET NULL,
    deleted INTEGER NOT NULL DEFAULT 0 CHECK (deleted IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS asset_history_changes (
    change_id INTEGER PRIMARY KEY AUTOINCREMENT,
    changed_at_us INTEGER NOT NULL,
    subject_kind TEXT NOT NULL
        CHECK (subject_kind IN ('asset', 'device_info', 'part_info', 'office_info')),
    subject_id INTEGER NOT NULL,
    asset_id INTEGER REFERENCES assets(asset_id) ON DELETE SET NULL,
    device_info_id INTEGER REFERENCES device_info(device_info_id) ON DELETE SET NULL,
    part_info_id INTEGER REFERENCES part_info(part_info_id) ON DELETE SET NULL,
    office_info_id INTEGER REFERENCES office_info(office_info_id) ON DELETE SET NULL,
    user_id INTEGER,
    field_name TEXT NOT NULL DEFAULT '' CHECK (length(field_name) <= 64),
    old_value TEXT NOT NULL DEFAULT '' CHECK (length(old_value) <= 255),
    new_value TEXT NOT NULL DEFAULT '' CHECK (length(new_value) <= 255),
    comment TEXT
);

-- Only the attribution columns may move after a change is written:
-- asset_id through the linker, the others through detach-on-delete.
CREATE TRIGGER IF NOT EXISTS asset_history_changes_immutable
BEFORE UPDATE OF changed_at_us, subject_kind, subject_id, user_id,
    field_name, old_value, new_value, comment
ON asset_history_changes
BEGIN
    SELECT RAISE(ABORT, 'asset history changes are immutable');
END;

CREATE TRIGGER IF NOT EXISTS asset_history_changes_append_only
BEFORE DELETE ON asset_history_changes
BEGIN
    SELECT RAISE(ABORT, 'asset history changes are append-only');
END;

CREATE INDEX IF NOT EXISTS idx_history_asset_changed
    ON asset_history_changes(asset_id, changed_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_history_device_info
    ON asset_history_changes(device_info_id);

CREATE INDEX IF NOT EXISTS idx_history_part_info
    ON asset_history_changes(part_info_id);

CREATE INDEX IF NOT EXISTS idx_history_office_info
    ON asset_history_changes(office_info_id);

CREATE INDEX IF NOT EXISTS idx_history_subject
    ON asset_history_changes(subject_kind, subject_id);

CREATE INDEX IF NOT EXISTS idx_assets_status
    ON assets(status, asset_id);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: transition workflow definitions and execution history.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS actions (
    action_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0 AND length(name) <= 75)
);

CREATE TABLE IF NOT EXISTS transitions (
    transition_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0 AND length(name) <= 75),
    slug TEXT NOT NULL UNIQUE CHECK (length(slug) <= 100),
    from_status INTEGER CHECK (from_status IS NULL OR from_status >= 0),
    to_status INTEGER NOT NULL CHECK (to_status >= 0),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transition_actions (
    transition_id INTEGER NOT NULL REFERENCES transitions(transition_id) ON DELETE CASCADE,
    action_id INTEGER NOT NULL REFERENCES actions(action_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    PRIMARY KEY (transition_id, action_id),
    UNIQUE (transition_id, position)
);

CREATE TABLE IF NOT EXISTS transitions_history (
    execution_id INTEGER PRIMARY KEY AUTOINCREMENT,
    transition_id INTEGER NOT NULL REFERENCES transitions(transition_id),
    logged_user_id INTEGER NOT NULL,
    affected_user_id INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transitions_history_assets (
    execution_id INTEGER NOT NULL REFERENCES transitions_history(execution_id) ON DELETE CASCADE,
    -- No foreign key: an execution keeps its asset set after an asset is deleted.
    asset_id INTEGER NOT NULL,
    PRIMARY KEY (execution_id, asset_id)
);

CREATE INDEX IF NOT EXISTS idx_transitions_from_status
    ON transitions(from_status, name);

CREATE INDEX IF NOT EXISTS idx_transitions_history_assets_asset
    ON transitions_history_assets(asset_id, execution_id DESC);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by history and transition query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_history_asset_changed",
    "idx_history_device_info",
    "idx_history_part_info",
    "idx_history_office_info",
    "idx_history_subject",
    "idx_assets_status",
    "idx_transitions_from_status",
    "idx_transitions_history_assets_asset",
];
