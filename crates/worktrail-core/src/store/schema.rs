//! Canonical SQLite schema for the engine store.
//!
//! - `tasks` / `projects` keep the latest aggregate for each entity, with
//!   workflow scalars as real columns (so conditional CAS updates can guard
//!   on them) and ordered sub-records as JSON
//! - `audit_entries` is the append-only trail, keyed by content hash
//! - `performance_snapshots` holds immutable aggregation output
//! - `aggregation_runs` is the run-lock table: a row exists while a run for
//!   that (workspace, period, window) is in flight
//! - `store_meta` tracks schema version and sweep bookkeeping

/// Migration v1: entity tables, trail, snapshots, run-lock, metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('to-do', 'in-progress', 'done')),
    approval_status TEXT NOT NULL DEFAULT 'not-required'
        CHECK (approval_status IN ('not-required', 'pending-approval', 'approved', 'rejected')),
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    assignee TEXT,
    creator TEXT NOT NULL,
    start_date_us INTEGER,
    due_date_us INTEGER,
    started_at_us INTEGER,
    completed_at_us INTEGER,
    submitted_at_us INTEGER,
    approved_at_us INTEGER,
    approved_by TEXT,
    is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    rejections_json TEXT NOT NULL DEFAULT '[]',
    metrics_json TEXT NOT NULL DEFAULT '{}',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'planning'
        CHECK (status IN ('planning', 'active', 'on-hold', 'completed', 'cancelled')),
    start_date_us INTEGER,
    end_date_us INTEGER,
    project_head TEXT NOT NULL,
    members_json TEXT NOT NULL DEFAULT '[]',
    is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    date_changes_json TEXT NOT NULL DEFAULT '[]',
    metrics_json TEXT NOT NULL DEFAULT '{}',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_entries (
    entry_hash TEXT PRIMARY KEY,
    entity_kind TEXT NOT NULL CHECK (entity_kind IN ('task', 'project')),
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    ts_us INTEGER NOT NULL,
    changes_json TEXT NOT NULL DEFAULT '[]',
    metadata_json TEXT NOT NULL DEFAULT 'null'
);

CREATE TABLE IF NOT EXISTS performance_snapshots (
    snapshot_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    period TEXT NOT NULL CHECK (period IN ('daily', 'weekly', 'monthly')),
    snapshot_date_us INTEGER NOT NULL,
    metrics_json TEXT NOT NULL,
    projects_json TEXT NOT NULL DEFAULT '[]',
    rank INTEGER NOT NULL,
    percentile REAL NOT NULL,
    total_in_workspace INTEGER NOT NULL,
    trends_json TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS aggregation_runs (
    workspace_id TEXT NOT NULL,
    period TEXT NOT NULL,
    window_start_us INTEGER NOT NULL,
    window_end_us INTEGER NOT NULL,
    started_at_us INTEGER NOT NULL,
    PRIMARY KEY (workspace_id, period, window_start_us, window_end_us)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_sweep_at_us INTEGER NOT NULL DEFAULT 0,
    last_sweep_deleted INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for the trail and snapshot queries.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_audit_entity_ts
    ON audit_entries(entity_id, ts_us DESC);

CREATE INDEX IF NOT EXISTS idx_audit_actor_ts
    ON audit_entries(actor, ts_us DESC);

CREATE INDEX IF NOT EXISTS idx_audit_ts
    ON audit_entries(ts_us);

CREATE INDEX IF NOT EXISTS idx_tasks_workspace_assignee
    ON tasks(workspace_id, assignee);

CREATE INDEX IF NOT EXISTS idx_tasks_project
    ON tasks(project_id);

CREATE INDEX IF NOT EXISTS idx_snapshots_user_period_date
    ON performance_snapshots(user_id, period, snapshot_date_us DESC);

CREATE INDEX IF NOT EXISTS idx_snapshots_workspace_period_date
    ON performance_snapshots(workspace_id, period, snapshot_date_us DESC);
";

/// Index names migrations are expected to create, asserted by tests.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_audit_entity_ts",
    "idx_audit_actor_ts",
    "idx_audit_ts",
    "idx_tasks_workspace_assignee",
    "idx_tasks_project",
    "idx_snapshots_user_period_date",
    "idx_snapshots_workspace_period_date",
];
