/// Bumped whenever `SCHEMA` changes shape.
pub const SCHEMA_VERSION: i64 = 1;

/// Local store schema. Every statement is guarded so it can run on each open.
pub const SCHEMA: &str = r#"
-- Single cached profile row
CREATE TABLE IF NOT EXISTS user_profile (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schedules (
    id TEXT PRIMARY KEY,
    work_date TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_schedules_work_date ON schedules(work_date);

CREATE TABLE IF NOT EXISTS attendances (
    id TEXT PRIMARY KEY,
    work_date TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attendances_work_date ON attendances(work_date);

-- Durable queue of mutations awaiting delivery
CREATE TABLE IF NOT EXISTS pending_actions (
    id TEXT PRIMARY KEY,
    action_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING'
);

CREATE INDEX IF NOT EXISTS idx_pending_actions_status ON pending_actions(status);
CREATE INDEX IF NOT EXISTS idx_pending_actions_type ON pending_actions(action_type);

-- Last successful refresh per cache category
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
