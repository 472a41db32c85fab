//! SQL migration definitions for the importkit database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: import_runs, element_state, element_revisions",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per pipeline run
CREATE TABLE IF NOT EXISTS import_runs (
    id           TEXT PRIMARY KEY,
    mapping_name TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    report_json  TEXT
);

-- Latest committed target per element
CREATE TABLE IF NOT EXISTS element_state (
    element_id  TEXT PRIMARY KEY,
    target_json TEXT NOT NULL,
    target_hash TEXT NOT NULL,
    revision    INTEGER NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Every committed target, in commit order
CREATE TABLE IF NOT EXISTS element_revisions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    element_id  TEXT NOT NULL,
    revision    INTEGER NOT NULL,
    target_json TEXT NOT NULL,
    target_hash TEXT NOT NULL,
    saved_at    TEXT NOT NULL,
    UNIQUE(element_id, revision)
);

CREATE INDEX IF NOT EXISTS idx_element_revisions_element ON element_revisions(element_id);
CREATE INDEX IF NOT EXISTS idx_element_state_hash ON element_state(target_hash);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
