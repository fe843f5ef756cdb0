//! SQL migration definitions for the webcatalog database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

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
        description: "Initial schema: categorized JSON records",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Generic record store: one JSON body per (category, id).
-- Jobs, phase results, discovery projects, and discovered URLs all live
-- here; discovered URLs use a per-project category and their normalized
-- URL as the id, so duplicate discoveries collapse on write.
CREATE TABLE IF NOT EXISTS records (
    category   TEXT NOT NULL,
    id         TEXT NOT NULL,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (category, id)
);

CREATE INDEX IF NOT EXISTS idx_records_category ON records(category);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
