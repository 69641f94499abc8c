//! Cache database schema

/// SQL schema for the response cache
pub const SCHEMA_SQL: &str = r#"
-- One row per canonical URL; key is the hex SHA-256 of the URL
CREATE TABLE IF NOT EXISTS responses (
    key TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    final_url TEXT NOT NULL DEFAULT '',
    status_code INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_responses_expires ON responses(expires_at);
"#;

/// Initializes the cache schema
///
/// Databases created before `final_url` existed get the column added; their
/// rows read back with an empty value.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;

    if !has_column(conn, "responses", "final_url")? {
        conn.execute_batch(
            "ALTER TABLE responses ADD COLUMN final_url TEXT NOT NULL DEFAULT '';",
        )?;
    }
    Ok(())
}

fn has_column(
    conn: &rusqlite::Connection,
    table: &str,
    column: &str,
) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
