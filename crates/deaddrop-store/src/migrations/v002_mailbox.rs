//! v002 -- Ordered key/value table for the SQLite mailbox backend.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS mailbox (
    entry_key   TEXT PRIMARY KEY NOT NULL,  -- <fingerprint hex>/<content hash hex>
    saved_at_ms INTEGER NOT NULL,
    message     BLOB NOT NULL               -- JSON-encoded Message
);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
