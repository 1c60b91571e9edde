//! v001 -- Key registry schema.
//!
//! Creates `keys`, `key_parents`, `names` and `addresses`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Keys
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS keys (
    key_hex          TEXT PRIMARY KEY NOT NULL,   -- curve tag || compressed point
    registered_at_ms INTEGER NOT NULL,
    disabled         INTEGER NOT NULL DEFAULT 0,  -- 0 -> 1 only
    disabled_at_ms   INTEGER,
    disabled_by      TEXT                         -- hex key of the disabler
);

-- ----------------------------------------------------------------
-- Delegation (child -> parent)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS key_parents (
    child_hex   TEXT NOT NULL,
    parent_hex  TEXT NOT NULL,
    added_at_ms INTEGER NOT NULL,

    PRIMARY KEY (child_hex, parent_hex),
    FOREIGN KEY (child_hex) REFERENCES keys(key_hex) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Names
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS names (
    name        TEXT PRIMARY KEY NOT NULL,        -- lower-case
    key_hex     TEXT NOT NULL,
    bound_at_ms INTEGER NOT NULL,

    FOREIGN KEY (key_hex) REFERENCES keys(key_hex)
);

CREATE INDEX IF NOT EXISTS idx_names_key ON names(key_hex);

-- ----------------------------------------------------------------
-- Protocol addresses per name
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS addresses (
    name          TEXT NOT NULL,
    protocol      TEXT NOT NULL,
    address       TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL,

    PRIMARY KEY (name, protocol),
    FOREIGN KEY (name) REFERENCES names(name) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
