use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// Uniqueness of serial numbers and of (device, parameter name) lives here, not
// in application code, so independent connections stay correct.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS devices (
    device_id BLOB PRIMARY KEY CHECK (length(device_id) = 16),
    serial_number TEXT NOT NULL UNIQUE CHECK (length(serial_number) > 0),
    hardware_version TEXT NOT NULL DEFAULT '',
    software_version TEXT NOT NULL DEFAULT '',
    connection_request_url TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TRIGGER IF NOT EXISTS devices_immutable_columns
BEFORE UPDATE OF device_id, serial_number, created_at ON devices
BEGIN
    SELECT RAISE(ABORT, 'device_id, serial_number and created_at are immutable');
END;

CREATE TABLE IF NOT EXISTS parameters (
    device_id BLOB NOT NULL REFERENCES devices (device_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    value TEXT NOT NULL,
    value_type TEXT NOT NULL,
    flags INTEGER NOT NULL DEFAULT 0 CHECK (flags BETWEEN 0 AND 15),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (device_id, name)
) WITHOUT ROWID;
";
