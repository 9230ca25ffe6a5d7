use rusqlite::Connection;

use crate::error::Result;

/// Initialise the packages table.
///
/// Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS packages (
            name         TEXT NOT NULL PRIMARY KEY,
            content      BLOB NOT NULL,
            author       TEXT NOT NULL,
            description  TEXT NOT NULL,
            version      TEXT NOT NULL,
            file_name    TEXT NOT NULL,
            arguments    TEXT NOT NULL,
            create_time  TEXT NOT NULL   -- RFC3339, bumped on every save
        );",
    )?;
    Ok(())
}
