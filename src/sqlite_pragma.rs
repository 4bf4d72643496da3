//! Shared SQLite connection tuning
//!
//! Every connection the store opens (writer and reader) goes through
//! `apply_optimized_pragmas` so both sides agree on WAL mode. WAL is what lets
//! the dashboard read committed snapshots while ingestion keeps writing.

use rusqlite::Connection;

/// Pages between automatic WAL checkpoints
pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;

/// Apply optimized PRAGMAs (WAL, NORMAL, MEMORY, mmap, cache, autocheckpoint)
pub fn apply_optimized_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    conn.pragma_update(None, "cache_size", -64_000i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", WAL_AUTOCHECKPOINT_PAGES)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // Writer and reader contend briefly during checkpoints
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}
