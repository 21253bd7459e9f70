/// Database schema initialization.
/// Sets up SQLite WAL mode and creates the envelope log on startup.
use rusqlite::{Connection, Result as SqliteResult};

/// Initialize database connection with WAL mode and schema
pub fn initialize_database(conn: &Connection) -> SqliteResult<()> {
    // Enable WAL mode (for file-based DB only, ignore error for in-memory)
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL");
    let _ = conn.execute_batch("PRAGMA synchronous = NORMAL");

    create_schema(conn)?;

    Ok(())
}

fn create_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS envelopes (
            id INTEGER PRIMARY KEY,
            sender TEXT NOT NULL,
            receiver TEXT NOT NULL,
            ciphertext TEXT NOT NULL,
            iv TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_envelopes_pair
            ON envelopes(sender, receiver, timestamp);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_initialize_in_memory_database() {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
        initialize_database(&conn).expect("Failed to initialize DB");

        let tables: Vec<String> = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            )
            .expect("Query failed")
            .query_map([], |row| row.get(0))
            .expect("Mapping failed")
            .collect::<Result<Vec<_>, _>>()
            .expect("Collection failed");

        assert_eq!(tables, vec!["envelopes".to_string()]);
    }

    #[test]
    fn test_envelopes_table_schema() {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
        initialize_database(&conn).expect("Failed to initialize DB");

        let mut stmt = conn
            .prepare("PRAGMA table_info(envelopes)")
            .expect("Query failed");
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("Mapping failed")
            .collect::<Result<Vec<_>, _>>()
            .expect("Collection failed");

        for column in ["id", "sender", "receiver", "ciphertext", "iv", "timestamp"] {
            assert!(columns.contains(&column.to_string()), "missing column {}", column);
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
        initialize_database(&conn).expect("First init failed");
        initialize_database(&conn).expect("Second init failed");
    }
}
