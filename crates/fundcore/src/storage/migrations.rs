use crate::core::error::{AppError, AppResult};
use rusqlite::Connection;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

static MIGRATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Applies embedded migrations, then patches tables that predate them.
pub fn run_migrations(conn: &mut Connection) -> AppResult<()> {
    // One runner per process
    let mutex = MIGRATION_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Migration lock was poisoned, recovering...");
            poisoned.into_inner()
        }
    };

    conn.busy_timeout(Duration::from_secs(30))?;

    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| AppError::Migration(e.to_string()))?;
    for migration in report.applied_migrations() {
        log::info!("Applied migration {}", migration);
    }

    migrate_legacy_schema(conn)
}

/// Adds columns missing from `user_settings` tables created by older
/// releases.
fn migrate_legacy_schema(conn: &Connection) -> AppResult<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(user_settings)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    if !columns.iter().any(|c| c == "spot_filter") {
        log::info!("Adding missing column: spot_filter to user_settings table");
        conn.execute("ALTER TABLE user_settings ADD COLUMN spot_filter INTEGER DEFAULT 1", [])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("PRAGMA table_info(user_settings)").unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
    }

    #[test]
    fn test_fresh_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(
            columns(&conn),
            vec!["user_id", "threshold", "volume_filter", "exchanges", "active", "spot_filter"]
        );
    }

    #[test]
    fn test_legacy_table_gets_spot_filter_column() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE user_settings (
                user_id INTEGER PRIMARY KEY,
                threshold REAL DEFAULT 0.1,
                volume_filter REAL DEFAULT 0,
                exchanges TEXT DEFAULT '[\"bybit\",\"binance\",\"bitget\",\"okx\"]',
                active INTEGER DEFAULT 1
            );
            INSERT INTO user_settings (user_id, threshold) VALUES (7, 0.3);",
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        assert!(columns(&conn).contains(&"spot_filter".to_string()));
        let spot: i64 = conn
            .query_row("SELECT spot_filter FROM user_settings WHERE user_id = 7", [], |r| r.get(0))
            .unwrap();
        assert_eq!(spot, 1);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
    }
}
