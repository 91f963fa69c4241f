use crate::core::error::AppResult;
use crate::market::Exchange;
use crate::storage::migrations::run_migrations;
use crate::storage::UserSettings;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a pool with up to 10 connections and brings the schema up
/// to date on the first one.
///
/// # Example
///
/// ```no_run
/// use fundcore::storage::create_pool;
///
/// let pool = create_pool("funding_bot.db")?;
/// # Ok::<(), fundcore::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

/// Truthy spellings found in old rows: `1`, `"1"`, `"true"`, `"True"`.
fn lenient_flag(value: Value) -> bool {
    match value {
        Value::Integer(v) => v == 1,
        Value::Real(v) => v == 1.0,
        Value::Text(s) => matches!(s.as_str(), "1" | "true" | "True"),
        Value::Null | Value::Blob(_) => false,
    }
}

/// Known exchanges of a stored JSON array, deduplicated, and whether
/// anything had to be dropped.
fn parse_exchanges(raw: Option<&str>) -> (Vec<Exchange>, bool) {
    let Some(raw) = raw else {
        return (Exchange::all(), false);
    };

    let names: Vec<String> = match serde_json::from_str(raw) {
        Ok(names) => names,
        Err(e) => {
            log::warn!("Malformed exchanges column {:?}: {}; using all exchanges", raw, e);
            return (Exchange::all(), true);
        }
    };

    let mut exchanges = Vec::with_capacity(names.len());
    for name in &names {
        match Exchange::parse(name) {
            Some(exchange) if !exchanges.contains(&exchange) => exchanges.push(exchange),
            _ => {}
        }
    }
    let dropped = exchanges.len() != names.len();
    (exchanges, dropped)
}

fn exchanges_json(exchanges: &[Exchange]) -> AppResult<String> {
    Ok(serde_json::to_string(exchanges)?)
}

struct StoredRow {
    settings: UserSettings,
    polluted: bool,
}

fn load_row(conn: &Connection, user_id: i64) -> AppResult<Option<StoredRow>> {
    let row = conn
        .query_row(
            "SELECT threshold, volume_filter, exchanges, active, spot_filter FROM user_settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, Option<f64>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Value>(3)?,
                    row.get::<_, Value>(4)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(threshold, volume_filter, exchanges, active, spot_filter)| {
        let defaults = UserSettings::new(user_id);
        let (exchanges, polluted) = parse_exchanges(exchanges.as_deref());
        StoredRow {
            settings: UserSettings {
                user_id,
                threshold: threshold.unwrap_or(defaults.threshold),
                volume_filter: volume_filter.unwrap_or(defaults.volume_filter),
                exchanges,
                active: lenient_flag(active),
                spot_filter: lenient_flag(spot_filter),
            },
            polluted,
        }
    }))
}

/// Settings of `user_id`; defaults when no row exists.
pub fn get_user_settings(conn: &Connection, user_id: i64) -> AppResult<UserSettings> {
    Ok(load_row(conn, user_id)?
        .map(|row| row.settings)
        .unwrap_or_else(|| UserSettings::new(user_id)))
}

/// Upserts the whole row.
pub fn save_user_settings(conn: &Connection, settings: &UserSettings) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO user_settings (user_id, threshold, volume_filter, exchanges, active, spot_filter)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            settings.user_id,
            settings.threshold,
            settings.volume_filter,
            exchanges_json(&settings.exchanges)?,
            settings.active as i64,
            settings.spot_filter as i64,
        ],
    )?;
    Ok(())
}

/// Stores defaults for a new user and returns the current settings.
pub fn ensure_user(conn: &Connection, user_id: i64) -> AppResult<UserSettings> {
    match load_row(conn, user_id)? {
        Some(row) => Ok(row.settings),
        None => {
            let settings = UserSettings::new(user_id);
            save_user_settings(conn, &settings)?;
            log::info!("Created settings for user {}", user_id);
            Ok(settings)
        }
    }
}

fn update<F>(conn: &Connection, user_id: i64, change: F) -> AppResult<UserSettings>
where
    F: FnOnce(&mut UserSettings),
{
    let mut settings = get_user_settings(conn, user_id)?;
    change(&mut settings);
    save_user_settings(conn, &settings)?;
    Ok(settings)
}

pub fn set_active(conn: &Connection, user_id: i64, active: bool) -> AppResult<()> {
    update(conn, user_id, |s| s.active = active).map(|_| ())
}

pub fn set_threshold(conn: &Connection, user_id: i64, threshold: f64) -> AppResult<()> {
    update(conn, user_id, |s| s.threshold = threshold).map(|_| ())
}

pub fn set_volume_filter(conn: &Connection, user_id: i64, volume_filter: f64) -> AppResult<()> {
    update(conn, user_id, |s| s.volume_filter = volume_filter).map(|_| ())
}

/// Flips one exchange and returns the updated settings.
pub fn toggle_exchange(conn: &Connection, user_id: i64, exchange: Exchange) -> AppResult<UserSettings> {
    update(conn, user_id, |s| s.toggle_exchange(exchange))
}

/// Flips the spot filter and returns the new value. Unknown exchange
/// entries are dropped by the same write.
pub fn toggle_spot_filter(conn: &Connection, user_id: i64) -> AppResult<bool> {
    let settings = update(conn, user_id, |s| s.spot_filter = !s.spot_filter)?;
    log::info!("User {} spot filter -> {}", user_id, settings.spot_filter);
    Ok(settings.spot_filter)
}

/// Rewrites the exchanges column when it holds unknown or duplicate
/// entries. Returns whether a rewrite happened.
pub fn clean_exchanges(conn: &Connection, user_id: i64) -> AppResult<bool> {
    match load_row(conn, user_id)? {
        Some(row) if row.polluted => {
            save_user_settings(conn, &row.settings)?;
            log::info!("Cleaned exchanges for user {}: {:?}", user_id, row.settings.exchanges);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Users whose alerts are on.
pub fn list_active_users(conn: &Connection) -> AppResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT user_id, active FROM user_settings ORDER BY user_id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Value>(1)?)))?;

    let mut users = Vec::new();
    for row in rows {
        let (user_id, active) = row?;
        if lenient_flag(active) {
            users.push(user_id);
        }
    }
    Ok(users)
}

pub fn count_users(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM user_settings", [], |row| row.get(0))?)
}
