pub mod messages;

use sqlx::any::AnyPoolOptions;
use std::sync::OnceLock;
use thiserror::Error;

pub type DbPool = sqlx::AnyPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEngine {
    Sqlite,
    Postgres,
}

impl DatabaseEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

static ACTIVE_DB_ENGINE: OnceLock<DatabaseEngine> = OnceLock::new();

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Session settings applied to every new connection, per engine.
const SQLITE_SESSION_SETTINGS: &[&str] = &[
    "PRAGMA journal_mode = WAL;",
    "PRAGMA busy_timeout = 5000;",
    "PRAGMA synchronous = NORMAL;",
    "PRAGMA foreign_keys = ON;",
];
const POSTGRES_SESSION_SETTINGS: &[&str] = &["SET lock_timeout = '10s'", "SET timezone = 'UTC'"];

impl DatabaseEngine {
    fn session_settings(self) -> &'static [&'static str] {
        match self {
            Self::Sqlite => SQLITE_SESSION_SETTINGS,
            Self::Postgres => POSTGRES_SESSION_SETTINGS,
        }
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let engine = detect_database_engine(database_url)?;
    if ACTIVE_DB_ENGINE.set(engine).is_err() && active_database_engine() != engine {
        tracing::warn!(
            engine = engine.as_str(),
            "a pool for a different engine already exists in this process"
        );
    }

    // sqlx::Any needs its drivers registered before the first connect.
    sqlx::any::install_default_drivers();

    let connect_url = match engine {
        DatabaseEngine::Sqlite => normalize_sqlite_url_for_any(database_url),
        DatabaseEngine::Postgres => database_url.to_string(),
    };

    AnyPoolOptions::new()
        .max_connections(max_connections.max(1))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                for statement in engine.session_settings() {
                    sqlx::query(statement).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect(&connect_url)
        .await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    run_migrations_for_engine(pool, active_database_engine()).await
}

pub async fn run_migrations_for_engine(
    pool: &DbPool,
    engine: DatabaseEngine,
) -> Result<(), sqlx::Error> {
    match engine {
        DatabaseEngine::Sqlite => sqlx::migrate!("./migrations").run(pool).await?,
        DatabaseEngine::Postgres => sqlx::migrate!("./migrations_pg").run(pool).await?,
    }
    tracing::info!(engine = engine.as_str(), "migrations: applied successfully");
    Ok(())
}

pub fn detect_database_engine(database_url: &str) -> Result<DatabaseEngine, sqlx::Error> {
    let normalized = database_url.trim().to_ascii_lowercase();
    if normalized.starts_with("sqlite:") {
        Ok(DatabaseEngine::Sqlite)
    } else if normalized.starts_with("postgres://") || normalized.starts_with("postgresql://") {
        Ok(DatabaseEngine::Postgres)
    } else {
        Err(sqlx::Error::Configuration(
            format!("unsupported database URL scheme in '{}'", database_url).into(),
        ))
    }
}

pub fn active_database_engine() -> DatabaseEngine {
    *ACTIVE_DB_ENGINE.get().unwrap_or(&DatabaseEngine::Sqlite)
}

/// `sqlx::Any` wants absolute Windows paths as `sqlite:///C:/...`; configs
/// usually carry `sqlite://C:/...`.
fn normalize_sqlite_url_for_any(url: &str) -> String {
    let Some(path) = url.strip_prefix("sqlite://") else {
        return url.to_string();
    };
    let mut chars = path.chars();
    let has_drive_letter = matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    );
    if has_drive_letter {
        format!("sqlite:///{path}")
    } else {
        url.to_string()
    }
}

const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Millisecond precision keeps lexical order equal to chronological order.
pub(crate) fn datetime_to_db_text(value: chrono::DateTime<chrono::Utc>) -> String {
    value.format(DB_DATETIME_FORMAT).to_string()
}

/// Accepts what this crate writes, RFC 3339, and second-precision text from
/// column defaults.
pub(crate) fn datetime_from_db_text(
    value: &str,
) -> Result<chrono::DateTime<chrono::Utc>, sqlx::Error> {
    use chrono::{DateTime, NaiveDateTime, Utc};

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| sqlx::Error::Decode(format!("unparseable stored timestamp {value:?}").into()))
}

/// Flags are INTEGER columns; depending on engine and driver they decode as
/// bool or as one of the integer widths.
pub(crate) fn bool_from_any_row(
    row: &sqlx::any::AnyRow,
    column: &str,
) -> Result<bool, sqlx::Error> {
    use sqlx::Row;

    match row.try_get::<bool, _>(column) {
        Ok(flag) => Ok(flag),
        Err(bool_err) => row
            .try_get::<i64, _>(column)
            .or_else(|_| row.try_get::<i32, _>(column).map(i64::from))
            .map(|raw| raw != 0)
            .map_err(|_| bool_err),
    }
}
