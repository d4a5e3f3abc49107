mod migrations;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, OpenFlags};

use crate::error::{AppError, AppResult};

pub type DbPool = Pool<SqliteConnectionManager>;

const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
                       PRAGMA foreign_keys = ON;
                       PRAGMA busy_timeout = 5000;";

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

pub fn create_pool(sqlite_path: &str, max_size: u32, checkout_timeout: Duration) -> anyhow::Result<DbPool> {
    if let Some(parent) = Path::new(sqlite_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(sqlite_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(|conn| conn.execute_batch(PRAGMAS));

    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(checkout_timeout)
        .build(manager)
        .context("Failed to create database pool")?;

    let conn = pool.get().context("Failed to get connection for migrations")?;
    migrations::run(&conn).context("Failed to run migrations")?;

    Ok(pool)
}

/// Runs one unit of store work on a pooled connection.
///
/// The closure executes on the blocking thread pool and must finish within
/// `limit`. The deadline is enforced inside the unit of work: checkout and
/// lock waits are bounded by the time left, and a commit attempted after the
/// deadline is rolled back by SQLite. [`AppError::Timeout`] therefore means
/// nothing was committed.
pub async fn call<F, T>(pool: &DbPool, limit: Duration, work: F) -> AppResult<T>
where
    F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    let deadline = Instant::now() + limit;

    tokio::task::spawn_blocking(move || run_until(&pool, deadline, work))
        .await
        .map_err(|join_err| AppError::Internal(format!("Store task failed: {join_err}")))?
}

fn run_until<F, T>(pool: &DbPool, deadline: Instant, work: F) -> AppResult<T>
where
    F: FnOnce(&mut Connection) -> AppResult<T>,
{
    let remaining = deadline.saturating_duration_since(Instant::now());
    let mut conn = pool.get_timeout(remaining).map_err(|e| {
        if Instant::now() >= deadline {
            AppError::Timeout
        } else {
            AppError::Pool(e)
        }
    })?;
    conn.busy_timeout(remaining)?;

    let committed = Arc::new(AtomicBool::new(false));
    let committed_flag = Arc::clone(&committed);
    // Returning true turns the commit into a rollback.
    conn.commit_hook(Some(move || {
        if Instant::now() >= deadline {
            return true;
        }
        committed_flag.store(true, Ordering::SeqCst);
        false
    }));

    let result = work(&mut conn);

    conn.commit_hook(None::<fn() -> bool>);
    if let Err(e) = conn.busy_timeout(BUSY_TIMEOUT) {
        tracing::warn!("Failed to reset busy timeout on pooled connection: {e}");
    }

    if committed.load(Ordering::SeqCst) {
        return result;
    }
    let expired = Instant::now() >= deadline;
    match result {
        Ok(_) if expired => Err(AppError::Timeout),
        Err(e) if expired || is_busy(&e) => {
            tracing::debug!("Store work ran past its deadline: {e}");
            Err(AppError::Timeout)
        }
        other => other,
    }
}

fn is_busy(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Database(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Current time in the format stored in every `*_at` column.
pub fn now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
pub fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory database");
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .expect("enable foreign keys");
    migrations::run(&conn).expect("run migrations");
    conn
}

/// Single-connection pool over an in-memory database. One connection keeps
/// every checkout on the same database.
#[cfg(test)]
pub fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("build test pool");
    migrations::run(&pool.get().expect("checkout")).expect("run migrations");
    pool
}
