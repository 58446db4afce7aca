//! Per-thread connection management.
//!
//! Each thread lazily opens its own connection, keyed by (store instance,
//! store generation); connections close with the thread, or earlier when the
//! owning store is dropped or its generation bumps. The store itself holds
//! no shared connection, which is what allows the summariser pool to write
//! in parallel. Bumping the generation (after a shadow swap replaces the
//! file under the same path) makes every thread reopen.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// A fresh id per opened store, so two stores over the same path never share
/// a cached connection.
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

thread_local! {
    static CONNECTIONS: RefCell<HashMap<(u64, u64), Rc<Connection>>> =
        RefCell::new(HashMap::new());
}

/// Run `f` against this thread's connection for (instance, generation),
/// opening and configuring one on first use. Stale generations of the same
/// instance are dropped on the way in, which closes them (and checkpoints
/// their WAL) for this thread.
pub(crate) fn with_thread_connection<T>(
    instance_id: u64,
    generation: u64,
    path: &Path,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let conn = CONNECTIONS.with(|cell| -> Result<Rc<Connection>> {
        let mut map = cell.borrow_mut();
        map.retain(|(instance, gen), _| *instance != instance_id || *gen >= generation);

        let key = (instance_id, generation);
        if let Some(conn) = map.get(&key) {
            return Ok(conn.clone());
        }
        let conn = Rc::new(open_configured(path)?);
        map.insert(key, conn.clone());
        Ok(conn)
    })?;
    f(&conn)
}

/// Drop every cached connection this thread holds for `instance_id`. Called
/// from the store's `Drop` so single-threaded callers release the database
/// file promptly.
pub(crate) fn drop_thread_connections(instance_id: u64) {
    let _ = CONNECTIONS.try_with(|cell| {
        if let Ok(mut map) = cell.try_borrow_mut() {
            map.retain(|(instance, _), _| *instance != instance_id);
        }
    });
}

/// Open a connection with the store's standing pragmas: WAL journaling,
/// enforced foreign keys, 30s busy timeout.
pub(crate) fn open_configured(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

pub(crate) fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // journal_mode returns the resulting mode as a row; rusqlite is finicky
    // about row-returning pragmas, so query it explicitly.
    conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()))?;
    conn.execute_batch(
        "PRAGMA foreign_keys=ON;\n\
         PRAGMA synchronous=NORMAL;",
    )?;
    Ok(())
}

/// Run `f` inside an immediate transaction, committing on success and
/// rolling back on error.
pub(crate) fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT;")?;
            Ok(value)
        }
        Err(err) => {
            // The rollback itself is best-effort: the original error is the
            // one the caller needs.
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                tracing::error!(
                    target = "minerva.store",
                    error = %rollback_err,
                    "rollback failed after transaction error"
                );
            }
            Err(err)
        }
    }
}
