//! Optimistic transactions: watch, read, conditionally write, retry.

use crate::connection::{Connection, WriteOp};
use crate::error::StoreResult;

/// Outcome of one pass of a transaction body.
#[derive(Debug)]
pub enum Transaction<T> {
    /// Apply `ops` atomically, then return the value.
    Commit(Vec<WriteOp>, T),
    /// Write nothing and return the value.
    Abort(T),
}

impl<T> Transaction<T> {
    /// Commits `ops`, or aborts with `value` when there is nothing to write.
    pub fn commit_if_any(ops: Vec<WriteOp>, value: T) -> Self {
        if ops.is_empty() {
            Self::Abort(value)
        } else {
            Self::Commit(ops, value)
        }
    }
}

/// Runs `body` under `WATCH keys` until its writes commit.
///
/// The body reads whatever it needs through the connection and decides what
/// to write. If a watched key changes before the writes are applied, the
/// whole read-decide-write pass is retried against the new values.
///
/// # Errors
///
/// Any store error from the body or the commit ends the loop immediately.
pub fn transaction<T>(
    conn: &mut dyn Connection,
    keys: &[String],
    mut body: impl FnMut(&mut dyn Connection) -> StoreResult<Transaction<T>>,
) -> StoreResult<T> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        conn.watch(keys)?;

        let outcome = match body(conn) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Leave the connection clean for its next user.
                let _ = conn.unwatch();
                return Err(err);
            }
        };

        match outcome {
            Transaction::Abort(value) => {
                conn.unwatch()?;
                return Ok(value);
            }
            Transaction::Commit(ops, value) => {
                if conn.exec(&ops)? {
                    return Ok(value);
                }
                tracing::debug!(attempt, ?keys, "transaction conflict, retrying");
            }
        }
    }
}
