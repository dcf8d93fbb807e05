//! Caller side of a token: consuming results and abandoning tokens.

use crate::envelope::{Envelope, decode_outcome};
use crate::error::RpcResult;
use remora_resource::{RemoteError, Value};
use remora_store::{Connection, ResourceIdentity, Transaction, WriteOp, transaction};
use std::time::Duration;

/// Where an abandoned token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Still queued; removed before any dispatcher saw it.
    Pending,
    /// Claimed by a dispatcher; the detail record is marked abandoned and
    /// the dispatcher discards the result.
    InProgress,
    /// A result was waiting; it was discarded.
    Ready,
    /// Nothing left to clean up.
    Gone,
}

/// Blocks on the result slot of `token` at `origin`.
///
/// Returns `None` on timeout, leaving the token untouched. Once a result is
/// read, the detail record is deleted.
pub(crate) fn consume(
    conn: &mut dyn Connection,
    origin: &ResourceIdentity,
    token: &str,
    timeout: Duration,
) -> RpcResult<Option<Result<Value, RemoteError>>> {
    let keys = origin.keys();
    let Some(raw) = conn.blpop(&keys.result(token), timeout)? else {
        return Ok(None);
    };
    conn.del(&keys.token(token))?;
    tracing::debug!(resource = %origin, token, "result consumed");
    Ok(Some(
        decode_outcome(&raw)?.map_err(RemoteError::with_local_frames),
    ))
}

/// Gives up on `token` at `origin`, cleaning up whatever phase it is in.
pub(crate) fn abandon(
    conn: &mut dyn Connection,
    origin: &ResourceIdentity,
    token: &str,
) -> RpcResult<Phase> {
    let keys = origin.keys();
    let (pending, detail, result) = (keys.pending(), keys.token(token), keys.result(token));
    let watched = [pending.clone(), detail.clone(), result.clone()];

    let phase = transaction(conn, &watched, |conn| {
        if conn.lrange(&pending)?.iter().any(|queued| queued == token) {
            return Ok(Transaction::Commit(
                vec![WriteOp::lrem(&pending, token), WriteOp::del(&detail)],
                Phase::Pending,
            ));
        }
        if conn.exists(&result)? {
            return Ok(Transaction::Commit(
                vec![WriteOp::del(&result), WriteOp::del(&detail)],
                Phase::Ready,
            ));
        }
        let Some(raw) = conn.get(&detail)? else {
            return Ok(Transaction::Abort(Phase::Gone));
        };
        let marked = Envelope::decode(&raw).ok().and_then(|mut envelope| {
            envelope.abandoned = true;
            envelope.encode().ok()
        });
        let op = match marked {
            Some(record) => WriteOp::set(&detail, record),
            None => WriteOp::del(&detail),
        };
        Ok(Transaction::Commit(vec![op], Phase::InProgress))
    })?;

    tracing::debug!(resource = %origin, token, ?phase, "token abandoned");
    Ok(phase)
}
