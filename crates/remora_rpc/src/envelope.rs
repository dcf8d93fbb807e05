//! Method envelopes and token submission.
//!
//! A token is a short numeric id pushed onto a resource's pending list; the
//! envelope it refers to lives in the token's detail record as JSON:
//!
//! ```json
//! {
//!   "token": "004217",
//!   "path": [{"destination": {"class": "calc", "name": "main"}, "method": "add", "args": [2, 3]}],
//!   "fire_and_forget": false,
//!   "origin": null,
//!   "abandoned": false
//! }
//! ```

use crate::error::{RpcError, RpcResult};
use rand::Rng;
use remora_resource::{RemoteError, Value};
use remora_store::{Connection, ResourceIdentity};
use serde::{Deserialize, Serialize};

/// Reserved token telling a dispatcher to stop.
pub const EXIT: &str = "EXIT";

/// Number of digits in a token id.
pub const TOKEN_WIDTH: usize = 6;

const TOKEN_SPACE: u32 = 1_000_000;

/// One step of a call path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    /// Resource executing this step.
    pub destination: ResourceIdentity,
    /// Remote method to call.
    pub method: String,
    /// Arguments; a forwarded result is appended before execution.
    pub args: Vec<Value>,
}

impl Hop {
    /// A step calling `method` on `destination`.
    pub fn new(destination: ResourceIdentity, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            destination,
            method: method.into(),
            args,
        }
    }
}

/// The token a caller waits on, carried along forwarded hops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Resource whose result slot receives the final result.
    pub resource: ResourceIdentity,
    /// Token id at that resource.
    pub token: String,
}

impl Origin {
    /// Returns `true` if this is `token` at `resource`.
    #[must_use]
    pub fn is(&self, resource: &ResourceIdentity, token: &str) -> bool {
        self.resource == *resource && self.token == token
    }
}

/// The detail record of a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Token id, assigned on submission.
    pub token: String,
    /// Remaining steps; the head is executed next.
    pub path: Vec<Hop>,
    /// The caller never consumes a result.
    #[serde(default)]
    pub fire_and_forget: bool,
    /// Set on forwarded tokens; `None` means the token is its own origin.
    #[serde(default)]
    pub origin: Option<Origin>,
    /// The caller stopped waiting.
    #[serde(default)]
    pub abandoned: bool,
}

impl Envelope {
    /// Envelope for a single call.
    #[must_use]
    pub fn call(destination: ResourceIdentity, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self::with_path(vec![Hop::new(destination, method, args)])
    }

    /// Envelope for a multi-hop call.
    #[must_use]
    pub fn with_path(path: Vec<Hop>) -> Self {
        Self {
            token: String::new(),
            path,
            fire_and_forget: false,
            origin: None,
            abandoned: false,
        }
    }

    /// Marks the envelope fire-and-forget.
    #[must_use]
    pub fn fire_and_forget(mut self) -> Self {
        self.fire_and_forget = true;
        self
    }

    /// The step executed next.
    #[must_use]
    pub fn head(&self) -> Option<&Hop> {
        self.path.first()
    }

    /// Parses a detail record.
    ///
    /// # Errors
    ///
    /// Returns a serialization error on malformed JSON.
    pub fn decode(raw: &str) -> RpcResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encodes the detail record.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if an argument cannot be encoded.
    pub fn encode(&self) -> RpcResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A random fixed-width token id.
#[must_use]
pub fn generate_token_id() -> String {
    let id = rand::rng().random_range(0..TOKEN_SPACE);
    format!("{id:0width$}", width = TOKEN_WIDTH)
}

/// Submits `envelope` to the head hop's destination and returns its token.
///
/// The id is claimed with set-if-absent on the detail record, retrying on
/// collision, before it is pushed onto the pending list.
///
/// # Errors
///
/// Returns [`RpcError::InvalidPath`] for an empty path, or a store or
/// serialization error.
pub fn submit(conn: &mut dyn Connection, envelope: &mut Envelope) -> RpcResult<String> {
    let pending = reserve(conn, envelope)?;
    conn.rpush(&pending, &envelope.token)?;
    tracing::debug!(token = %envelope.token, queue = %pending, "token submitted");
    Ok(envelope.token.clone())
}

/// Claims a fresh token id for `envelope` and writes its detail record.
///
/// Returns the pending list of the head hop's destination. The token is not
/// queued until the caller pushes it there.
pub(crate) fn reserve(conn: &mut dyn Connection, envelope: &mut Envelope) -> RpcResult<String> {
    let destination = match envelope.head() {
        Some(head) => head.destination.clone(),
        None => return Err(RpcError::InvalidPath("no hops to execute".into())),
    };
    let keys = destination.keys();

    loop {
        envelope.token = generate_token_id();
        let record = envelope.encode()?;
        if conn.set_nx(&keys.token(&envelope.token), &record)? {
            return Ok(keys.pending());
        }
        tracing::debug!(resource = %destination, token = %envelope.token, "token id collision");
    }
}

/// Encodes the outcome of a call for the result slot.
pub(crate) fn encode_outcome(outcome: &Result<Value, RemoteError>) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|err| {
        let fallback: Result<Value, RemoteError> = Err(RemoteError::from_error(&err));
        serde_json::to_string(&fallback).unwrap_or_default()
    })
}

/// Decodes a result slot entry.
pub(crate) fn decode_outcome(raw: &str) -> RpcResult<Result<Value, RemoteError>> {
    Ok(serde_json::from_str(raw)?)
}
