//! Error types for the declaration layer and for errors crossing a process
//! boundary.

use crate::descriptor::Arity;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use thiserror::Error;

/// Marker inserted between local and remote frames of a merged trace.
pub const REMOTE_HOP_MARKER: &str = "---- remote call ----";

/// Well-known [`RemoteError::kind`] tags produced by the protocol itself.
pub mod kinds {
    /// Wrong number of arguments for the called method.
    pub const ARGUMENT_COUNT: &str = "ArgumentCountError";
    /// An argument could not be decoded into the parameter type.
    pub const ARGUMENT_TYPE: &str = "ArgumentTypeError";
    /// The method is not in the resource's remote method set.
    pub const UNDEFINED_METHOD: &str = "UndefinedMethodError";
    /// The method panicked.
    pub const PANIC: &str = "Panic";
    /// A return value could not be serialized.
    pub const SERIALIZATION: &str = "SerializationError";
}

/// An error value that travels from a resource back to its caller.
///
/// Carries the original error's type tag, message and, best effort, the
/// stack frames on each side of the call. `payload` holds the serialized
/// error for types implementing [`RemoteException`], which lets the caller
/// [`reconstruct`](Self::reconstruct) the original value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Type tag of the original error.
    pub kind: String,
    /// Human-readable message of the original error.
    pub message: String,
    /// Stack frames, remote side first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
    /// Serialized original error, when its type supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl RemoteError {
    /// Creates an error with the given type tag and message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            frames: Vec::new(),
            payload: None,
        }
    }

    /// Wrong argument count for `method`.
    #[must_use]
    pub fn argument_count(method: &str, expected: Arity, given: usize) -> Self {
        Self::new(
            kinds::ARGUMENT_COUNT,
            format!("wrong number of arguments for '{method}' (given {given}, expected {expected})"),
        )
    }

    /// Argument at `position` of `method` failed to decode.
    #[must_use]
    pub fn argument_type(method: &str, position: usize, err: &serde_json::Error) -> Self {
        Self::new(
            kinds::ARGUMENT_TYPE,
            format!("argument {position} of '{method}': {err}"),
        )
    }

    /// `method` is not a remote method of `class`.
    #[must_use]
    pub fn undefined_method(class: &str, method: &str) -> Self {
        Self::new(
            kinds::UNDEFINED_METHOD,
            format!("undefined remote method '{method}' for {class}"),
        )
    }

    /// Converts a caught panic payload.
    #[must_use]
    pub fn panic(payload: &(dyn core::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "remote method panicked".to_string());
        Self::new(kinds::PANIC, message)
    }

    /// Wraps any error, tagging it with its short type name.
    pub fn from_error<E: std::error::Error + 'static>(err: &E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }

    /// Wraps a typed error so the caller can reconstruct it.
    pub fn exception<E: RemoteException>(err: &E) -> Self {
        Self {
            kind: E::KIND.to_string(),
            message: err.to_string(),
            frames: Vec::new(),
            payload: serde_json::to_value(err).ok(),
        }
    }

    /// Returns `true` if the original error had type tag `kind`.
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Rebuilds the original typed error, if this carrier holds one.
    ///
    /// Returns `None` when the tag does not match `E` or the payload is
    /// missing; the generic carrier still has the original message then.
    #[must_use]
    pub fn reconstruct<E: RemoteException>(&self) -> Option<E> {
        if self.kind != E::KIND {
            return None;
        }
        let payload = self.payload.clone()?;
        serde_json::from_value(payload).ok()
    }

    /// Records the current thread's frames, if backtraces are enabled.
    #[must_use]
    pub fn with_captured_frames(mut self) -> Self {
        if self.frames.is_empty() {
            self.frames = capture_frames();
        }
        self
    }

    /// Appends the caller-side frames after a remote hop marker.
    ///
    /// Called once the error has crossed back to the calling process.
    #[must_use]
    pub fn with_local_frames(mut self) -> Self {
        let local = capture_frames();
        if !local.is_empty() {
            self.frames.push(REMOTE_HOP_MARKER.to_string());
            self.frames.extend(local);
        }
        self
    }
}

fn capture_frames() -> Vec<String> {
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    backtrace
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = core::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// An error type that can be rebuilt on the calling side.
///
/// ```
/// use remora_resource::{RemoteError, RemoteException};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq, thiserror::Error)]
/// #[error("insufficient funds: {balance}")]
/// struct InsufficientFunds {
///     balance: u64,
/// }
///
/// impl RemoteException for InsufficientFunds {
///     const KIND: &'static str = "InsufficientFunds";
/// }
///
/// let carrier = RemoteError::exception(&InsufficientFunds { balance: 3 });
/// assert_eq!(
///     carrier.reconstruct::<InsufficientFunds>(),
///     Some(InsufficientFunds { balance: 3 })
/// );
/// ```
pub trait RemoteException: Serialize + DeserializeOwned + core::fmt::Display {
    /// Stable type tag written to [`RemoteError::kind`].
    const KIND: &'static str;
}

/// Conversion used by generated code for the `Err` side of remote methods.
pub trait IntoRemoteError {
    /// Converts `self` into the cross-process carrier.
    fn into_remote_error(self) -> RemoteError;
}

impl<E: std::error::Error + 'static> IntoRemoteError for E {
    fn into_remote_error(self) -> RemoteError {
        let any: &dyn core::any::Any = &self;
        if let Some(remote) = any.downcast_ref::<RemoteError>() {
            return remote.clone();
        }
        RemoteError::from_error(&self)
    }
}

/// Errors raised while declaring resources or resolving their names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The name attribute holds no value.
    #[error("Missing name: resource '{class}' has no value for name attribute '{attribute}'")]
    MissingName {
        /// Logical class.
        class: String,
        /// Declared name attribute.
        attribute: String,
    },

    /// Resolving the name attribute re-entered name resolution.
    #[error(
        "Circular name resolution: resource '{class}' needs its name to read name attribute '{attribute}'"
    )]
    CircularName {
        /// Logical class.
        class: String,
        /// Declared name attribute.
        attribute: String,
    },

    /// The declaration is inconsistent.
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),
}

impl ResourceError {
    /// Creates a [`MissingName`](Self::MissingName).
    pub fn missing_name(class: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingName {
            class: class.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a [`CircularName`](Self::CircularName).
    pub fn circular_name(class: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::CircularName {
            class: class.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an [`InvalidDeclaration`](Self::InvalidDeclaration).
    pub fn invalid_declaration(msg: impl Into<String>) -> Self {
        Self::InvalidDeclaration(msg.into())
    }
}
