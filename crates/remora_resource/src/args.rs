//! Positional argument decoding for remote method calls.

use crate::descriptor::Arity;
use crate::error::{RemoteError, kinds};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Positional arguments of one remote call, decoded in order.
///
/// Generated `invoke` bodies pull each parameter with [`next_arg`](Self::next_arg),
/// a variadic tail with [`rest`](Self::rest), and end with
/// [`finish`](Self::finish) so surplus arguments are rejected even when
/// `invoke` is called without a prior arity check.
#[derive(Debug)]
pub struct Arguments<'a> {
    method: &'a str,
    values: std::vec::IntoIter<Value>,
    given: usize,
    position: usize,
}

impl<'a> Arguments<'a> {
    /// Wraps the raw arguments of a call to `method`.
    #[must_use]
    pub fn new(method: &'a str, values: Vec<Value>) -> Self {
        Self {
            method,
            given: values.len(),
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Decodes the next positional argument.
    ///
    /// # Errors
    ///
    /// Returns an argument-count error if none is left, or an argument-type
    /// error if it does not decode as `T`.
    pub fn next_arg<T: DeserializeOwned>(&mut self) -> Result<T, RemoteError> {
        let position = self.position;
        self.position += 1;
        let Some(value) = self.values.next() else {
            return Err(RemoteError::argument_count(
                self.method,
                Arity::Exact(self.position),
                self.given,
            ));
        };
        serde_json::from_value(value)
            .map_err(|err| RemoteError::argument_type(self.method, position, &err))
    }

    /// Decodes every remaining argument.
    ///
    /// # Errors
    ///
    /// Returns an argument-type error naming the first value that does not
    /// decode as `T`.
    pub fn rest<T: DeserializeOwned>(self) -> Result<Vec<T>, RemoteError> {
        let method = self.method;
        let start = self.position;
        self.values
            .enumerate()
            .map(|(offset, value)| {
                serde_json::from_value(value)
                    .map_err(|err| RemoteError::argument_type(method, start + offset, &err))
            })
            .collect()
    }

    /// Fails if arguments remain unconsumed.
    ///
    /// # Errors
    ///
    /// Returns an argument-count error.
    pub fn finish(self) -> Result<(), RemoteError> {
        if self.values.as_slice().is_empty() {
            Ok(())
        } else {
            Err(RemoteError::argument_count(
                self.method,
                Arity::Exact(self.position),
                self.given,
            ))
        }
    }
}

/// Serializes a method's return value.
///
/// # Errors
///
/// Returns a `SerializationError` carrier if `value` cannot be represented.
pub fn into_value<T: Serialize>(value: T) -> Result<Value, RemoteError> {
    serde_json::to_value(value)
        .map_err(|err| RemoteError::new(kinds::SERIALIZATION, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_in_order() {
        let mut args = Arguments::new("add", vec![json!(2), json!("x")]);
        assert_eq!(args.next_arg::<i64>().unwrap(), 2);
        assert_eq!(args.next_arg::<String>().unwrap(), "x");
        args.finish().unwrap();
    }

    #[test]
    fn missing_argument_is_a_count_error() {
        let mut args = Arguments::new("add", vec![json!(2)]);
        args.next_arg::<i64>().unwrap();
        let err = args.next_arg::<i64>().unwrap_err();
        assert!(err.is(kinds::ARGUMENT_COUNT));
        assert!(err.message.contains("given 1, expected 2"), "{}", err.message);
    }

    #[test]
    fn surplus_arguments_are_rejected() {
        let args = Arguments::new("reset", vec![json!(1)]);
        assert!(args.finish().unwrap_err().is(kinds::ARGUMENT_COUNT));
    }

    #[test]
    fn wrong_type_names_the_position() {
        let mut args = Arguments::new("add", vec![json!(1), json!("two")]);
        args.next_arg::<i64>().unwrap();
        let err = args.next_arg::<i64>().unwrap_err();
        assert!(err.is(kinds::ARGUMENT_TYPE));
        assert!(err.message.starts_with("argument 1 of 'add'"));
    }

    #[test]
    fn rest_collects_the_tail() {
        let mut args = Arguments::new("sum", vec![json!("label"), json!(1), json!(2)]);
        let _: String = args.next_arg().unwrap();
        assert_eq!(args.rest::<u8>().unwrap(), vec![1, 2]);

        let args = Arguments::new("sum", vec![json!(1), json!(null)]);
        let err = args.rest::<u8>().unwrap_err();
        assert!(err.message.starts_with("argument 1 of 'sum'"));
    }
}
