//! In-process message values.
//!
//! The crate operates on already-deserialized messages: an opaque byte
//! payload plus a string header map that the propagation codec reads and
//! writes. No wire format is owned here.

use std::collections::HashMap;

/// A message flowing through a pipeline: payload bytes plus headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    payload: Vec<u8>,
    headers: HashMap<String, String>,
}

impl Message {
    /// Creates a message with the given payload and no headers.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            headers: HashMap::new(),
        }
    }

    /// Adds a header, builder style.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Looks up a single header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// All headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Mutable access to the headers, used by the propagation codec.
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.headers
    }
}

/// What a function invocation produced.
///
/// Functions may return a full [`Message`] or just a raw payload; the
/// invocation tracer normalizes the latter into a message with an empty
/// header set before wrapping it for sending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FunctionOutput {
    /// An already-formed message, used as-is.
    Message(Message),
    /// A bare payload, wrapped into a new message with no headers.
    Payload(Vec<u8>),
}

impl FunctionOutput {
    /// Normalizes into a [`Message`].
    pub fn into_message(self) -> Message {
        match self {
            FunctionOutput::Message(message) => message,
            FunctionOutput::Payload(payload) => Message::new(payload),
        }
    }
}

impl From<Message> for FunctionOutput {
    fn from(message: Message) -> Self {
        FunctionOutput::Message(message)
    }
}

impl From<Vec<u8>> for FunctionOutput {
    fn from(payload: Vec<u8>) -> Self {
        FunctionOutput::Payload(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let msg = Message::new(b"hello".to_vec())
            .with_header("traceparent", "00-abc-def-01")
            .with_header("content-type", "text/plain");

        assert_eq!(msg.payload(), b"hello");
        assert_eq!(msg.header("traceparent"), Some("00-abc-def-01"));
        assert_eq!(msg.header("missing"), None);
        assert_eq!(msg.headers().len(), 2);
    }

    #[test]
    fn headers_mut_allows_removal() {
        let mut msg = Message::new(b"x".to_vec()).with_header("traceparent", "v");
        msg.headers_mut().remove("traceparent");
        assert!(msg.headers().is_empty());
    }

    #[test]
    fn payload_output_normalizes_to_headerless_message() {
        let out = FunctionOutput::Payload(b"raw".to_vec());
        let msg = out.into_message();
        assert_eq!(msg.payload(), b"raw");
        assert!(msg.headers().is_empty());
    }

    #[test]
    fn message_output_is_used_as_is() {
        let original = Message::new(b"m".to_vec()).with_header("k", "v");
        let out = FunctionOutput::from(original.clone());
        assert_eq!(out.into_message(), original);
    }
}
