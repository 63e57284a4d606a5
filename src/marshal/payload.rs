use super::kind::ErrorKind;
use crate::trace::StackTrace;
use std::collections::BTreeMap;
use std::fmt;

pub(crate) const MODULE: &str = module_path!();

/// A typed constructor argument carried by an [`ErrorPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Bytes(_) => FieldKind::Bytes,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Bool,
    Bytes,
}

pub type Fields = BTreeMap<String, FieldValue>;

/// Failure descriptor produced on the native side.
///
/// Creating a payload records the worker's stack at that point; it becomes
/// the failure-side half of the exception's trace. Runtimes built with
/// `capture_failure_site(false)` skip that capture for payloads created by
/// their operations, leaving the failure side empty.
#[derive(Debug, Clone)]
pub struct ErrorPayload {
    kind: ErrorKind,
    message: String,
    type_id: Option<String>,
    fields: Fields,
    trace: StackTrace,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            type_id: None,
            fields: Fields::new(),
            trace: StackTrace::capture_failure_site(&[MODULE]),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Name the exact exception class the caller should receive.
    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Replace the captured failure-site trace, e.g. with frames reported by
    /// a native library that tracks its own stack.
    pub fn with_trace(mut self, trace: StackTrace) -> Self {
        self.trace = trace;
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn type_id(&self) -> Option<&str> {
        self.type_id.as_deref()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn trace(&self) -> &StackTrace {
        &self.trace
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_id {
            Some(type_id) => write!(f, "{} ({}): {}", self.kind, type_id, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::StackFrame;

    #[test]
    fn test_builder() {
        let payload = ErrorPayload::invalid_argument("bad key length")
            .with_type("KeyLengthException")
            .with_field("expected", 32)
            .with_field("actual", 31i64);

        assert_eq!(payload.kind(), &ErrorKind::InvalidArgument);
        assert_eq!(payload.type_id(), Some("KeyLengthException"));
        assert_eq!(payload.fields().get("expected"), Some(&FieldValue::Int(32)));
        assert_eq!(
            payload.to_string(),
            "InvalidArgument (KeyLengthException): bad key length"
        );
    }

    #[test]
    fn test_with_trace_replaces_capture() {
        let payload = ErrorPayload::invalid_state("closed")
            .with_trace(StackTrace::from_frames(vec![StackFrame::new("lib", "close")]));
        assert_eq!(payload.trace().frames()[0].method_name, "close");
    }

    #[test]
    fn test_field_value_accessors() {
        assert_eq!(FieldValue::from("x").as_str(), Some("x"));
        assert_eq!(FieldValue::from(7u32).as_int(), Some(7));
        assert_eq!(FieldValue::from(true).kind(), FieldKind::Bool);
        assert_eq!(FieldValue::from(vec![1, 2]).to_string(), "<2 bytes>");
    }
}
