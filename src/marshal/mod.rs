//! Turning native failure payloads into caller-side exceptions.

pub mod exception;
pub mod kind;
pub mod payload;
pub mod registry;

pub use exception::{ConstructError, Exception, ExceptionClass, FieldSpec};
pub use kind::{builtin, ErrorKind};
pub use payload::{ErrorPayload, FieldKind, FieldValue, Fields};
pub use registry::{ClassLoader, ExceptionRegistry};
