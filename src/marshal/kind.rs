use std::fmt;

/// Category of a native failure.
///
/// Used to pick an exception class when a payload does not name one, and
/// carried on every exception so a fallback never loses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    NullHandle,
    IntegerOverflow,
    UnexpectedPanic,
    Unsupported,
    Internal,
    Other(String),
}

impl ErrorKind {
    /// Builtin class for this kind, if the fixed mapping has one.
    pub fn builtin_class(&self) -> Option<&'static str> {
        match self {
            ErrorKind::InvalidArgument => Some(builtin::ILLEGAL_ARGUMENT),
            ErrorKind::InvalidState => Some(builtin::ILLEGAL_STATE),
            ErrorKind::NullHandle => Some(builtin::NULL_POINTER),
            ErrorKind::UnexpectedPanic => Some(builtin::ASSERTION_ERROR),
            ErrorKind::Unsupported => Some(builtin::UNSUPPORTED_OPERATION),
            ErrorKind::IntegerOverflow => Some(builtin::RUNTIME_EXCEPTION),
            ErrorKind::Internal | ErrorKind::Other(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::NullHandle => "NullHandle",
            ErrorKind::IntegerOverflow => "IntegerOverflow",
            ErrorKind::UnexpectedPanic => "UnexpectedPanic",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Internal => "Internal",
            ErrorKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names of the classes every registry starts with.
pub mod builtin {
    pub const RUNTIME_EXCEPTION: &str = "RuntimeException";
    pub const ILLEGAL_ARGUMENT: &str = "IllegalArgumentException";
    pub const ILLEGAL_STATE: &str = "IllegalStateException";
    pub const NULL_POINTER: &str = "NullPointerException";
    pub const UNSUPPORTED_OPERATION: &str = "UnsupportedOperationException";
    pub const ASSERTION_ERROR: &str = "AssertionError";

    /// Used whenever a specific class cannot be produced.
    pub const GENERIC: &str = RUNTIME_EXCEPTION;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_mapping() {
        assert_eq!(ErrorKind::InvalidArgument.builtin_class(), Some("IllegalArgumentException"));
        assert_eq!(ErrorKind::UnexpectedPanic.builtin_class(), Some("AssertionError"));
        assert_eq!(ErrorKind::Internal.builtin_class(), None);
        assert_eq!(ErrorKind::Other("Tls".into()).builtin_class(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::NullHandle.to_string(), "NullHandle");
        assert_eq!(ErrorKind::Other("Tls".into()).to_string(), "Tls");
    }
}
