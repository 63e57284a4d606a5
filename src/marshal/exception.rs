use super::kind::ErrorKind;
use super::payload::{FieldKind, FieldValue, Fields};
use crate::trace::StackFrame;
use std::fmt;
use std::sync::Arc;

/// A constructor parameter an exception class requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructError {
    #[error("{class} requires field `{field}`")]
    MissingField { class: String, field: String },

    #[error("{class} field `{field}` expects {expected:?}, got {actual:?}")]
    FieldKindMismatch {
        class: String,
        field: String,
        expected: FieldKind,
        actual: FieldKind,
    },
}

/// Descriptor of an exception type known to a registry.
#[derive(Debug)]
pub struct ExceptionClass {
    name: String,
    superclass: Option<Arc<ExceptionClass>>,
    fields: Vec<FieldSpec>,
}

impl ExceptionClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: Arc<ExceptionClass>) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&Arc<ExceptionClass>> {
        self.superclass.as_ref()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// `true` if this class is `name` or inherits from it.
    pub fn is_subclass_of(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == name {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }

    /// Check `fields` against this class's constructor parameters.
    pub fn check_fields(&self, fields: &Fields) -> Result<(), ConstructError> {
        for spec in &self.fields {
            match fields.get(&spec.name) {
                None => {
                    return Err(ConstructError::MissingField {
                        class: self.name.clone(),
                        field: spec.name.clone(),
                    })
                }
                Some(value) if value.kind() != spec.kind => {
                    return Err(ConstructError::FieldKindMismatch {
                        class: self.name.clone(),
                        field: spec.name.clone(),
                        expected: spec.kind,
                        actual: value.kind(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// A marshalled failure, as delivered to the caller.
///
/// Cloning is cheap and clones share identity (see [`Exception::ptr_eq`]).
#[derive(Clone)]
pub struct Exception {
    inner: Arc<ExceptionInner>,
}

struct ExceptionInner {
    class: Arc<ExceptionClass>,
    kind: ErrorKind,
    message: String,
    fields: Fields,
    stack_trace: Vec<StackFrame>,
}

impl Exception {
    /// Instantiate `class`, failing if the fields don't fit its constructor.
    pub fn construct(
        class: Arc<ExceptionClass>,
        kind: ErrorKind,
        message: impl Into<String>,
        fields: Fields,
        stack_trace: Vec<StackFrame>,
    ) -> Result<Self, ConstructError> {
        class.check_fields(&fields)?;
        Ok(Self::from_parts(class, kind, message.into(), fields, stack_trace))
    }

    pub(crate) fn from_parts(
        class: Arc<ExceptionClass>,
        kind: ErrorKind,
        message: String,
        fields: Fields,
        stack_trace: Vec<StackFrame>,
    ) -> Self {
        Self {
            inner: Arc::new(ExceptionInner {
                class,
                kind,
                message,
                fields,
                stack_trace,
            }),
        }
    }

    pub fn class(&self) -> &Arc<ExceptionClass> {
        &self.inner.class
    }

    pub fn class_name(&self) -> &str {
        self.inner.class.name()
    }

    pub fn is_instance_of(&self, class_name: &str) -> bool {
        self.inner.class.is_subclass_of(class_name)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn fields(&self) -> &Fields {
        &self.inner.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.inner.fields.get(name)
    }

    pub fn stack_trace(&self) -> &[StackFrame] {
        &self.inner.stack_trace
    }

    pub fn ptr_eq(&self, other: &Exception) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Render as `Class: message` followed by one `\tat ...` line per frame.
    pub fn print_stack_trace<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "{}", self)?;
        for frame in &self.inner.stack_trace {
            writeln!(out, "\tat {}", frame)?;
        }
        Ok(())
    }

    pub fn stack_trace_string(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.print_stack_trace(&mut out);
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.message.is_empty() {
            f.write_str(self.class_name())
        } else {
            write!(f, "{}: {}", self.class_name(), self.inner.message)
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("class", &self.class_name())
            .field("kind", &self.inner.kind)
            .field("message", &self.inner.message)
            .field("fields", &self.inner.fields)
            .field("frames", &self.inner.stack_trace.len())
            .finish()
    }
}

impl std::error::Error for Exception {}
