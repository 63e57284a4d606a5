pub use crate::completion::{BridgeFuture, OperationState, Outcome};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, ExecutionError};
pub use crate::executor::PanicStrategy;
pub use crate::handle::{future_wait, runtime_create, runtime_create_with_config, runtime_destroy, RuntimeHandle};
pub use crate::marshal::{ErrorKind, ErrorPayload, Exception, ExceptionClass, ExceptionRegistry, FieldKind, FieldValue};
pub use crate::runtime::Runtime;
pub use crate::trace::{StackFrame, StackTrace};

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{Metrics, MetricsSnapshot};
