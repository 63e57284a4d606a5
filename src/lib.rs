//! VEDA bridge - completing caller-side futures from background workers
//!
//! A background runtime runs submitted operations on its own worker threads
//! and completes one future per operation. Failures come back as typed
//! exceptions whose stack trace joins the failure site to the call site.
//!
//! # Quick Start
//!
//! ```no_run
//! use veda_bridge::prelude::*;
//!
//! let runtime = Runtime::new(Config::default()).unwrap();
//!
//! let future = runtime.submit(|| Ok(21 * 2)).unwrap();
//! assert_eq!(future.wait().unwrap(), 42);
//!
//! let future = runtime
//!     .submit(|| -> Result<i32, ErrorPayload> { Err(ErrorPayload::invalid_argument("odd input")) })
//!     .unwrap();
//! let err = future.wait().unwrap_err();
//! assert!(err.cause().is_instance_of("IllegalArgumentException"));
//! print!("{}", err.cause().stack_trace_string());
//!
//! runtime.destroy();
//! ```
//!
//! # Features
//!
//! - **Work Stealing**: workers pull from a shared injector and steal from each other
//! - **Write-once Completion**: blocking and async waits on the same outcome
//! - **Exception Registry**: custom types resolved by name, loaded lazily, with a generic fallback
//! - **Spliced Traces**: failure-site frames, a boundary marker, then call-site frames
//! - **Telemetry**: operation counters and latency histogram (optional)

#![warn(missing_debug_implementations)]

pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod marshal;
pub mod prelude;
pub mod runtime;
pub mod telemetry;
pub mod testing;
pub mod trace;

pub use completion::{BridgeFuture, OperationState, Outcome};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, ExecutionError, Result};
pub use handle::{future_wait, runtime_create, runtime_create_with_config, runtime_destroy, submit, RuntimeHandle};
pub use marshal::{ErrorKind, ErrorPayload, Exception, ExceptionClass, ExceptionRegistry};
pub use runtime::Runtime;
pub use trace::{StackFrame, StackTrace};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_handle() {
        let handle = runtime_create_with_config(Config::builder().num_threads(2).build().unwrap()).unwrap();

        let future = submit(handle, || Ok(vec![1, 2, 3])).unwrap();
        assert_eq!(future_wait(&future).unwrap(), vec![1, 2, 3]);

        runtime_destroy(handle);
    }

    #[test]
    fn test_private_registry() {
        let registry = std::sync::Arc::new(ExceptionRegistry::with_builtins());
        registry.register(ExceptionClass::new("QuotaExceeded"));

        let runtime = Runtime::with_registry(Config::builder().num_threads(1).build().unwrap(), registry).unwrap();
        let err = runtime
            .submit(|| -> std::result::Result<(), _> {
                Err(ErrorPayload::new(ErrorKind::Internal, "over limit").with_type("QuotaExceeded"))
            })
            .unwrap()
            .wait()
            .unwrap_err();

        assert_eq!(err.cause().class_name(), "QuotaExceeded");
        runtime.destroy();
    }
}
