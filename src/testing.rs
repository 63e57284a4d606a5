//! Fixed operations for exercising the bridge end to end.

use crate::completion::BridgeFuture;
use crate::error::Result;
use crate::handle::{self, RuntimeHandle};
use crate::marshal::{builtin, ErrorKind, ErrorPayload, ExceptionClass, ExceptionRegistry, FieldKind};

/// A custom exception type that is only loaded the first time it is thrown.
pub const TESTING_EXCEPTION: &str = "veda_bridge.testing.TestingException";

/// Register the testing exception types with `registry`, deferred.
///
/// Nothing registers them up front; [`future_throws_custom_error_type`]
/// installs them into its runtime's registry the first time it runs.
pub fn install(registry: &ExceptionRegistry) {
    if registry.is_registered(TESTING_EXCEPTION) {
        return;
    }
    registry.register_deferred(TESTING_EXCEPTION, |registry| {
        let base = registry.resolve(builtin::RUNTIME_EXCEPTION)?;
        Some(
            ExceptionClass::new(TESTING_EXCEPTION)
                .extends(base)
                .with_field("code", FieldKind::Int),
        )
    });
}

/// Resolves to `input * 2`.
pub fn future_success(handle: RuntimeHandle, input: i32) -> Result<BridgeFuture<i32>> {
    handle::submit(handle, move || {
        input.checked_mul(2).ok_or_else(|| {
            ErrorPayload::new(ErrorKind::IntegerOverflow, format!("{} * 2 overflows i32", input))
        })
    })
}

/// Always fails with an invalid-argument error naming `input`.
pub fn future_failure(handle: RuntimeHandle, input: i32) -> Result<BridgeFuture<i32>> {
    handle::submit(handle, move || {
        Err(ErrorPayload::invalid_argument(format!("failing on {}", input)).with_field("input", input))
    })
}

/// Always fails with [`TESTING_EXCEPTION`].
pub fn future_throws_custom_error_type(handle: RuntimeHandle) -> Result<BridgeFuture<()>> {
    handle::with_runtime(handle, |runtime| install(runtime.registry()))?;
    handle::submit(handle, || {
        Err(ErrorPayload::new(ErrorKind::Internal, "thrown from a background thread")
            .with_type(TESTING_EXCEPTION)
            .with_field("code", 7))
    })
}
