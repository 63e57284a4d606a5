//! Numeric runtime handles for callers that cannot hold a [`Runtime`] value.
//!
//! A process-wide table maps live handles to their runtimes. Handle `0` is
//! never issued and stands for "no runtime".

use crate::completion::BridgeFuture;
use crate::config::Config;
use crate::error::{Error, ExecutionError, Result};
use crate::marshal::ErrorPayload;
use crate::runtime::Runtime;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

pub(crate) const MODULE: &str = module_path!();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RuntimeHandle(u64);

impl RuntimeHandle {
    pub const NULL: RuntimeHandle = RuntimeHandle(0);

    pub fn from_raw(raw: u64) -> Self {
        RuntimeHandle(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);
static RUNTIMES: OnceLock<RwLock<HashMap<u64, Arc<Runtime>>>> = OnceLock::new();

fn runtimes() -> &'static RwLock<HashMap<u64, Arc<Runtime>>> {
    RUNTIMES.get_or_init(|| RwLock::new(HashMap::new()))
}

fn lookup(handle: RuntimeHandle) -> Result<Arc<Runtime>> {
    if handle.is_null() {
        return Err(Error::NullHandle);
    }
    runtimes()
        .read()
        .get(&handle.0)
        .cloned()
        .ok_or_else(|| Error::scheduling(format!("{} is not live", handle)))
}

pub fn runtime_create() -> Result<RuntimeHandle> {
    runtime_create_with_config(Config::default())
}

pub fn runtime_create_with_config(config: Config) -> Result<RuntimeHandle> {
    let runtime = Runtime::new(config)?;
    let handle = RuntimeHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
    runtimes().write().insert(handle.0, Arc::new(runtime));
    tracing::debug!(%handle, "runtime handle issued");
    Ok(handle)
}

/// Destroy the runtime behind `handle`, waiting for its queued operations.
///
/// # Panics
///
/// If `handle` is null or not live (including a second destroy of the same
/// handle), or if called from one of the runtime's own worker threads.
pub fn runtime_destroy(handle: RuntimeHandle) {
    if handle.is_null() {
        panic!("runtime_destroy called with the null handle");
    }

    let runtime = {
        let mut table = runtimes().write();
        if table.get(&handle.0).map_or(false, |rt| rt.is_worker_thread()) {
            panic!("{} destroyed from one of its own worker threads", handle);
        }
        table.remove(&handle.0)
    };

    match runtime {
        Some(runtime) => {
            runtime.shutdown();
            tracing::debug!(%handle, "runtime handle released");
        }
        None => panic!("runtime_destroy called with {} which is not live", handle),
    }
}

/// Queue `op` on the runtime behind `handle`.
pub fn submit<F, T>(handle: RuntimeHandle, op: F) -> Result<BridgeFuture<T>>
where
    F: FnOnce() -> std::result::Result<T, ErrorPayload> + Send + 'static,
    T: Send + 'static,
{
    lookup(handle)?.submit(op)
}

/// Run `f` against the live runtime behind `handle`.
pub fn with_runtime<R>(handle: RuntimeHandle, f: impl FnOnce(&Runtime) -> R) -> Result<R> {
    let runtime = lookup(handle)?;
    Ok(f(&runtime))
}

pub fn is_live(handle: RuntimeHandle) -> bool {
    !handle.is_null() && runtimes().read().contains_key(&handle.0)
}

/// Number of handles issued and not yet destroyed.
pub fn live_runtimes() -> usize {
    runtimes().read().len()
}

/// Block until `future` completes.
pub fn future_wait<T: Clone>(future: &BridgeFuture<T>) -> std::result::Result<T, ExecutionError> {
    future.wait()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> RuntimeHandle {
        runtime_create_with_config(Config::builder().num_threads(1).build().unwrap()).unwrap()
    }

    #[test]
    fn test_handles_are_distinct() {
        let a = small();
        let b = small();
        assert_ne!(a, b);
        assert!(!a.is_null());
        assert!(is_live(a) && is_live(b));

        runtime_destroy(a);
        assert!(!is_live(a));
        assert!(is_live(b));
        runtime_destroy(b);
    }

    #[test]
    fn test_submit_through_handle() {
        let handle = small();
        let future = submit(handle, || Ok("done".to_string())).unwrap();
        assert_eq!(future_wait(&future).unwrap(), "done");
        runtime_destroy(handle);
    }

    #[test]
    fn test_null_handle_is_rejected() {
        let result = submit(RuntimeHandle::NULL, || Ok(()));
        assert!(matches!(result, Err(Error::NullHandle)));
        assert!(!is_live(RuntimeHandle::NULL));
    }

    #[test]
    fn test_destroyed_handle_cannot_schedule() {
        let handle = small();
        runtime_destroy(handle);

        let result = submit(handle, || Ok(()));
        assert!(matches!(result, Err(Error::Scheduling(_))));
        assert!(with_runtime(handle, |rt| rt.num_threads()).is_err());
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn test_double_destroy_panics() {
        let handle = small();
        runtime_destroy(handle);
        runtime_destroy(handle);
    }

    #[test]
    #[should_panic(expected = "null handle")]
    fn test_destroy_null_panics() {
        runtime_destroy(RuntimeHandle::NULL);
    }

    #[test]
    fn test_destroy_from_worker_fails_the_operation() {
        let handle = small();
        let future = submit(handle, move || {
            runtime_destroy(handle);
            Ok(())
        })
        .unwrap();

        let err = future.wait().unwrap_err();
        assert!(err.cause().message().contains("own worker threads"));
        assert!(is_live(handle));
        runtime_destroy(handle);
    }
}
