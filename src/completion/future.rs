use super::cell::CompletionCell;
use super::{OperationState, Outcome};
use crate::error::ExecutionError;
use crate::marshal::{ErrorPayload, Exception, ExceptionRegistry};
use crate::trace::StackTrace;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

/// Caller-side handle to one submitted operation.
///
/// Clones refer to the same operation. Every wait, from any clone or thread,
/// observes the same outcome; a failure is marshalled once and the same
/// exception is handed to every waiter.
pub struct BridgeFuture<T> {
    inner: Arc<FutureInner<T>>,
}

struct FutureInner<T> {
    cell: Arc<CompletionCell<T>>,
    call_site: StackTrace,
    registry: Arc<ExceptionRegistry>,
    exception: OnceLock<Exception>,
}

impl<T> Clone for BridgeFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> BridgeFuture<T> {
    pub(crate) fn new(
        cell: Arc<CompletionCell<T>>,
        call_site: StackTrace,
        registry: Arc<ExceptionRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(FutureInner {
                cell,
                call_site,
                registry,
                exception: OnceLock::new(),
            }),
        }
    }

    pub fn state(&self) -> OperationState {
        self.inner.cell.state()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.cell.is_complete()
    }

    /// The stack captured when the operation was submitted.
    pub fn call_site(&self) -> &StackTrace {
        &self.inner.call_site
    }

    // Marshalling may run registry loaders, which may wait on this very
    // future, so it happens outside any lock. Concurrent first failures can
    // both marshal; the first stored exception is the one everybody gets.
    fn failure(&self, payload: &ErrorPayload) -> ExecutionError {
        if let Some(exception) = self.inner.exception.get() {
            return ExecutionError::new(exception.clone());
        }

        let marshalled = self.inner.registry.marshal(payload, &self.inner.call_site);
        let _ = self.inner.exception.set(marshalled.clone());
        let exception = self.inner.exception.get().cloned().unwrap_or(marshalled);
        ExecutionError::new(exception)
    }

    fn resolve(&self, outcome: Outcome<T>) -> Result<T, ExecutionError> {
        match outcome {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(payload) => Err(self.failure(&payload)),
        }
    }
}

impl<T: Clone> BridgeFuture<T> {
    /// Block the calling thread until the operation completes.
    pub fn wait(&self) -> Result<T, ExecutionError> {
        self.resolve(self.inner.cell.wait())
    }

    /// The outcome if the operation has already completed.
    pub fn try_wait(&self) -> Option<Result<T, ExecutionError>> {
        self.inner.cell.try_get().map(|outcome| self.resolve(outcome))
    }

    /// Wait without blocking, for callers running their own executor.
    pub fn wait_async(&self) -> Wait<'_, T> {
        Wait { future: self }
    }
}

impl<T> std::fmt::Debug for BridgeFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeFuture")
            .field("state", &self.state())
            .finish()
    }
}

/// Future returned by [`BridgeFuture::wait_async`].
#[must_use = "futures do nothing unless polled"]
pub struct Wait<'a, T> {
    future: &'a BridgeFuture<T>,
}

impl<T: Clone> Future for Wait<'_, T> {
    type Output = Result<T, ExecutionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let future = self.future;
        future
            .inner
            .cell
            .poll_outcome(cx)
            .map(|outcome| future.resolve(outcome))
    }
}

impl<T> std::fmt::Debug for Wait<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wait").field("future", self.future).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::cell::completion_pair;
    use super::*;
    use crate::marshal::ExceptionClass;
    use crate::trace::StackFrame;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn future_pair<T>() -> (super::super::Completer<T>, BridgeFuture<T>) {
        let (completer, cell) = completion_pair();
        let call_site = StackTrace::from_frames(vec![StackFrame::new("app::Client", "send")]);
        let future = BridgeFuture::new(cell, call_site, Arc::new(ExceptionRegistry::with_builtins()));
        (completer, future)
    }

    #[test]
    fn test_wait_success() {
        let (completer, future) = future_pair::<i32>();
        completer.complete_success(42);
        assert_eq!(future.wait().unwrap(), 42);
        assert_eq!(future.state(), OperationState::Succeeded);
    }

    #[test]
    fn test_try_wait_pending() {
        let (completer, future) = future_pair::<i32>();
        assert!(future.try_wait().is_none());
        completer.complete_success(1);
        assert_eq!(future.try_wait().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_failure_is_marshalled_once() {
        let (completer, future) = future_pair::<i32>();
        completer.complete_failure(ErrorPayload::invalid_argument("bad input"));

        let first = future.wait().unwrap_err();
        let second = future.clone().wait().unwrap_err();

        assert_eq!(first.cause().class_name(), "IllegalArgumentException");
        assert!(first.cause().ptr_eq(second.cause()));
        assert!(first
            .cause()
            .stack_trace()
            .iter()
            .any(|f| f.class_name == "app::Client" && f.method_name == "send"));
    }

    #[test]
    fn test_loader_waiting_on_its_own_future_returns() {
        let registry = Arc::new(ExceptionRegistry::with_builtins());
        let slot: Arc<OnceLock<BridgeFuture<i32>>> = Arc::new(OnceLock::new());
        let seen = slot.clone();
        registry.register_deferred("WaitingException", move |registry| {
            if let Some(future) = seen.get() {
                assert!(future.try_wait().unwrap().is_err());
            }
            Some(ExceptionClass::new("WaitingException").extends(registry.generic_class().clone()))
        });

        let (completer, cell) = completion_pair();
        let future = BridgeFuture::new(cell, StackTrace::empty(), registry.clone());
        let _ = slot.set(future.clone());
        completer.complete_failure(ErrorPayload::invalid_state("stuck").with_type("WaitingException"));

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let future = future.clone();
            thread::spawn(move || {
                let first = future.wait().unwrap_err();
                let second = future.wait().unwrap_err();
                let _ = tx.send(first.cause().ptr_eq(second.cause()));
            })
        };

        let consistent = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("wait did not return");
        assert!(consistent);
        assert!(registry.is_loaded("WaitingException"));
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_async() {
        let (completer, future) = future_pair::<i32>();

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completer.complete_success(7);
        });

        let value = futures::executor::block_on(future.wait_async()).unwrap();
        assert_eq!(value, 7);
        writer.join().unwrap();
    }

    #[test]
    fn test_concurrent_async_and_blocking_waiters() {
        let (completer, future) = future_pair::<u64>();

        let blocking = {
            let future = future.clone();
            thread::spawn(move || future.wait().unwrap())
        };
        let asynchronous = {
            let future = future.clone();
            thread::spawn(move || futures::executor::block_on(future.wait_async()).unwrap())
        };

        completer.complete_success(99);
        assert_eq!(blocking.join().unwrap(), 99);
        assert_eq!(asynchronous.join().unwrap(), 99);
    }
}
