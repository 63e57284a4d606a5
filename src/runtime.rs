use crate::completion::{completion_pair, BridgeFuture, Outcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{CpuPool, PanicHandler, Task};
use crate::marshal::{ErrorKind, ErrorPayload, ExceptionRegistry};
use crate::telemetry::MetricsSnapshot;
use crate::trace::{capture, StackTrace};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub(crate) const MODULE: &str = module_path!();

// Leading call-site frames inside these modules are bridge plumbing.
const CALL_SITE_SKIP: &[&str] = &[MODULE, crate::handle::MODULE];

/// A background runtime: a worker pool plus the registry its failures are
/// marshalled through.
///
/// Operations are closures returning `Result<T, ErrorPayload>`; each one
/// completes exactly one [`BridgeFuture`].
pub struct Runtime {
    pool: CpuPool,
    config: Config,
    registry: Arc<ExceptionRegistry>,
    panic_handler: Arc<PanicHandler>,
}

impl Runtime {
    /// Start a runtime resolving exception types through the process-wide
    /// registry.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_registry(config, ExceptionRegistry::global())
    }

    pub fn with_registry(config: Config, registry: Arc<ExceptionRegistry>) -> Result<Self> {
        config.validate()?;

        let pool = CpuPool::new(&config)?;
        let panic_handler = Arc::new(PanicHandler::new(config.panic_strategy));

        tracing::debug!(
            threads = pool.num_threads(),
            prefix = %config.thread_name_prefix,
            "runtime created"
        );

        Ok(Self {
            pool,
            config,
            registry,
            panic_handler,
        })
    }

    /// Queue `op` and return its future without waiting for it.
    ///
    /// The submitting thread's stack is recorded (unless disabled in the
    /// config) and later spliced into the trace of any failure.
    pub fn submit<F, T>(&self, op: F) -> Result<BridgeFuture<T>>
    where
        F: FnOnce() -> std::result::Result<T, ErrorPayload> + Send + 'static,
        T: Send + 'static,
    {
        let call_site = if self.config.capture_call_site {
            StackTrace::capture_skipping(CALL_SITE_SKIP)
        } else {
            StackTrace::empty()
        };
        self.submit_with_call_site(call_site, op)
    }

    /// Like [`Runtime::submit`], with a call-site trace supplied by the
    /// caller, for hosts that walk their own stacks.
    pub fn submit_with_call_site<F, T>(&self, call_site: StackTrace, op: F) -> Result<BridgeFuture<T>>
    where
        F: FnOnce() -> std::result::Result<T, ErrorPayload> + Send + 'static,
        T: Send + 'static,
    {
        let (completer, cell) = completion_pair();
        let handler = self.panic_handler.clone();
        let metrics = self.pool.metrics.clone();
        let capture_failure_site = self.config.capture_failure_site;

        let task = Task::new(move || {
            completer.mark_running();
            let start = Instant::now();

            let result = capture::with_failure_capture(capture_failure_site, || handler.execute(op));
            let outcome = match result {
                Ok(Ok(value)) => {
                    metrics.record_success(elapsed_ns(start));
                    Outcome::Success(value)
                }
                Ok(Err(payload)) => {
                    metrics.record_failure(elapsed_ns(start));
                    Outcome::Failure(payload)
                }
                Err(panic) => {
                    metrics.record_operation_panic(elapsed_ns(start));
                    Outcome::Failure(ErrorPayload::new(
                        ErrorKind::UnexpectedPanic,
                        format!("unexpected panic: {}", panic.message),
                    ))
                }
            };

            completer.complete(outcome);
        });

        let task_id = task.id;
        if let Err(rejected) = self.pool.try_submit(task) {
            // Release the cell first so the unrun completer has nobody to warn.
            drop(cell);
            drop(rejected);
            return Err(Error::scheduling("runtime has been destroyed"));
        }
        self.pool.metrics.record_submitted();
        tracing::trace!(task = task_id.as_u64(), "operation submitted");

        Ok(BridgeFuture::new(cell, call_site, self.registry.clone()))
    }

    /// Finish every queued and running operation, then stop the workers.
    ///
    /// # Panics
    ///
    /// If called from one of this runtime's own worker threads.
    pub fn destroy(self) {
        if self.pool.is_worker_thread(thread::current().id()) {
            panic!("runtime destroyed from one of its own worker threads");
        }
        self.shutdown();
    }

    /// Returns `false` if the runtime was already shut down.
    pub(crate) fn shutdown(&self) -> bool {
        let stopped = self.pool.shutdown();
        if stopped {
            tracing::debug!(threads = self.pool.num_threads(), "runtime destroyed");
        }
        stopped
    }

    pub(crate) fn is_worker_thread(&self) -> bool {
        self.pool.is_worker_thread(thread::current().id())
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    /// Operations queued or running right now.
    pub fn pending_operations(&self) -> usize {
        self.pool.pending_tasks()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ExceptionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.pool.metrics.snapshot()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pool", &self.pool)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    start.elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::OperationState;
    use crate::executor::PanicStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn runtime(threads: usize) -> Runtime {
        let config = Config::builder()
            .num_threads(threads)
            .panic_strategy(PanicStrategy::Isolate)
            .build()
            .unwrap();
        Runtime::with_registry(config, Arc::new(ExceptionRegistry::with_builtins())).unwrap()
    }

    #[test]
    fn test_submit_and_wait() {
        let rt = runtime(2);
        let future = rt.submit(|| Ok(21 * 2)).unwrap();
        assert_eq!(future.wait().unwrap(), 42);
        assert_eq!(future.state(), OperationState::Succeeded);
        rt.destroy();
    }

    #[test]
    fn test_failure_is_marshalled() {
        let rt = runtime(1);
        let future = rt
            .submit(|| -> std::result::Result<(), _> { Err(ErrorPayload::invalid_state("closed")) })
            .unwrap();

        let err = future.wait().unwrap_err();
        assert_eq!(err.cause().class_name(), "IllegalStateException");
        assert_eq!(err.cause().message(), "closed");
        rt.destroy();
    }

    #[test]
    fn test_panic_becomes_failure() {
        let rt = runtime(1);
        let future = rt
            .submit(|| -> std::result::Result<i32, ErrorPayload> { panic!("worker blew up") })
            .unwrap();

        let err = future.wait().unwrap_err();
        assert_eq!(err.cause().kind(), &ErrorKind::UnexpectedPanic);
        assert_eq!(err.cause().class_name(), "AssertionError");
        assert!(err.cause().message().contains("worker blew up"));

        // the worker survives
        assert_eq!(rt.submit(|| Ok(1)).unwrap().wait().unwrap(), 1);
        rt.destroy();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let rt = runtime(1);
        assert!(rt.shutdown());
        assert!(!rt.shutdown());

        let result = rt.submit(|| Ok(()));
        assert!(matches!(result, Err(Error::Scheduling(_))));
    }

    #[test]
    fn test_rejected_submit_logs_nothing() {
        use tracing_subscriber::layer::SubscriberExt;

        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));
        let rt = runtime(1);
        assert!(rt.shutdown());

        tracing::subscriber::with_default(subscriber, || {
            let result = rt.submit(|| Ok(()));
            assert!(matches!(result, Err(Error::Scheduling(_))));
            assert_eq!(errors.load(Ordering::SeqCst), 0);

            // an abandoned completer someone still waits on is reported
            let (completer, _cell) = completion_pair::<()>();
            drop(completer);
            assert_eq!(errors.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_failure_site_capture_disabled() {
        let config = Config::builder()
            .num_threads(1)
            .capture_call_site(false)
            .capture_failure_site(false)
            .build()
            .unwrap();
        let rt = Runtime::with_registry(config, Arc::new(ExceptionRegistry::with_builtins())).unwrap();

        let future = rt
            .submit(|| -> std::result::Result<(), _> { Err(ErrorPayload::invalid_argument("untraced")) })
            .unwrap();
        let err = future.wait().unwrap_err();
        let trace = err.cause().stack_trace();
        assert_eq!(trace.len(), 1);
        assert!(trace[0].is_boundary());

        // payloads built outside the runtime still capture
        assert!(!ErrorPayload::invalid_argument("traced").trace().is_empty());
        rt.destroy();
    }

    #[test]
    fn test_destroy_waits_for_queued_operations() {
        let rt = runtime(1);
        let futures: Vec<_> = (0..50).map(|i| rt.submit(move || Ok(i)).unwrap()).collect();

        rt.destroy();

        for (i, future) in futures.iter().enumerate() {
            assert!(future.is_complete());
            assert_eq!(future.try_wait().unwrap().unwrap(), i);
        }
    }

    #[test]
    fn test_call_site_capture_disabled() {
        let config = Config::builder().num_threads(1).capture_call_site(false).build().unwrap();
        let rt = Runtime::new(config).unwrap();

        let future = rt.submit(|| Ok(())).unwrap();
        assert!(future.call_site().is_empty());
        future.wait().unwrap();
        rt.destroy();
    }

    #[test]
    fn test_is_worker_thread() {
        let rt = Arc::new(runtime(1));
        assert!(!rt.is_worker_thread());

        let (tx, rx) = mpsc::channel();
        let inner = rt.clone();
        rt.submit(move || {
            let on_worker = inner.is_worker_thread();
            drop(inner);
            tx.send(on_worker).unwrap();
            Ok(())
        })
        .unwrap()
        .wait()
        .unwrap();

        assert!(rx.recv().unwrap());
    }

    #[cfg(feature = "telemetry")]
    #[test]
    fn test_metrics_count_outcomes() {
        let rt = runtime(2);
        rt.submit(|| Ok(1)).unwrap().wait().unwrap();
        let _ = rt
            .submit(|| -> std::result::Result<i32, _> { Err(ErrorPayload::invalid_argument("x")) })
            .unwrap()
            .wait();

        let snapshot = rt.metrics();
        assert_eq!(snapshot.operations_submitted, 2);
        assert_eq!(snapshot.operations_succeeded, 1);
        assert_eq!(snapshot.operations_failed, 1);
        rt.destroy();
    }
}
