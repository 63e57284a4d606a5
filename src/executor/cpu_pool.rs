use super::task::Task;
use super::worker::{Worker, WorkerContext, WorkerId};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::telemetry::Metrics;
use crossbeam_deque::Injector;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    let cores = num_cpus::get();
    let core_id = core_id % cores.max(1);
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            tracing::warn!(
                thread = std::thread::current().name().unwrap_or("unknown"),
                core_id,
                "failed to pin worker thread"
            );
        }
    }
}

/// Fixed-size pool of worker threads fed through a shared injector queue.
pub struct CpuPool {
    workers: Mutex<Vec<WorkerHandle>>,
    unparkers: Vec<thread::Thread>,
    injector: Arc<Injector<Task>>,
    // Submissions hold the read side while pushing; shutdown takes the write
    // side to flip it, so no task can slip in behind the workers' exit.
    accepting: RwLock<bool>,
    shutdown: Arc<AtomicBool>,
    num_threads: usize,
    pending_tasks: Arc<AtomicUsize>,
    next_wake: AtomicUsize,
    pub(crate) metrics: Arc<Metrics>,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
}

impl CpuPool {
    pub fn new(config: &Config) -> Result<Self> {
        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending_tasks = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(Metrics::new());

        let mut workers = Vec::with_capacity(num_threads);
        let mut stealers = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let worker = Worker::new(id, metrics.clone());
            stealers.push(worker.local_queue.stealer());
            workers.push(worker);
        }

        let mut handles: Vec<WorkerHandle> = Vec::with_capacity(num_threads);
        let mut unparkers: Vec<thread::Thread> = Vec::with_capacity(num_threads);

        for worker in workers {
            let id = worker.id;
            let ctx = WorkerContext {
                stealers: stealers.clone(),
                injector: injector.clone(),
                shutdown: shutdown.clone(),
                pending_tasks: pending_tasks.clone(),
            };
            let name = format!("{}-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let pin_workers = config.pin_workers;
            let spawned = builder.spawn(move || {
                #[cfg(target_os = "linux")]
                if pin_workers {
                    pin_thread_to_core(id);
                }
                #[cfg(not(target_os = "linux"))]
                let _ = pin_workers;

                worker.run(ctx);
            });

            let thread = match spawned {
                Ok(thread) => thread,
                Err(e) => {
                    // Tear down whatever already started before reporting.
                    shutdown.store(true, Ordering::Release);
                    for unparker in &unparkers {
                        unparker.unpark();
                    }
                    for handle in handles.iter_mut() {
                        if let Some(t) = handle.thread.take() {
                            let _ = t.join();
                        }
                    }
                    return Err(Error::Io(e));
                }
            };

            unparkers.push(thread.thread().clone());
            handles.push(WorkerHandle {
                id,
                thread: Some(thread),
            });
        }

        Ok(Self {
            workers: Mutex::new(handles),
            unparkers,
            injector,
            accepting: RwLock::new(true),
            shutdown,
            num_threads,
            pending_tasks,
            next_wake: AtomicUsize::new(0),
            metrics,
        })
    }

    /// Queue a task. Fails without running it once shutdown has begun.
    pub(crate) fn submit(&self, task: Task) -> Result<()> {
        self.try_submit(task)
            .map_err(|_| Error::scheduling("runtime is shutting down"))
    }

    /// Queue a task, handing it back unrun once shutdown has begun.
    pub(crate) fn try_submit(&self, task: Task) -> std::result::Result<(), Task> {
        let accepting = self.accepting.read();
        if !*accepting {
            return Err(task);
        }

        self.pending_tasks.fetch_add(1, Ordering::AcqRel);
        self.injector.push(task);
        drop(accepting);

        let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % self.num_threads;
        self.unparkers[idx].unpark();

        Ok(())
    }

    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f))
    }

    pub fn pending_tasks(&self) -> usize {
        self.pending_tasks.load(Ordering::Acquire)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn is_shut_down(&self) -> bool {
        !*self.accepting.read()
    }

    /// Whether the calling thread is one of this pool's workers.
    pub fn is_worker_thread(&self, id: ThreadId) -> bool {
        self.unparkers.iter().any(|t| t.id() == id)
    }

    /// Stop accepting work, let the workers drain everything already queued,
    /// then join them. Returns `false` if the pool was already shut down.
    pub fn shutdown(&self) -> bool {
        {
            let mut accepting = self.accepting.write();
            if !*accepting {
                return false;
            }
            *accepting = false;
        }

        self.shutdown.store(true, Ordering::Release);

        // wake everyone up to check shutdown flag
        for unparker in &self.unparkers {
            unparker.unpark();
        }

        let mut workers = self.workers.lock();

        // On a worker thread the pending count includes the running task, so
        // joining would never return. Detach and let the workers drain alone.
        if self.is_worker_thread(thread::current().id()) {
            tracing::debug!("pool shut down from a worker thread; detaching workers");
            for worker in workers.iter_mut() {
                worker.thread.take();
            }
            return true;
        }

        for worker in workers.iter_mut() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::error!(worker = worker.id, "worker thread panicked");
                }
            }
        }

        true
    }
}

impl Drop for CpuPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CpuPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuPool")
            .field("num_threads", &self.num_threads)
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}
