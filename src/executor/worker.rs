// worker thread stuff
use super::task::Task;
use crate::telemetry::Metrics;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub type WorkerId = usize;

// stats for each worker
#[derive(Debug)]
pub struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub tasks_stolen: AtomicU64,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            tasks_executed: AtomicU64::new(0),
            tasks_stolen: AtomicU64::new(0),
        }
    }
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Task>,
    pub state: Arc<WorkerState>,
    pub metrics: Arc<Metrics>,
}

/// Shared pieces every worker loop needs.
pub(crate) struct WorkerContext {
    pub stealers: Vec<Stealer<Task>>,
    pub injector: Arc<Injector<Task>>,
    pub shutdown: Arc<AtomicBool>,
    pub pending_tasks: Arc<AtomicUsize>,
}

impl Worker {
    pub fn new(id: WorkerId, metrics: Arc<Metrics>) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            state: Arc::new(WorkerState::new()),
            metrics,
        }
    }

    // main loop
    //
    // Shutdown is only honoured once no task can be found anywhere, so every
    // task accepted before shutdown still runs.
    pub fn run(&self, ctx: WorkerContext) {
        let mut backoff_cnt = 0;

        loop {
            if let Some(task) = self.find_task(&ctx.stealers, &ctx.injector) {
                backoff_cnt = 0;
                self.execute_task(task);
                ctx.pending_tasks.fetch_sub(1, Ordering::AcqRel);
                continue;
            }

            if ctx.shutdown.load(Ordering::Acquire) && ctx.pending_tasks.load(Ordering::Acquire) == 0 {
                break;
            }

            self.backoff(&mut backoff_cnt);
        }

        tracing::trace!(
            worker = self.id,
            executed = self.state.tasks_executed.load(Ordering::Relaxed),
            "worker exiting"
        );
    }

    fn find_task(&self, stealers: &[Stealer<Task>], injector: &Injector<Task>) -> Option<Task> {
        // local queue first
        if let Some(task) = self.local_queue.pop() {
            return Some(task);
        }

        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Task>]) -> Option<Task> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() <= 1 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(task) => {
                        self.state.tasks_stolen.fetch_add(1, Ordering::Relaxed);
                        self.metrics.record_task_stolen();
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute_task(&self, task: Task) {
        let tid = task.id;
        let start = Instant::now();

        // Operations carry their own panic handling; this only guards the
        // worker thread against a bug in the wrapper itself.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            task.execute();
        }));

        let duration_ns = start.elapsed().as_nanos() as u64;

        match result {
            Ok(()) => self.metrics.record_task_execution(duration_ns),
            Err(_) => {
                tracing::error!(task = tid.as_u64(), worker = self.id, "task panicked outside operation guard");
                self.metrics.record_task_panic();
            }
        }

        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    fn backoff(&self, count: &mut u32) {
        const MAX_SPINS: u32 = 10;
        const MAX_YIELDS: u32 = 20;

        *count += 1;

        if *count <= MAX_SPINS {
            let spins = (*count).min(6);
            for _ in 0..(1 << spins) {
                std::hint::spin_loop();
            }
        } else if *count <= MAX_YIELDS {
            thread::yield_now();
        } else {
            thread::park_timeout(Duration::from_millis(1));
        }
    }
}
