//! Task execution infrastructure.
//!
//! Worker threads, the shared task queue, and the panic guard that keeps a
//! misbehaving operation from taking a worker down with it.

pub(crate) const MODULE: &str = module_path!();

pub mod cpu_pool;
pub mod panic_handler;
pub mod task;
mod worker;

pub use cpu_pool::CpuPool;
pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use task::TaskId;

pub(crate) use task::Task;
