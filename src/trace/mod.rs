//! Stack trace capture and splicing across the worker boundary.

pub mod capture;
pub mod frame;
pub mod splice;

pub use capture::StackTrace;
pub use frame::StackFrame;
pub use splice::splice;
