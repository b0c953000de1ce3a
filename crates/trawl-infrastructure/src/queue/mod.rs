//! In-process task queue driver.
//!
//! The queue provides dispatch plus at-least-once execution over small
//! per-queue worker pools; handlers are looked up in a name → handler
//! registry at execution time and acquire their own broker locks. Task
//! states stay observable so the beats can validate fences against the
//! queue.

mod driver;
mod registry;

pub use driver::QueueDriver;
pub use registry::{TaskExecution, TaskRegistry};
