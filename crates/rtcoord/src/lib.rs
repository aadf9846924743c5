//! # rtcoord
//!
//! A real-time coordination core for cooperating fixed-priority tasks on a
//! single CPU. Tasks synchronize through a shared [`EventGroup`] and hand
//! results to a single consumer through a [`HandoffQueue`].
//!
//! ## Module Overview
//! - [`event_group`] – Event bit register with masked set and wait-for-all.
//! - [`queue`]       – Unbounded multiple-producer FIFO with blocking pop.
//! - [`task`]        – Step-wise task model, priorities and wake reasons.
//! - [`scheduler`]   – Fixed-priority preemptive policy with round-robin levels.
//! - [`kernel`]      – Tick-driven kernel with builder-style configuration.
//! - [`actuator`]    – Actuator seam plus a journaling mock.
//! - [`behaviors`]   – Initializer, blink loops and queue consumer.
//! - [`blinky`]      – The four-LED sample system.
//!
//! The event group and the queue are usable from ordinary threads as well as
//! from kernel tasks; the kernel parks tasks on them without blocking a
//! thread.

pub mod actuator;
pub mod behaviors;
pub mod blinky;
pub mod error;
pub mod event_group;
pub mod kernel;
pub mod message;
pub mod queue;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod time;

pub use actuator::{Actuator, Direction, Journal, MockActuator, SharedActuator};
pub use blinky::{Blinky, BlinkyConfig, BusyPlacement, INIT_DONE, LED1_ON};
pub use error::{ActuatorError, KernelError, SyncError, SyncResult};
pub use event_group::{EventBits, EventGroup};
pub use kernel::{Kernel, KernelBuilder, KernelConfig, TaskStats};
pub use message::{LogSink, Message, MessageSink};
pub use queue::HandoffQueue;
pub use task::{Priority, Task, TaskAction, TaskConfig, TaskContext, TaskId, TaskState, Wake};
pub use time::{Ticks, Timeout};

#[cfg(test)]
mod tests;
