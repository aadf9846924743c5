//! Tasks: the schedulable units run by the kernel.
//!
//! A task is a state machine advanced one [`Task::step`] at a time. Each step
//! runs to completion and returns a [`TaskAction`] telling the kernel what the
//! task wants next: keep the CPU, yield to equal-priority peers, sleep, block
//! on an event group or a queue, or exit. Step boundaries are preemption
//! points, so a task that never blocks is still displaced as soon as a
//! higher-priority task becomes ready.

use core::fmt;
use core::time::Duration;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::event_group::{EventBits, EventGroup};
use crate::queue::{HandoffQueue, Pending};
use crate::sync::Arc;
use crate::time::{ticks_to_duration, Ticks, Timeout};

/// Task identifier.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u8);

/// Fixed task priority. Lower numeric value means higher priority; `0` is
/// the most urgent level and `63` the least.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const HIGHEST: Self = Self(0);
    pub const LOWEST: Self = Self(63);

    /// One level less urgent, saturating at [`Priority::LOWEST`].
    pub fn lower(self) -> Self {
        Self(self.0.saturating_add(1).min(Self::LOWEST.0))
    }

    /// One level more urgent, saturating at [`Priority::HIGHEST`].
    pub fn higher(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prio{}", self.0)
    }
}

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Runnable.
    Ready,
    /// Delayed until a tick deadline.
    Sleeping,
    /// Waiting on an event group or queue.
    Blocked,
    /// Returned [`TaskAction::Exit`]; never scheduled again.
    Terminated,
}

/// Why a task was resumed, delivered to the step that follows a suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A sleep or start delay elapsed.
    Elapsed,
    /// An event wait was satisfied; carries the bits observed before reset.
    Events(EventBits),
    /// The awaited queue has an item.
    Pending,
    /// A wait with a finite timeout expired unsatisfied.
    TimedOut,
}

/// What a task asks the kernel to do after a step.
pub enum TaskAction {
    /// Keep the CPU. Equal-priority peers do not get a turn.
    Continue,
    /// Stay ready but move behind equal-priority peers.
    Yield,
    /// Suspend for at least the given duration. A zero sleep is a yield.
    Sleep(Duration),
    /// Suspend until all `bits` are set in `group`.
    WaitEvents {
        group: EventGroup,
        bits: EventBits,
        reset: bool,
        timeout: Timeout,
    },
    /// Suspend until `source` has something to take.
    WaitPending {
        source: Arc<dyn Pending>,
        timeout: Timeout,
    },
    /// Terminate the task.
    Exit,
}

impl TaskAction {
    pub fn wait_events(group: &EventGroup, bits: EventBits, reset: bool, timeout: Timeout) -> Self {
        Self::WaitEvents {
            group: group.clone(),
            bits,
            reset,
            timeout,
        }
    }

    pub fn wait_queue<T: Send + 'static>(queue: &HandoffQueue<T>, timeout: Timeout) -> Self {
        Self::WaitPending {
            source: queue.watch(),
            timeout,
        }
    }
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "Continue"),
            Self::Yield => write!(f, "Yield"),
            Self::Sleep(d) => write!(f, "Sleep({d:?})"),
            Self::WaitEvents {
                bits,
                reset,
                timeout,
                ..
            } => write!(f, "WaitEvents({bits:#x}, reset={reset}, {timeout:?})"),
            Self::WaitPending { timeout, .. } => write!(f, "WaitPending({timeout:?})"),
            Self::Exit => write!(f, "Exit"),
        }
    }
}

/// Per-step view of the kernel handed to a task.
#[derive(Debug)]
pub struct TaskContext {
    id: TaskId,
    priority: Priority,
    now: Ticks,
    tick_period: Duration,
    iteration: u64,
    wake: Option<Wake>,
}

impl TaskContext {
    pub(crate) fn new(
        id: TaskId,
        priority: Priority,
        now: Ticks,
        tick_period: Duration,
        iteration: u64,
        wake: Option<Wake>,
    ) -> Self {
        Self {
            id,
            priority,
            now,
            tick_period,
            iteration,
            wake,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Kernel time in ticks.
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// Kernel time since start.
    pub fn elapsed(&self) -> Duration {
        ticks_to_duration(self.now, self.tick_period)
    }

    /// Number of steps this task ran before the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Reason for resumption if the previous step suspended the task.
    pub fn wake(&self) -> Option<Wake> {
        self.wake
    }
}

/// A task body.
pub trait Task: Send + 'static {
    fn step(&mut self, ctx: &mut TaskContext) -> TaskAction;
}

impl<F> Task for F
where
    F: FnMut(&mut TaskContext) -> TaskAction + Send + 'static,
{
    fn step(&mut self, ctx: &mut TaskContext) -> TaskAction {
        self(ctx)
    }
}

/// Static description of a task handed to the kernel builder.
pub struct TaskConfig {
    pub id: TaskId,
    pub name: &'static str,
    pub priority: Priority,
    /// Delay between kernel start and the first step.
    pub start_delay: Duration,
    pub task: Box<dyn Task>,
}

impl TaskConfig {
    pub fn new(id: TaskId, priority: Priority, task: impl Task) -> Self {
        Self {
            id,
            name: "task",
            priority,
            start_delay: Duration::ZERO,
            task: Box::new(task),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }
}

impl fmt::Debug for TaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("start_delay", &self.start_delay)
            .finish()
    }
}
