//! Single-core kernel: owns the tasks, the tick counter and the scheduler.
//!
//! The kernel models one CPU. Time advances in ticks; within a tick the CPU
//! executes up to [`KernelConfig::steps_per_tick`] task steps, each chosen
//! afresh by the [`Scheduler`]. A task woken by a tick or by another task's
//! update therefore preempts anything less urgent at the very next step.

use std::collections::BTreeMap;
use core::time::Duration;

use log::{debug, trace};

use crate::error::KernelError;
use crate::event_group::{EventGroup, Registration, WaiterId};
use crate::queue::Pending;
use crate::scheduler::{ScheduleDecision, Scheduler};
use crate::sync::Arc;
use crate::task::{Priority, Task, TaskAction, TaskConfig, TaskContext, TaskId, TaskState, Wake};
use crate::time::{duration_to_ticks, ticks_to_duration, Ticks, Timeout};

/// Kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    pub max_tasks: usize,
    /// Wall-clock length of one tick.
    pub tick_period: Duration,
    /// Task steps the CPU executes per tick.
    pub steps_per_tick: u32,
    /// Called once per tick in which the CPU ran out of work.
    pub idle_callback: Option<fn()>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "rtcoord",
            max_tasks: 16,
            tick_period: Duration::from_millis(1),
            steps_per_tick: 16,
            idle_callback: None,
        }
    }
}

impl KernelConfig {
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    pub fn max_tasks(mut self, max: usize) -> Self {
        self.config.max_tasks = max;
        self
    }

    /// Sets the tick length. Zero is clamped to one nanosecond.
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period.max(Duration::from_nanos(1));
        self
    }

    /// Sets the CPU budget per tick. At least one step is always allowed.
    pub fn steps_per_tick(mut self, steps: u32) -> Self {
        self.config.steps_per_tick = steps.max(1);
        self
    }

    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    pub fn build(self) -> KernelConfig {
        self.config
    }
}

/// Collects task registrations before the kernel starts.
pub struct KernelBuilder {
    config: KernelConfig,
    tasks: Vec<TaskConfig>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
        }
    }

    /// Registers a task. Ids must be unique and priorities within `0..=63`.
    pub fn register(mut self, task: TaskConfig) -> Result<Self, KernelError> {
        if task.priority > Priority::LOWEST {
            return Err(KernelError::InvalidPriority {
                priority: task.priority,
                reason: "exceeds supported range 0..63",
            });
        }
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(KernelError::DuplicateTaskId(task.id));
        }
        if self.tasks.len() >= self.config.max_tasks {
            return Err(KernelError::TooManyTasks {
                max: self.config.max_tasks,
            });
        }
        self.tasks.push(task);
        Ok(self)
    }

    pub fn build(self) -> Kernel {
        Kernel::new(self.config, self.tasks)
    }
}

/// What a suspended task is waiting for.
enum Blocker {
    Sleep {
        until: Ticks,
    },
    Events {
        group: EventGroup,
        waiter: WaiterId,
        deadline: Option<Ticks>,
    },
    Pending {
        source: Arc<dyn Pending>,
        deadline: Option<Ticks>,
    },
}

impl Blocker {
    /// Checks the wait condition at time `now`. Returns the wake reason once
    /// the task may run again.
    fn poll(&self, now: Ticks) -> Option<Wake> {
        let expired = |deadline: &Option<Ticks>| deadline.is_some_and(|d| now >= d);
        match self {
            Self::Sleep { until } => (now >= *until).then_some(Wake::Elapsed),
            Self::Events {
                group,
                waiter,
                deadline,
            } => {
                if let Some(bits) = group.poll(*waiter) {
                    Some(Wake::Events(bits))
                } else if expired(deadline) {
                    Some(group.cancel(*waiter).map_or(Wake::TimedOut, Wake::Events))
                } else {
                    None
                }
            }
            Self::Pending { source, deadline } => {
                if source.has_pending() {
                    Some(Wake::Pending)
                } else if expired(deadline) {
                    Some(Wake::TimedOut)
                } else {
                    None
                }
            }
        }
    }
}

struct TaskSlot {
    name: &'static str,
    priority: Priority,
    start_delay: Duration,
    state: TaskState,
    blocker: Option<Blocker>,
    wake: Option<Wake>,
    steps: u64,
    task: Box<dyn Task>,
}

impl TaskSlot {
    /// Resolves a suspension if its condition now holds. Returns whether the
    /// task can run.
    fn refresh(&mut self, now: Ticks) -> bool {
        match self.state {
            TaskState::Ready => true,
            TaskState::Terminated => false,
            TaskState::Sleeping | TaskState::Blocked => {
                let wake = self.blocker.as_ref().and_then(|b| b.poll(now));
                match wake {
                    Some(wake) => {
                        self.blocker = None;
                        self.wake = Some(wake);
                        self.state = TaskState::Ready;
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

/// Per-task counters exposed for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    pub priority: Priority,
    pub state: TaskState,
    /// Steps executed so far.
    pub steps: u64,
}

/// The kernel.
pub struct Kernel {
    config: KernelConfig,
    scheduler: Scheduler,
    tasks: BTreeMap<TaskId, TaskSlot>,
    now: Ticks,
    started: bool,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    fn new(config: KernelConfig, configs: Vec<TaskConfig>) -> Self {
        let mut scheduler = Scheduler::new();
        let mut tasks = BTreeMap::new();
        for cfg in configs {
            scheduler.insert(cfg.id, cfg.priority);
            tasks.insert(
                cfg.id,
                TaskSlot {
                    name: cfg.name,
                    priority: cfg.priority,
                    start_delay: cfg.start_delay,
                    state: TaskState::Ready,
                    blocker: None,
                    wake: None,
                    steps: 0,
                    task: cfg.task,
                },
            );
        }
        Self {
            config,
            scheduler,
            tasks,
            now: 0,
            started: false,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Current kernel time in ticks.
    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn elapsed(&self) -> Duration {
        ticks_to_duration(self.now, self.config.tick_period)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    pub fn stats(&self, id: TaskId) -> Result<TaskStats, KernelError> {
        self.tasks
            .get(&id)
            .map(|slot| TaskStats {
                priority: slot.priority,
                state: slot.state,
                steps: slot.steps,
            })
            .ok_or(KernelError::TaskNotFound(id))
    }

    pub fn task_state(&self, id: TaskId) -> Result<TaskState, KernelError> {
        self.stats(id).map(|s| s.state)
    }

    /// Releases every task. Tasks with a start delay begin sleeping.
    pub fn start(&mut self) -> Result<(), KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        self.started = true;
        let now = self.now;
        let period = self.config.tick_period;
        for (id, slot) in self.tasks.iter_mut() {
            if slot.start_delay > Duration::ZERO {
                slot.state = TaskState::Sleeping;
                slot.blocker = Some(Blocker::Sleep {
                    until: now.saturating_add(duration_to_ticks(slot.start_delay, period)),
                });
            }
            debug!(
                "{} {id:?} '{}' at {} start {:?}",
                self.config.name, slot.name, slot.priority, slot.state
            );
        }
        Ok(())
    }

    /// Runs one step of the most urgent runnable task. Returns `false` when
    /// the CPU is idle or the kernel has not been started.
    pub fn dispatch_once(&mut self) -> bool {
        if !self.started {
            trace!("{} not started, nothing dispatched", self.config.name);
            return false;
        }
        let now = self.now;
        let tasks = &mut self.tasks;
        let decision = self.scheduler.plan_next(|id| {
            tasks
                .get_mut(&id)
                .map_or(false, |slot| slot.refresh(now))
        });
        match decision {
            ScheduleDecision::Run { id, .. } => {
                self.run_step(id);
                true
            }
            ScheduleDecision::Idle => false,
        }
    }

    /// Advances time by one tick without running anything.
    pub fn tick(&mut self) {
        self.now += 1;
    }

    /// Runs the CPU for `ticks` ticks, each with the configured step budget.
    pub fn run_ticks(&mut self, ticks: Ticks) {
        for _ in 0..ticks {
            self.run_tick();
        }
    }

    /// Runs the CPU for at least `duration` of kernel time.
    pub fn run_for(&mut self, duration: Duration) {
        self.run_ticks(duration_to_ticks(duration, self.config.tick_period));
    }

    /// Spends one tick's budget, then advances time.
    pub fn run_tick(&mut self) {
        for _ in 0..self.config.steps_per_tick {
            if !self.dispatch_once() {
                if let Some(idle) = self.config.idle_callback {
                    idle();
                }
                break;
            }
        }
        self.tick();
    }

    /// Dispatches steps without advancing time until nothing is runnable.
    ///
    /// Never returns while some task keeps the CPU.
    pub fn run_until_idle(&mut self) {
        while self.dispatch_once() {}
        if let Some(idle) = self.config.idle_callback {
            idle();
        }
    }

    fn run_step(&mut self, id: TaskId) {
        let now = self.now;
        let period = self.config.tick_period;
        let Some(slot) = self.tasks.get_mut(&id) else {
            return;
        };
        let mut ctx = TaskContext::new(id, slot.priority, now, period, slot.steps, slot.wake.take());
        let action = slot.task.step(&mut ctx);
        slot.steps += 1;
        trace!("{id:?} step {} -> {action:?}", slot.steps);
        self.apply(id, action);
    }

    fn apply(&mut self, id: TaskId, action: TaskAction) {
        let now = self.now;
        let period = self.config.tick_period;
        let Some(slot) = self.tasks.get_mut(&id) else {
            return;
        };
        let prio = slot.priority;

        match action {
            TaskAction::Continue => {}
            TaskAction::Yield => self.scheduler.rotate(id, prio),
            TaskAction::Sleep(d) if d.is_zero() => self.scheduler.rotate(id, prio),
            TaskAction::Sleep(d) => {
                slot.state = TaskState::Sleeping;
                slot.blocker = Some(Blocker::Sleep {
                    until: now.saturating_add(duration_to_ticks(d, period)),
                });
                self.scheduler.rotate(id, prio);
            }
            TaskAction::WaitEvents {
                group,
                bits,
                reset,
                timeout,
            } => match group.register(bits, reset) {
                Registration::Satisfied(observed) => {
                    slot.wake = Some(Wake::Events(observed));
                }
                Registration::Pending(waiter) => {
                    slot.state = TaskState::Blocked;
                    slot.blocker = Some(Blocker::Events {
                        group,
                        waiter,
                        deadline: timeout.deadline_ticks(now, period),
                    });
                    self.scheduler.rotate(id, prio);
                    debug!("{id:?} '{}' waits for events {bits:#x}", slot.name);
                }
            },
            TaskAction::WaitPending { source, timeout } => {
                if source.has_pending() {
                    slot.wake = Some(Wake::Pending);
                } else if timeout == Timeout::NoWait {
                    slot.wake = Some(Wake::TimedOut);
                } else {
                    slot.state = TaskState::Blocked;
                    slot.blocker = Some(Blocker::Pending {
                        source,
                        deadline: timeout.deadline_ticks(now, period),
                    });
                    self.scheduler.rotate(id, prio);
                }
            }
            TaskAction::Exit => {
                slot.state = TaskState::Terminated;
                slot.blocker = None;
                self.scheduler.remove(id, prio);
                debug!("{id:?} '{}' terminated", slot.name);
            }
        }
    }
}
