//! Fixed-priority preemptive scheduling policy.
//!
//! ## Policy
//!
//! 1. The most urgent level (lowest numeric priority) with a runnable task
//!    always wins; lower levels only run when every more urgent task is
//!    suspended.
//! 2. Within a level, tasks are kept in round-robin order. A task that
//!    yields, sleeps or blocks moves to the back of its level; a task that
//!    keeps the CPU stays at the front, so equal-priority peers can starve.
//! 3. The decision is remade after every step, which is what makes the
//!    kernel preemptive.
//!
//! The scheduler only orders tasks. Whether a task is runnable is decided by
//! the kernel through the predicate passed to [`Scheduler::plan_next`].

use std::collections::VecDeque;

use log::trace;

use crate::task::{Priority, TaskId};

const LEVELS: usize = 64;

/// 64-bit bitmap of occupied priority levels.
///
/// Bit `n` stands for priority `n`; `trailing_zeros` yields the most urgent
/// occupied level in constant time.
#[derive(Default, Clone, Copy)]
struct LevelSet {
    bits: u64,
}

impl LevelSet {
    fn insert(&mut self, prio: Priority) {
        Self::assert_range(prio);
        self.bits |= 1u64 << prio.0;
    }

    fn remove(&mut self, prio: Priority) {
        Self::assert_range(prio);
        self.bits &= !(1u64 << prio.0);
    }

    /// Occupied levels, most urgent first.
    fn iter(&self) -> impl Iterator<Item = Priority> {
        let mut rest = self.bits;
        core::iter::from_fn(move || {
            if rest == 0 {
                None
            } else {
                let prio = rest.trailing_zeros() as u8;
                rest &= rest - 1;
                Some(Priority(prio))
            }
        })
    }

    fn assert_range(prio: Priority) {
        assert!(
            (prio.0 as usize) < LEVELS,
            "priority {} exceeds supported range 0..63",
            prio.0
        );
    }
}

/// Outcome of a scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    Run { id: TaskId, priority: Priority },
    Idle,
}

/// Ordering state for every live task.
pub struct Scheduler {
    occupied: LevelSet,
    levels: Vec<VecDeque<TaskId>>,
    last: Option<TaskId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            occupied: LevelSet::default(),
            levels: (0..LEVELS).map(|_| VecDeque::new()).collect(),
            last: None,
        }
    }

    /// Appends a task at the back of its level.
    pub fn insert(&mut self, id: TaskId, prio: Priority) {
        let level = &mut self.levels[prio.0 as usize];
        if !level.contains(&id) {
            level.push_back(id);
        }
        self.occupied.insert(prio);
    }

    /// Drops a task from scheduling entirely.
    pub fn remove(&mut self, id: TaskId, prio: Priority) {
        let level = &mut self.levels[prio.0 as usize];
        level.retain(|tid| *tid != id);
        if level.is_empty() {
            self.occupied.remove(prio);
        }
        if self.last == Some(id) {
            self.last = None;
        }
    }

    /// Moves a task behind its equal-priority peers.
    pub fn rotate(&mut self, id: TaskId, prio: Priority) {
        let level = &mut self.levels[prio.0 as usize];
        if let Some(pos) = level.iter().position(|tid| *tid == id) {
            if let Some(tid) = level.remove(pos) {
                level.push_back(tid);
            }
        }
    }

    /// Picks the first runnable task, scanning levels most-urgent first and
    /// each level in round-robin order.
    ///
    /// `runnable` may update task state (for example to collect a satisfied
    /// wait); it is called at most once per task and stops at the first hit.
    pub fn plan_next(&mut self, mut runnable: impl FnMut(TaskId) -> bool) -> ScheduleDecision {
        for prio in self.occupied.iter() {
            for &id in &self.levels[prio.0 as usize] {
                if runnable(id) {
                    if self.last != Some(id) {
                        trace!("sched next {id:?} at {prio}");
                        self.last = Some(id);
                    }
                    return ScheduleDecision::Run { id, priority: prio };
                }
            }
        }
        if self.last.take().is_some() {
            trace!("sched idle");
        }
        ScheduleDecision::Idle
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_set_operations() {
        let mut set = LevelSet::default();
        assert_eq!(set.iter().next(), None);

        set.insert(Priority(7));
        set.insert(Priority(1));
        set.insert(Priority(63));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Priority(1), Priority(7), Priority(63)]
        );

        set.remove(Priority(1));
        assert_eq!(set.iter().next(), Some(Priority(7)));
    }

    #[test]
    #[should_panic(expected = "exceeds supported range")]
    fn level_set_rejects_out_of_range() {
        let mut set = LevelSet::default();
        set.insert(Priority(64));
    }

    #[test]
    fn most_urgent_runnable_task_wins() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(1), Priority(7));
        sched.insert(TaskId(2), Priority(1));
        sched.insert(TaskId(3), Priority(8));

        assert_eq!(
            sched.plan_next(|_| true),
            ScheduleDecision::Run { id: TaskId(2), priority: Priority(1) }
        );
        assert_eq!(
            sched.plan_next(|id| id != TaskId(2)),
            ScheduleDecision::Run { id: TaskId(1), priority: Priority(7) }
        );
        assert_eq!(
            sched.plan_next(|id| id == TaskId(3)),
            ScheduleDecision::Run { id: TaskId(3), priority: Priority(8) }
        );
        assert_eq!(sched.plan_next(|_| false), ScheduleDecision::Idle);
    }

    #[test]
    fn rotation_gives_equal_priority_peers_a_turn() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(1), Priority(7));
        sched.insert(TaskId(2), Priority(7));

        assert!(matches!(sched.plan_next(|_| true), ScheduleDecision::Run { id: TaskId(1), .. }));
        // Without a rotation the head keeps the CPU.
        assert!(matches!(sched.plan_next(|_| true), ScheduleDecision::Run { id: TaskId(1), .. }));

        sched.rotate(TaskId(1), Priority(7));
        assert!(matches!(sched.plan_next(|_| true), ScheduleDecision::Run { id: TaskId(2), .. }));
        sched.rotate(TaskId(2), Priority(7));
        assert!(matches!(sched.plan_next(|_| true), ScheduleDecision::Run { id: TaskId(1), .. }));
    }

    #[test]
    fn removing_last_task_frees_level() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(1), Priority(4));
        sched.insert(TaskId(2), Priority(9));

        sched.remove(TaskId(1), Priority(4));
        assert_eq!(sched.occupied.iter().collect::<Vec<_>>(), vec![Priority(9)]);
        assert_eq!(
            sched.plan_next(|_| true),
            ScheduleDecision::Run { id: TaskId(2), priority: Priority(9) }
        );
    }
}
