//! Event group: a shared register of event bits that tasks set and wait on.
//!
//! Every update is one read-modify-write performed under the group's lock, so
//! callers touching disjoint masks compose as if serialized. Waiters are
//! recorded in a list; each update walks the list and latches the register
//! value into every waiter whose condition now holds before anyone can
//! observe a later value. A waiter that was blocked when a satisfying update
//! happened is therefore always released by that update, even if another
//! waiter resets the register in the same round.
//!
//! # Reset semantics
//!
//! A successful wait with `reset_after = true` clears the **entire** register,
//! not only the awaited bits. A persistent barrier bit is cleared with it, so
//! tasks that have not yet passed the barrier will block again. Use reset only
//! once every task depending on persistent bits is already past them.

use std::time::Instant;

use log::trace;

use crate::error::{SyncError, SyncResult};
use crate::sync::{Arc, Condvar, Mutex, MutexGuard};
use crate::time::Timeout;

/// Width of the event register.
pub type EventBits = u32;

/// Handle identifying one pending waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(u64);

/// Result of registering a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The condition already held; carries the bits observed before any reset.
    Satisfied(EventBits),
    /// The waiter is queued and will be latched by a later update.
    Pending(WaiterId),
}

#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    mask: EventBits,
    reset: bool,
    fired: Option<EventBits>,
}

#[derive(Debug, Default)]
struct Inner {
    bits: EventBits,
    waiters: Vec<Waiter>,
    next_waiter: u64,
}

impl Inner {
    fn take_if_satisfied(&mut self, mask: EventBits, reset: bool) -> Option<EventBits> {
        let observed = self.bits;
        if observed & mask == mask {
            if reset {
                self.bits = 0;
            }
            Some(observed)
        } else {
            None
        }
    }

    fn enqueue(&mut self, mask: EventBits, reset: bool) -> WaiterId {
        let id = WaiterId(self.next_waiter);
        self.next_waiter = self.next_waiter.wrapping_add(1);
        self.waiters.push(Waiter {
            id,
            mask,
            reset,
            fired: None,
        });
        id
    }

    fn position(&self, id: WaiterId) -> Option<usize> {
        self.waiters.iter().position(|w| w.id == id)
    }

    fn take_fired(&mut self, id: WaiterId) -> Option<EventBits> {
        let idx = self.position(id)?;
        let observed = self.waiters[idx].fired?;
        self.waiters.remove(idx);
        Some(observed)
    }

    fn remove(&mut self, id: WaiterId) -> Option<EventBits> {
        let idx = self.position(id)?;
        self.waiters.remove(idx).fired
    }

    /// Latches every satisfied waiter against the current value, then applies
    /// any requested reset. Returns true if at least one waiter was released.
    fn release_waiters(&mut self) -> bool {
        let current = self.bits;
        let mut released = false;
        let mut reset = false;
        for waiter in self.waiters.iter_mut().filter(|w| w.fired.is_none()) {
            if current & waiter.mask == waiter.mask {
                waiter.fired = Some(current);
                reset |= waiter.reset;
                released = true;
            }
        }
        if reset {
            self.bits = 0;
        }
        released
    }
}

struct Shared {
    state: Mutex<Inner>,
    released: Condvar,
}

/// Shared event-flag register.
///
/// Cloning produces another handle to the same register.
#[derive(Clone)]
pub struct EventGroup {
    shared: Arc<Shared>,
}

impl EventGroup {
    /// Creates a group with every bit clear.
    pub fn new() -> Self {
        Self::with_bits(0)
    }

    /// Creates a group whose register starts at `initial`.
    pub fn with_bits(initial: EventBits) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Inner {
                    bits: initial,
                    ..Inner::default()
                }),
                released: Condvar::new(),
            }),
        }
    }

    /// Returns a snapshot of the register.
    pub fn get(&self) -> EventBits {
        self.shared.state.lock().bits
    }

    /// ORs `bits` into the register and releases every waiter now satisfied.
    pub fn set(&self, bits: EventBits) {
        self.update(|current| current | bits);
    }

    /// Replaces only the bits selected by `mask`:
    /// `reg = (reg & !mask) | (bits & mask)`.
    ///
    /// Bits outside `mask` are never touched, which lets several publishers
    /// own disjoint parts of the register.
    pub fn set_masked(&self, bits: EventBits, mask: EventBits) {
        self.update(|current| (current & !mask) | (bits & mask));
    }

    /// Clears `bits`, leaving the rest of the register untouched.
    pub fn clear(&self, bits: EventBits) {
        self.update(|current| current & !bits);
    }

    /// Returns immediately with the observed bits if all of `bits` are set,
    /// or [`SyncError::WouldBlock`] otherwise.
    pub fn try_wait(&self, bits: EventBits, reset_after: bool) -> SyncResult<EventBits> {
        let mut inner = self.shared.state.lock();
        inner
            .take_if_satisfied(bits, reset_after)
            .ok_or(SyncError::WouldBlock)
    }

    /// Blocks the calling thread until all of `bits` are set.
    ///
    /// Returns the register value observed at satisfaction, before any reset.
    /// With `reset_after` the whole register is cleared on success; see the
    /// module docs.
    pub fn wait(&self, bits: EventBits, reset_after: bool, timeout: Timeout) -> SyncResult<EventBits> {
        let mut inner = self.shared.state.lock();
        if let Some(observed) = inner.take_if_satisfied(bits, reset_after) {
            return Ok(observed);
        }
        if timeout == Timeout::NoWait {
            return Err(SyncError::Timeout);
        }

        let deadline = timeout.deadline_from(Instant::now());
        let id = inner.enqueue(bits, reset_after);
        loop {
            if let Some(observed) = inner.take_fired(id) {
                return Ok(observed);
            }
            if self.block(&mut inner, deadline) {
                // An update may have latched us between the timeout and
                // reacquiring the lock.
                return inner.remove(id).ok_or(SyncError::Timeout);
            }
        }
    }

    /// Queues a wait without blocking. Used by the kernel, which suspends the
    /// task itself and later polls the returned waiter.
    pub(crate) fn register(&self, bits: EventBits, reset_after: bool) -> Registration {
        let mut inner = self.shared.state.lock();
        match inner.take_if_satisfied(bits, reset_after) {
            Some(observed) => Registration::Satisfied(observed),
            None => Registration::Pending(inner.enqueue(bits, reset_after)),
        }
    }

    /// Returns the latched bits once the waiter has been released, consuming
    /// the registration.
    pub(crate) fn poll(&self, id: WaiterId) -> Option<EventBits> {
        self.shared.state.lock().take_fired(id)
    }

    /// Withdraws a waiter. If it was released in the meantime the latched
    /// bits are returned so the release is not lost.
    pub(crate) fn cancel(&self, id: WaiterId) -> Option<EventBits> {
        self.shared.state.lock().remove(id)
    }

    /// Number of waiters not yet collected.
    pub fn waiting_count(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }

    fn update(&self, op: impl FnOnce(EventBits) -> EventBits) {
        let mut inner = self.shared.state.lock();
        let before = inner.bits;
        inner.bits = op(before);
        let after = inner.bits;
        let released = inner.release_waiters();
        let settled = inner.bits;
        drop(inner);

        trace!("events {before:#010x} -> {after:#010x} (settled {settled:#010x})");
        if released {
            self.shared.released.notify_all();
        }
    }

    fn block(&self, inner: &mut MutexGuard<'_, Inner>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => self.shared.released.wait_until(inner, deadline),
            None => {
                self.shared.released.wait(inner);
                false
            }
        }
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EventGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.shared.state.lock();
        f.debug_struct("EventGroup")
            .field("bits", &format_args!("{:#010x}", inner.bits))
            .field("waiters", &inner.waiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    const INIT_DONE: EventBits = 0x1;
    const STATUS: EventBits = 0x2;

    #[test]
    fn set_ors_bits_into_register() {
        let events = EventGroup::new();
        events.set(INIT_DONE);
        events.set(STATUS);
        assert_eq!(events.get(), INIT_DONE | STATUS);
    }

    #[test]
    fn masked_set_leaves_bits_outside_mask() {
        let events = EventGroup::with_bits(INIT_DONE);

        events.set_masked(STATUS, STATUS);
        assert_eq!(events.get(), INIT_DONE | STATUS);

        events.set_masked(0, STATUS);
        assert_eq!(events.get(), INIT_DONE);

        // Bits requested outside the mask are ignored.
        events.set_masked(0xF0 | STATUS, STATUS);
        assert_eq!(events.get(), INIT_DONE | STATUS);
    }

    #[test]
    fn clear_only_touches_named_bits() {
        let events = EventGroup::with_bits(INIT_DONE | STATUS);
        events.clear(STATUS);
        assert_eq!(events.get(), INIT_DONE);
    }

    #[test]
    fn try_wait_requires_all_bits() {
        let events = EventGroup::with_bits(INIT_DONE);
        assert_eq!(events.try_wait(INIT_DONE | STATUS, false), Err(SyncError::WouldBlock));
        events.set(STATUS);
        assert_eq!(events.try_wait(INIT_DONE | STATUS, false), Ok(INIT_DONE | STATUS));
        assert_eq!(events.get(), INIT_DONE | STATUS);
    }

    #[test]
    fn reset_clears_whole_register() {
        let events = EventGroup::with_bits(INIT_DONE | STATUS);
        assert_eq!(events.try_wait(STATUS, true), Ok(INIT_DONE | STATUS));
        assert_eq!(events.get(), 0);
        assert_eq!(events.try_wait(INIT_DONE, false), Err(SyncError::WouldBlock));
    }

    #[test]
    fn wait_times_out() {
        let events = EventGroup::new();
        let started = Instant::now();
        let result = events.wait(STATUS, false, Timeout::from_millis(20));
        assert_eq!(result, Err(SyncError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(events.waiting_count(), 0);
    }

    #[test]
    fn no_wait_reports_timeout_without_queuing() {
        let events = EventGroup::new();
        assert_eq!(events.wait(STATUS, false, Timeout::NoWait), Err(SyncError::Timeout));
        assert_eq!(events.waiting_count(), 0);
    }

    #[test]
    fn blocked_waiter_is_released_by_set() {
        let events = EventGroup::new();
        let waiter = {
            let events = events.clone();
            thread::spawn(move || events.wait(INIT_DONE, false, Timeout::Forever))
        };

        while events.waiting_count() == 0 {
            thread::yield_now();
        }
        events.set(INIT_DONE);

        assert_eq!(waiter.join().expect("waiter panicked"), Ok(INIT_DONE));
    }

    #[test]
    fn wait_accepts_unbounded_duration() {
        let events = EventGroup::with_bits(INIT_DONE);
        assert_eq!(events.wait(INIT_DONE, false, Timeout::After(Duration::MAX)), Ok(INIT_DONE));

        let waiter = {
            let events = events.clone();
            thread::spawn(move || events.wait(STATUS, false, Timeout::After(Duration::MAX)))
        };
        while events.waiting_count() == 0 {
            thread::yield_now();
        }
        events.set(STATUS);

        assert_eq!(waiter.join().expect("waiter panicked"), Ok(INIT_DONE | STATUS));
    }

    #[test]
    fn resetting_waiter_does_not_swallow_peer_release() {
        let events = EventGroup::new();
        let reset_id = match events.register(STATUS, true) {
            Registration::Pending(id) => id,
            other => panic!("unexpected {other:?}"),
        };
        let plain_id = match events.register(STATUS, false) {
            Registration::Pending(id) => id,
            other => panic!("unexpected {other:?}"),
        };

        events.set(INIT_DONE | STATUS);

        assert_eq!(events.poll(reset_id), Some(INIT_DONE | STATUS));
        assert_eq!(events.poll(plain_id), Some(INIT_DONE | STATUS));
        assert_eq!(events.get(), 0);
    }

    #[test]
    fn cancel_returns_release_that_raced_the_timeout() {
        let events = EventGroup::new();
        let id = match events.register(STATUS, false) {
            Registration::Pending(id) => id,
            other => panic!("unexpected {other:?}"),
        };
        events.set(STATUS);
        assert_eq!(events.cancel(id), Some(STATUS));
        assert_eq!(events.cancel(id), None);
    }

    #[test]
    fn registration_satisfied_immediately_applies_reset() {
        let events = EventGroup::with_bits(INIT_DONE | STATUS);
        assert_eq!(events.register(STATUS, true), Registration::Satisfied(INIT_DONE | STATUS));
        assert_eq!(events.get(), 0);
    }
}
