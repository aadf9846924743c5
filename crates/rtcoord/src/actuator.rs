//! Actuator abstraction driven by the task behaviors.
//!
//! The physical device is an external collaborator; the core only needs a
//! readiness probe, a direction setup and a boolean drive. [`MockActuator`]
//! records every operation into a shared [`Journal`] so host runs and tests
//! can inspect the exact order in which tasks touched the hardware.

use crate::error::{ActuatorError, ActuatorResult};
use crate::sync::{Arc, Mutex};

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Output device such as an LED behind a GPIO pin.
pub trait Actuator: Send {
    /// Whether the underlying device is present and usable.
    fn is_ready(&self) -> bool;

    /// Configure the pin direction.
    fn configure(&mut self, direction: Direction) -> ActuatorResult<()>;

    /// Drive the output.
    fn set(&mut self, on: bool);
}

/// Actuator handle shared between the initializer and its owning task.
pub type SharedActuator = Arc<Mutex<dyn Actuator>>;

/// Wraps a concrete actuator in a [`SharedActuator`].
pub fn shared<A: Actuator + 'static>(actuator: A) -> SharedActuator {
    Arc::new(Mutex::new(actuator))
}

/// One recorded actuator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Configure(Direction),
    Set(bool),
}

/// Journal entry: which pin, what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub pin: u8,
    pub op: Operation,
}

/// Append-only log of actuator operations shared by several mocks.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, pin: u8, op: Operation) {
        self.entries.lock().push(JournalEntry { pin, op });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory actuator for host runs and tests.
#[derive(Clone)]
pub struct MockActuator {
    pin: u8,
    ready: bool,
    reject: Option<i32>,
    direction: Option<Direction>,
    level: bool,
    journal: Journal,
}

impl MockActuator {
    /// Creates a ready actuator that accepts any configuration.
    pub fn new(pin: u8, journal: Journal) -> Self {
        Self {
            pin,
            ready: true,
            reject: None,
            direction: None,
            level: false,
            journal,
        }
    }

    /// Simulates a device that never came up.
    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Simulates a driver that refuses configuration with `code`.
    pub fn rejecting(mut self, code: i32) -> Self {
        self.reject = Some(code);
        self
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn level(&self) -> bool {
        self.level
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }
}

impl Actuator for MockActuator {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn configure(&mut self, direction: Direction) -> ActuatorResult<()> {
        if !self.ready {
            return Err(ActuatorError::NotReady);
        }
        if let Some(code) = self.reject {
            return Err(ActuatorError::Rejected(code));
        }
        self.direction = Some(direction);
        self.journal.record(self.pin, Operation::Configure(direction));
        Ok(())
    }

    fn set(&mut self, on: bool) {
        self.level = on;
        self.journal.record(self.pin, Operation::Set(on));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_operations_in_order() {
        let journal = Journal::new();
        let led = shared(MockActuator::new(3, journal.clone()));

        {
            let mut led = led.lock();
            assert!(led.is_ready());
            led.configure(Direction::Output).expect("configure");
            led.set(true);
            led.set(false);
        }

        assert_eq!(
            journal.entries(),
            vec![
                JournalEntry { pin: 3, op: Operation::Configure(Direction::Output) },
                JournalEntry { pin: 3, op: Operation::Set(true) },
                JournalEntry { pin: 3, op: Operation::Set(false) },
            ]
        );
    }

    #[test]
    fn failing_mocks_report_errors() {
        let journal = Journal::new();
        let mut absent = MockActuator::new(0, journal.clone()).not_ready();
        assert!(!absent.is_ready());
        assert_eq!(absent.configure(Direction::Output), Err(ActuatorError::NotReady));

        let mut stubborn = MockActuator::new(1, journal.clone()).rejecting(-5);
        assert_eq!(stubborn.configure(Direction::Output), Err(ActuatorError::Rejected(-5)));
        assert!(journal.is_empty());
    }
}
