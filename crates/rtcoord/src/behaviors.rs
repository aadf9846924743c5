//! Task bodies for the actuator sample: the initializer, three blink loops
//! and the queue consumer.
//!
//! Every loop starts by waiting on the startup barrier. Only the
//! [`Initializer`] touches the actuators before the barrier bit is set, so
//! its hardware setup is exclusive.

use core::time::Duration;

use log::{error, info};

use crate::actuator::{Direction, SharedActuator};
use crate::event_group::{EventBits, EventGroup};
use crate::message::{Message, MessageSink};
use crate::queue::HandoffQueue;
use crate::task::{Task, TaskAction, TaskContext};
use crate::time::Timeout;

/// Barrier bits a task waits on before its first unit of work.
#[derive(Debug, Clone)]
pub struct Barrier {
    events: EventGroup,
    bits: EventBits,
}

impl Barrier {
    pub fn new(events: &EventGroup, bits: EventBits) -> Self {
        Self {
            events: events.clone(),
            bits,
        }
    }

    fn wait(&self) -> TaskAction {
        TaskAction::wait_events(&self.events, self.bits, false, Timeout::Forever)
    }
}

/// Delays used by the initializer's light show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitTiming {
    /// Pause after switching each actuator.
    pub step_delay: Duration,
    /// Pause after a full pass over all actuators.
    pub settle_delay: Duration,
}

impl Default for InitTiming {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    /// Configure and switch on the actuator at this index.
    Light(usize),
    /// Switch off the actuator before this index.
    Dim(usize),
    Release,
    Done,
}

/// Brings every actuator up, then releases the barrier.
///
/// Each actuator is checked, configured as output and switched on in order;
/// after a settle delay they are switched off in reverse. The barrier bits
/// are set only after the last hardware operation. If an actuator is missing
/// or rejects configuration the initializer logs and exits, leaving the
/// barrier unset.
pub struct Initializer {
    leds: Vec<SharedActuator>,
    events: EventGroup,
    barrier: EventBits,
    timing: InitTiming,
    phase: InitPhase,
}

impl Initializer {
    pub fn new(leds: Vec<SharedActuator>, events: &EventGroup, barrier: EventBits) -> Self {
        Self {
            leds,
            events: events.clone(),
            barrier,
            timing: InitTiming::default(),
            phase: InitPhase::Light(0),
        }
    }

    pub fn with_timing(mut self, timing: InitTiming) -> Self {
        self.timing = timing;
        self
    }
}

impl Task for Initializer {
    fn step(&mut self, _ctx: &mut TaskContext) -> TaskAction {
        match self.phase {
            InitPhase::Light(index) if index < self.leds.len() => {
                let mut led = self.leds[index].lock();
                if !led.is_ready() {
                    error!("LED{index} device is not ready");
                    self.phase = InitPhase::Done;
                    return TaskAction::Exit;
                }
                if let Err(err) = led.configure(Direction::Output) {
                    error!("failed to configure LED{index}: {err}");
                    self.phase = InitPhase::Done;
                    return TaskAction::Exit;
                }
                led.set(true);
                self.phase = InitPhase::Light(index + 1);
                TaskAction::Sleep(self.timing.step_delay)
            }
            InitPhase::Light(_) => {
                self.phase = InitPhase::Dim(self.leds.len());
                TaskAction::Sleep(self.timing.settle_delay)
            }
            InitPhase::Dim(0) => {
                self.phase = InitPhase::Release;
                TaskAction::Sleep(self.timing.settle_delay)
            }
            InitPhase::Dim(n) => {
                self.leds[n - 1].lock().set(false);
                self.phase = InitPhase::Dim(n - 1);
                TaskAction::Sleep(self.timing.step_delay)
            }
            InitPhase::Release => {
                self.events.set(self.barrier);
                info!("initialization done, barrier {:#x} released", self.barrier);
                self.phase = InitPhase::Done;
                TaskAction::Exit
            }
            InitPhase::Done => TaskAction::Exit,
        }
    }
}

/// Busy loop that toggles its actuator on every step and never suspends
/// after the barrier.
pub struct BlinkNoYield {
    led: SharedActuator,
    barrier: Barrier,
    passed: bool,
    counter: u32,
}

impl BlinkNoYield {
    pub fn new(led: SharedActuator, barrier: Barrier) -> Self {
        Self {
            led,
            barrier,
            passed: false,
            counter: 0,
        }
    }
}

impl Task for BlinkNoYield {
    fn step(&mut self, _ctx: &mut TaskContext) -> TaskAction {
        if !self.passed {
            self.passed = true;
            return self.barrier.wait();
        }
        self.led.lock().set(self.counter % 2 == 1);
        self.counter = self.counter.wrapping_add(1);
        TaskAction::Continue
    }
}

/// Periodic loop: toggle, optionally publish a status bit, report to the
/// queue, sleep.
///
/// A zero period degenerates into a yield after each iteration.
pub struct Blink {
    led: SharedActuator,
    barrier: Barrier,
    queue: HandoffQueue<Message>,
    id: u32,
    period: Duration,
    publish: Option<EventBits>,
    passed: bool,
    counter: u32,
}

impl Blink {
    pub fn new(
        led: SharedActuator,
        barrier: Barrier,
        queue: &HandoffQueue<Message>,
        id: u32,
        period: Duration,
    ) -> Self {
        Self {
            led,
            barrier,
            queue: queue.clone(),
            id,
            period,
            publish: None,
            passed: false,
            counter: 0,
        }
    }

    /// Mirrors the actuator state into `bit` of the barrier's event group.
    ///
    /// The update is masked, so other bits in the register are left alone.
    pub fn publishing(mut self, bit: EventBits) -> Self {
        self.publish = Some(bit);
        self
    }
}

impl Task for Blink {
    fn step(&mut self, _ctx: &mut TaskContext) -> TaskAction {
        if !self.passed {
            self.passed = true;
            return self.barrier.wait();
        }
        let on = self.counter % 2 == 1;
        if let Some(bit) = self.publish {
            let value = if on { bit } else { 0 };
            self.barrier.events.set_masked(value, bit);
        }
        self.led.lock().set(on);
        self.queue.push(Message::new(self.id, self.counter));
        self.counter = self.counter.wrapping_add(1);
        TaskAction::Sleep(self.period)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventStage {
    Barrier,
    Trigger,
    Run,
    Rearmed,
}

/// Loop that runs only while a trigger bit is published.
///
/// After the barrier it waits for `trigger`. From then on every odd
/// iteration first waits for `trigger` again with reset, so the loop
/// advances once per trigger edge instead of free-running while the bit
/// stays set. That reset clears the whole register, barrier bits included.
pub struct BlinkEvent {
    led: SharedActuator,
    barrier: Barrier,
    trigger: EventBits,
    queue: HandoffQueue<Message>,
    id: u32,
    period: Duration,
    stage: EventStage,
    counter: u32,
}

impl BlinkEvent {
    pub fn new(
        led: SharedActuator,
        barrier: Barrier,
        trigger: EventBits,
        queue: &HandoffQueue<Message>,
        id: u32,
        period: Duration,
    ) -> Self {
        Self {
            led,
            barrier,
            trigger,
            queue: queue.clone(),
            id,
            period,
            stage: EventStage::Barrier,
            counter: 0,
        }
    }

    fn wait_trigger(&self, reset: bool) -> TaskAction {
        TaskAction::wait_events(&self.barrier.events, self.trigger, reset, Timeout::Forever)
    }

    fn work(&mut self) -> TaskAction {
        self.led.lock().set(self.counter % 2 == 1);
        self.queue.push(Message::new(self.id, self.counter));
        self.counter = self.counter.wrapping_add(1);
        TaskAction::Sleep(self.period)
    }
}

impl Task for BlinkEvent {
    fn step(&mut self, _ctx: &mut TaskContext) -> TaskAction {
        match self.stage {
            EventStage::Barrier => {
                self.stage = EventStage::Trigger;
                self.barrier.wait()
            }
            EventStage::Trigger => {
                self.stage = EventStage::Run;
                self.wait_trigger(false)
            }
            EventStage::Run if self.counter % 2 == 1 => {
                self.stage = EventStage::Rearmed;
                self.wait_trigger(true)
            }
            EventStage::Rearmed => {
                self.stage = EventStage::Run;
                self.work()
            }
            EventStage::Run => self.work(),
        }
    }
}

/// Sole consumer of the handoff queue.
///
/// Drains every available message without yielding, then blocks until the
/// next push.
pub struct Consumer {
    queue: HandoffQueue<Message>,
    sink: Box<dyn MessageSink>,
    delivered: u64,
}

impl Consumer {
    pub fn new(queue: &HandoffQueue<Message>, sink: impl MessageSink + 'static) -> Self {
        Self {
            queue: queue.clone(),
            sink: Box::new(sink),
            delivered: 0,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl Task for Consumer {
    fn step(&mut self, _ctx: &mut TaskContext) -> TaskAction {
        match self.queue.try_pop() {
            Ok(message) => {
                self.sink.deliver(message);
                self.delivered += 1;
                TaskAction::Continue
            }
            Err(_) => TaskAction::wait_queue(&self.queue, Timeout::Forever),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{shared, Journal, MockActuator, Operation};
    use crate::task::{Priority, TaskId};
    use crate::time::Ticks;

    fn ctx() -> TaskContext {
        TaskContext::new(TaskId(0), Priority(7), 0 as Ticks, Duration::from_millis(1), 0, None)
    }

    fn mock_leds(journal: &Journal, count: u8) -> Vec<SharedActuator> {
        (0..count).map(|pin| shared(MockActuator::new(pin, journal.clone()))).collect()
    }

    #[test]
    fn initializer_runs_light_show_then_releases() {
        let journal = Journal::new();
        let events = EventGroup::new();
        let mut init = Initializer::new(mock_leds(&journal, 2), &events, 0x1);
        let mut ctx = ctx();

        let mut sleeps = Vec::new();
        loop {
            match init.step(&mut ctx) {
                TaskAction::Sleep(d) => sleeps.push(d.as_millis()),
                TaskAction::Exit => break,
                other => panic!("unexpected action {other:?}"),
            }
            assert_eq!(events.get(), 0, "barrier released early");
        }

        assert_eq!(sleeps, vec![200, 200, 500, 200, 200, 500]);
        assert_eq!(events.get(), 0x1);
        let pins: Vec<_> = journal.entries().iter().map(|e| (e.pin, e.op)).collect();
        assert_eq!(
            pins,
            vec![
                (0, Operation::Configure(Direction::Output)),
                (0, Operation::Set(true)),
                (1, Operation::Configure(Direction::Output)),
                (1, Operation::Set(true)),
                (1, Operation::Set(false)),
                (0, Operation::Set(false)),
            ]
        );
    }

    #[test]
    fn initializer_exits_without_release_on_missing_device() {
        let journal = Journal::new();
        let events = EventGroup::new();
        let leds = vec![
            shared(MockActuator::new(0, journal.clone())),
            shared(MockActuator::new(1, journal.clone()).not_ready()),
        ];
        let mut init = Initializer::new(leds, &events, 0x1);
        let mut ctx = ctx();

        assert!(matches!(init.step(&mut ctx), TaskAction::Sleep(_)));
        assert!(matches!(init.step(&mut ctx), TaskAction::Exit));
        assert!(matches!(init.step(&mut ctx), TaskAction::Exit));
        assert_eq!(events.get(), 0);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn initializer_exits_on_rejected_configuration() {
        let journal = Journal::new();
        let events = EventGroup::new();
        let leds = vec![shared(MockActuator::new(0, journal.clone()).rejecting(-22))];
        let mut init = Initializer::new(leds, &events, 0x1);

        assert!(matches!(init.step(&mut ctx()), TaskAction::Exit));
        assert_eq!(events.get(), 0);
        assert!(journal.is_empty());
    }

    #[test]
    fn blink_publishes_masked_and_reports() {
        let journal = Journal::new();
        let events = EventGroup::with_bits(0x1);
        let queue = HandoffQueue::new();
        let led = shared(MockActuator::new(1, journal.clone()));
        let mut blink = Blink::new(led, Barrier::new(&events, 0x1), &queue, 1, Duration::from_secs(1))
            .publishing(0x2);
        let mut ctx = ctx();

        assert!(matches!(blink.step(&mut ctx), TaskAction::WaitEvents { bits: 0x1, reset: false, .. }));

        assert!(matches!(blink.step(&mut ctx), TaskAction::Sleep(_)));
        assert_eq!(events.get(), 0x1);
        assert!(matches!(blink.step(&mut ctx), TaskAction::Sleep(_)));
        assert_eq!(events.get(), 0x3);
        assert!(matches!(blink.step(&mut ctx), TaskAction::Sleep(_)));
        assert_eq!(events.get(), 0x1);

        let counters: Vec<_> = std::iter::from_fn(|| queue.try_pop().ok()).collect();
        assert_eq!(counters, vec![Message::new(1, 0), Message::new(1, 1), Message::new(1, 2)]);
    }

    #[test]
    fn blink_event_rearms_on_odd_iterations() {
        let journal = Journal::new();
        let events = EventGroup::new();
        let queue = HandoffQueue::new();
        let led = shared(MockActuator::new(2, journal));
        let mut blink = BlinkEvent::new(led, Barrier::new(&events, 0x1), 0x2, &queue, 2, Duration::from_millis(200));
        let mut ctx = ctx();

        assert!(matches!(blink.step(&mut ctx), TaskAction::WaitEvents { bits: 0x1, reset: false, .. }));
        assert!(matches!(blink.step(&mut ctx), TaskAction::WaitEvents { bits: 0x2, reset: false, .. }));
        assert!(matches!(blink.step(&mut ctx), TaskAction::Sleep(_)));
        assert!(matches!(blink.step(&mut ctx), TaskAction::WaitEvents { bits: 0x2, reset: true, .. }));
        assert!(matches!(blink.step(&mut ctx), TaskAction::Sleep(_)));
        assert!(matches!(blink.step(&mut ctx), TaskAction::Sleep(_)));
        assert!(matches!(blink.step(&mut ctx), TaskAction::WaitEvents { bits: 0x2, reset: true, .. }));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn noyield_never_suspends_after_barrier() {
        let journal = Journal::new();
        let events = EventGroup::new();
        let led = shared(MockActuator::new(3, journal.clone()));
        let mut busy = BlinkNoYield::new(led, Barrier::new(&events, 0x1));
        let mut ctx = ctx();

        assert!(matches!(busy.step(&mut ctx), TaskAction::WaitEvents { .. }));
        for _ in 0..5 {
            assert!(matches!(busy.step(&mut ctx), TaskAction::Continue));
        }
        assert_eq!(journal.len(), 5);
    }

    #[test]
    fn consumer_drains_then_waits() {
        let queue = HandoffQueue::new();
        let seen = std::sync::Arc::new(crate::sync::Mutex::new(Vec::new()));
        let probe = std::sync::Arc::clone(&seen);
        let mut consumer = Consumer::new(&queue, move |m: Message| probe.lock().push(m));
        let mut ctx = ctx();

        queue.push(Message::new(0, 0));
        queue.push(Message::new(1, 0));
        assert!(matches!(consumer.step(&mut ctx), TaskAction::Continue));
        assert!(matches!(consumer.step(&mut ctx), TaskAction::Continue));
        assert!(matches!(consumer.step(&mut ctx), TaskAction::WaitPending { .. }));

        assert_eq!(consumer.delivered(), 2);
        assert_eq!(seen.lock().as_slice(), &[Message::new(0, 0), Message::new(1, 0)]);
    }
}
