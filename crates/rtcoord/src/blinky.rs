//! The four-LED sample system.
//!
//! One initializer (priority 0) owns the hardware until it sets
//! [`INIT_DONE`]. A consumer (priority 1) prints every report. Three LED
//! loops run at priority 7:
//!
//! | task | behavior | period | notes |
//! |------|----------|--------|-------|
//! | LED0 | [`Blink`] | 100 ms | |
//! | LED1 | [`Blink`] | 1000 ms | starts after 5 s, publishes [`LED1_ON`] |
//! | LED2 | [`BlinkEvent`] | 200 ms | advances on [`LED1_ON`] |
//!
//! LED3 is the busy task used to demonstrate preemption; see
//! [`BusyPlacement`].

use core::time::Duration;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::actuator::SharedActuator;
use crate::behaviors::{Barrier, Blink, BlinkEvent, BlinkNoYield, Consumer, InitTiming, Initializer};
use crate::error::KernelError;
use crate::event_group::{EventBits, EventGroup};
use crate::kernel::KernelBuilder;
use crate::message::{Message, MessageSink};
use crate::queue::HandoffQueue;
use crate::task::{Priority, TaskConfig, TaskId};

/// Startup barrier.
pub const INIT_DONE: EventBits = 1;
/// Mirrors the state of LED1.
pub const LED1_ON: EventBits = 2;

pub const LED_COUNT: usize = 4;

pub const LED0_TASK: TaskId = TaskId(0);
pub const LED1_TASK: TaskId = TaskId(1);
pub const LED2_TASK: TaskId = TaskId(2);
pub const LED3_TASK: TaskId = TaskId(3);
pub const CONSUMER_TASK: TaskId = TaskId(4);
pub const INIT_TASK: TaskId = TaskId(5);

/// Priority of the busy LED3 task relative to the other LED loops.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPlacement {
    /// One level below: preempted whenever a LED loop wakes.
    #[default]
    Lower,
    /// Same level: a non-yielding busy task starves its peers.
    Equal,
    /// One level above: the LED loops never run.
    Higher,
}

impl BusyPlacement {
    pub fn priority(self, leds: Priority) -> Priority {
        match self {
            Self::Lower => leds.lower(),
            Self::Equal => leds,
            Self::Higher => leds.higher(),
        }
    }
}

/// Task table of the sample system.
#[derive(Debug, Clone)]
pub struct BlinkyConfig {
    pub init_priority: Priority,
    pub consumer_priority: Priority,
    pub led_priority: Priority,
    /// Periods of LED0, LED1 and LED2.
    pub periods: [Duration; 3],
    pub led1_start_delay: Duration,
    pub init_timing: InitTiming,
    pub busy_placement: BusyPlacement,
    /// Run LED3 as a periodic loop with a zero period, yielding after every
    /// iteration, instead of the non-yielding loop.
    pub busy_yields: bool,
}

impl Default for BlinkyConfig {
    fn default() -> Self {
        Self {
            init_priority: Priority(0),
            consumer_priority: Priority(1),
            led_priority: Priority(7),
            periods: [
                Duration::from_millis(100),
                Duration::from_millis(1000),
                Duration::from_millis(200),
            ],
            led1_start_delay: Duration::from_millis(5000),
            init_timing: InitTiming::default(),
            busy_placement: BusyPlacement::Lower,
            busy_yields: false,
        }
    }
}

/// Shared objects of an assembled system.
#[derive(Debug, Clone)]
pub struct Blinky {
    pub events: EventGroup,
    pub queue: HandoffQueue<Message>,
}

impl BlinkyConfig {
    /// Registers all six tasks on `kernel`.
    ///
    /// `leds` are handed to the initializer and to the LED loops in index
    /// order. The returned handles let the caller observe the register and
    /// the queue.
    pub fn install(
        &self,
        kernel: KernelBuilder,
        leds: [SharedActuator; LED_COUNT],
        sink: impl MessageSink + 'static,
    ) -> Result<(KernelBuilder, Blinky), KernelError> {
        let events = EventGroup::new();
        let queue = HandoffQueue::new();
        let barrier = Barrier::new(&events, INIT_DONE);
        let [led0, led1, led2, led3] = leds.clone();
        let [p0, p1, p2] = self.periods;

        let busy_priority = self.busy_placement.priority(self.led_priority);
        let busy = if self.busy_yields {
            TaskConfig::new(
                LED3_TASK,
                busy_priority,
                Blink::new(led3, barrier.clone(), &queue, 3, Duration::ZERO),
            )
        } else {
            TaskConfig::new(LED3_TASK, busy_priority, BlinkNoYield::new(led3, barrier.clone()))
        };

        let kernel = kernel
            .register(
                TaskConfig::new(
                    INIT_TASK,
                    self.init_priority,
                    Initializer::new(leds.to_vec(), &events, INIT_DONE).with_timing(self.init_timing),
                )
                .with_name("init"),
            )?
            .register(
                TaskConfig::new(CONSUMER_TASK, self.consumer_priority, Consumer::new(&queue, sink))
                    .with_name("uart_out"),
            )?
            .register(
                TaskConfig::new(
                    LED0_TASK,
                    self.led_priority,
                    Blink::new(led0, barrier.clone(), &queue, 0, p0),
                )
                .with_name("blink0"),
            )?
            .register(
                TaskConfig::new(
                    LED1_TASK,
                    self.led_priority,
                    Blink::new(led1, barrier.clone(), &queue, 1, p1).publishing(LED1_ON),
                )
                .with_name("blink1")
                .with_start_delay(self.led1_start_delay),
            )?
            .register(
                TaskConfig::new(
                    LED2_TASK,
                    self.led_priority,
                    BlinkEvent::new(led2, barrier, LED1_ON, &queue, 2, p2),
                )
                .with_name("blink2"),
            )?
            .register(busy.with_name("blink3"))?;

        Ok((kernel, Blinky { events, queue }))
    }
}
