mod scheduling;

use std::sync::Arc;

use crate::actuator::{shared, Journal, MockActuator, SharedActuator};
use crate::blinky::{Blinky, BlinkyConfig, LED_COUNT};
use crate::kernel::Kernel;
use crate::message::Message;
use crate::sync::Mutex;

/// A sample system on mock LEDs with a recording consumer.
struct Harness {
    kernel: Kernel,
    system: Blinky,
    journal: Journal,
    delivered: Arc<Mutex<Vec<Message>>>,
}

impl Harness {
    fn new(config: BlinkyConfig) -> Self {
        let journal = Journal::new();
        let leds: [SharedActuator; LED_COUNT] =
            core::array::from_fn(|pin| shared(MockActuator::new(pin as u8, journal.clone())));
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let probe = Arc::clone(&delivered);

        let (builder, system) = config
            .install(Kernel::builder(), leds, move |m: Message| probe.lock().push(m))
            .expect("install blinky");
        let mut kernel = builder.build();
        kernel.start().expect("start");

        Self {
            kernel,
            system,
            journal,
            delivered,
        }
    }

    /// Counters reported by one producer, in delivery order.
    fn counters(&self, producer: u32) -> Vec<u32> {
        self.delivered
            .lock()
            .iter()
            .filter(|m| m.producer == producer)
            .map(|m| m.counter)
            .collect()
    }
}
