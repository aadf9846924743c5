//! Work item handed from producer tasks to the consumer.

use core::fmt;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One report from a producer: who sent it and that producer's running count.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    pub producer: u32,
    pub counter: u32,
}

impl Message {
    pub const fn new(producer: u32, counter: u32) -> Self {
        Self { producer, counter }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Toggled led{}; counter={}", self.producer, self.counter)
    }
}

/// Receiver of consumed messages, e.g. a console or a test recorder.
pub trait MessageSink: Send {
    fn deliver(&mut self, message: Message);
}

impl<F> MessageSink for F
where
    F: FnMut(Message) + Send,
{
    fn deliver(&mut self, message: Message) {
        self(message)
    }
}

/// Sink that reports every message through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn deliver(&mut self, message: Message) {
        log::info!("{message}");
    }
}
