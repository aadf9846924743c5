//! POSIX host port for rtcoord.
//!
//! [`PosixRuntime`] owns a started [`Kernel`] and feeds it ticks, either as
//! fast as the host allows or paced to the monotonic clock. Pacing sleeps
//! until absolute tick deadlines, so a slow tick does not push every later
//! tick back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use rtcoord::time::duration_to_ticks;
use rtcoord::{Kernel, KernelBuilder, KernelError, Ticks};

/// How kernel ticks map onto host time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Run ticks back to back.
    #[default]
    FreeRunning,
    /// One tick per configured tick period of wall-clock time.
    Realtime,
}

/// Cloneable request to stop a running [`PosixRuntime`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Outcome of [`PosixRuntime::run_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed in this run.
    pub ticks: Ticks,
    /// Wall-clock time the run took.
    pub wall: Duration,
    /// True if the run ended through the stop handle.
    pub stopped: bool,
}

pub struct PosixRuntime {
    kernel: Kernel,
    pacing: Pacing,
    stop: StopHandle,
}

impl PosixRuntime {
    pub fn new(kernel: Kernel, pacing: Pacing) -> Self {
        Self {
            kernel,
            pacing,
            stop: StopHandle::default(),
        }
    }

    /// Builds and starts the kernel.
    pub fn with_builder(builder: KernelBuilder, pacing: Pacing) -> Result<Self, KernelError> {
        let mut kernel = builder.build();
        kernel.start()?;
        Ok(Self::new(kernel, pacing))
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Routes Ctrl-C to the stop handle. Can be installed once per process.
    pub fn install_ctrlc(&self) -> Result<(), ctrlc::Error> {
        let stop = self.stop_handle();
        ctrlc::set_handler(move || {
            info!("interrupt received, stopping");
            stop.stop();
        })
    }

    /// Runs the kernel for `duration` of kernel time or until stopped.
    pub fn run_for(&mut self, duration: Duration) -> RunSummary {
        let period = self.kernel.config().tick_period;
        let total = duration_to_ticks(duration, period);
        debug!("running {total} ticks ({:?})", self.pacing);

        let start = Instant::now();
        let mut next_tick = start;
        let mut ticks = 0;
        while ticks < total {
            if self.stop.is_stopped() {
                break;
            }
            self.kernel.run_tick();
            ticks += 1;

            if self.pacing == Pacing::Realtime {
                next_tick += period;
                let now = Instant::now();
                if next_tick > now {
                    thread::sleep(next_tick - now);
                }
            }
        }

        RunSummary {
            ticks,
            wall: start.elapsed(),
            stopped: self.stop.is_stopped(),
        }
    }
}
