//! Four-LED coordination sample on mock actuators.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rtcoord::actuator::shared;
use rtcoord::{BlinkyConfig, BusyPlacement, Journal, Kernel, KernelConfig, LogSink, MockActuator};
use rtcoord_posix::{Pacing, PosixRuntime};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Busy {
    Lower,
    Equal,
    Higher,
}

impl From<Busy> for BusyPlacement {
    fn from(value: Busy) -> Self {
        match value {
            Busy::Lower => BusyPlacement::Lower,
            Busy::Equal => BusyPlacement::Equal,
            Busy::Higher => BusyPlacement::Higher,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Event-group and handoff-queue blinky sample")]
struct Opts {
    /// Kernel time to simulate.
    #[arg(long, default_value_t = 10_000, value_name = "MS")]
    duration_ms: u64,

    /// Length of one kernel tick.
    #[arg(long, default_value_t = 1_000, value_name = "US")]
    tick_us: u64,

    /// Task steps the simulated CPU executes per tick.
    #[arg(long, default_value_t = 16)]
    steps_per_tick: u32,

    /// Priority of the busy LED3 task relative to the other LEDs.
    #[arg(long, value_enum, default_value_t = Busy::Lower)]
    busy: Busy,

    /// Let LED3 yield after every toggle instead of spinning.
    #[arg(long)]
    busy_yields: bool,

    /// Pace ticks to the wall clock.
    #[arg(long)]
    realtime: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_logging(&opts.log_level);

    let kernel_config = KernelConfig::builder()
        .name("blinky")
        .tick_period(Duration::from_micros(opts.tick_us))
        .steps_per_tick(opts.steps_per_tick)
        .build();
    let blinky = BlinkyConfig {
        busy_placement: opts.busy.into(),
        busy_yields: opts.busy_yields,
        ..BlinkyConfig::default()
    };

    let journal = Journal::new();
    let leds = core::array::from_fn(|pin| shared(MockActuator::new(pin as u8, journal.clone())));
    let (builder, system) = blinky
        .install(Kernel::with_config(kernel_config), leds, LogSink)
        .context("failed to assemble task table")?;

    let pacing = if opts.realtime {
        Pacing::Realtime
    } else {
        Pacing::FreeRunning
    };
    let mut runtime = PosixRuntime::with_builder(builder, pacing).context("failed to start kernel")?;
    runtime
        .install_ctrlc()
        .context("failed to install Ctrl-C handler")?;

    info!(?pacing, busy = ?opts.busy, busy_yields = opts.busy_yields, "starting");
    let summary = runtime.run_for(Duration::from_millis(opts.duration_ms));
    info!(
        ticks = summary.ticks,
        wall_ms = summary.wall.as_millis() as u64,
        stopped = summary.stopped,
        events = system.events.get(),
        actuator_ops = journal.len(),
        "run finished"
    );

    let kernel = runtime.kernel();
    for id in kernel.task_ids() {
        let stats = kernel.stats(id)?;
        info!(task = id.0, priority = stats.priority.0, state = ?stats.state, steps = stats.steps, "task");
    }
    Ok(())
}
