use super::Harness;
use crate::blinky::{BlinkyConfig, BusyPlacement, LED0_TASK, LED3_TASK};
use crate::task::TaskState;

fn busy(placement: BusyPlacement, yields: bool) -> Harness {
    Harness::new(BlinkyConfig {
        busy_placement: placement,
        busy_yields: yields,
        ..BlinkyConfig::default()
    })
}

#[test]
fn lower_priority_busy_task_is_preempted_every_period() {
    let mut h = busy(BusyPlacement::Lower, false);

    h.kernel.run_ticks(3600);

    assert_eq!(h.counters(0), (0..10).collect::<Vec<_>>());
    let stats = h.kernel.stats(LED3_TASK).expect("stats");
    assert_eq!(stats.state, TaskState::Ready);
    assert!(stats.steps > 1000, "busy task got {} steps", stats.steps);
}

#[test]
fn equal_priority_busy_task_starves_peers() {
    let mut h = busy(BusyPlacement::Equal, false);

    h.kernel.run_ticks(4500);

    // LED0 gets its first iteration in before the busy task is released.
    assert_eq!(h.counters(0), vec![0]);
    assert!(h.kernel.stats(LED3_TASK).expect("stats").steps > 1000);
}

#[test]
fn equal_priority_yielding_task_shares_the_level() {
    let mut h = busy(BusyPlacement::Equal, true);

    h.kernel.run_ticks(3600);

    assert_eq!(h.counters(0), (0..10).collect::<Vec<_>>());
    assert!(h.counters(3).len() > 100);
}

#[test]
fn higher_priority_busy_task_locks_out_leds() {
    for yields in [false, true] {
        let mut h = busy(BusyPlacement::Higher, yields);

        h.kernel.run_ticks(4000);

        assert!(h.counters(0).is_empty(), "yields={yields}");
        assert_eq!(h.kernel.stats(LED0_TASK).expect("stats").steps, 1);
        assert_eq!(h.counters(3).is_empty(), !yields);
    }
}
