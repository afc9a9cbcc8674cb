#[macro_use]
extern crate criterion;

use criterion::Criterion;

use resman_core::deadlock::detect;
use resman_core::prelude::{ProcessId, ResourceId, SimTime, SlotIndex};
use resman_core::SimulationState;

/// Every slot holds one unit of its own type and waits on the next one.
fn ring_state(slots: usize) -> SimulationState {
    let mut state = SimulationState::new(slots, 1, slots);
    for pid in 0..slots {
        state
            .admit(ProcessId(pid as u64), SimTime::default())
            .unwrap();
        state.request(SlotIndex(pid), ResourceId(pid)).unwrap();
    }
    for pid in 0..slots {
        state
            .request(SlotIndex(pid), ResourceId((pid + 1) % slots))
            .unwrap();
    }
    state.drain_events();
    state
}

/// Slot i waits on what slot i + 1 holds; only the last can finish, forcing restarts.
fn chain_state(slots: usize) -> SimulationState {
    let mut state = SimulationState::new(slots, 1, slots);
    for pid in 0..slots {
        state
            .admit(ProcessId(pid as u64), SimTime::default())
            .unwrap();
    }
    for pid in (0..slots).rev() {
        state.request(SlotIndex(pid), ResourceId(pid)).unwrap();
        if pid > 0 {
            state.request(SlotIndex(pid - 1), ResourceId(pid)).unwrap();
        }
    }
    state.drain_events();
    state
}

fn bench_detector(c: &mut Criterion) {
    let mut group = c.benchmark_group("deadlock_detection");

    for slots in [4, 18, 64] {
        group.throughput(criterion::Throughput::Elements(slots as u64));
        let ring = ring_state(slots);
        group.bench_function(format!("ring_{}", slots), |b| {
            b.iter(|| detect(&ring));
        });
        let chain = chain_state(slots);
        group.bench_function(format!("chain_{}", slots), |b| {
            b.iter(|| detect(&chain));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detector);
criterion_main!(benches);
