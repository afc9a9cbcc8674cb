/*!
# Resman Simulator

The collaborators the coordinator talks to: a shared virtual clock and the
worker units that request and release resources.

## Key Components:
- **Virtual Clock:** Simulated time with nanosecond precision, advanced only by the coordinator and
  published to sleeping workers.
- **Worker:** One tokio task per admitted process, driven by a seeded RNG.
*/

pub mod virtual_clock;
pub mod worker;

pub use virtual_clock::VirtualClock;
pub use worker::{Worker, WorkerChannels, WorkerError, WorkerExit, WorkerProgress, WorkerSpec};
