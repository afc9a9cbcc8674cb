//! ## resman-core::deadlock
//! **Deadlock detection and recovery**
//!
//! Detection and recovery share one definition of "stuck": the recovery loop
//! calls the same detector before every kill.

pub mod detector;
pub mod recovery;

pub use detector::{detect, DetectionReport};
pub use recovery::{
    recover, recover_step, ProcessReaper, RecoveryReport, Victim, VictimPolicy, VictimStrategy,
};
