//! Backend health: the exclusion state machine and its recovery paths.

mod sweeper;
mod tracker;

pub use sweeper::RecoverySweeper;
pub use tracker::{HealthConfig, HealthTracker};
