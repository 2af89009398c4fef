//! Run stemsplit computations as normal processes on the local system.

pub mod spawner;

pub use spawner::LocalComputation;
