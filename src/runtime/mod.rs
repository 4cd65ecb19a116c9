//! Runtime adapters implementing the task scheduling contract.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
