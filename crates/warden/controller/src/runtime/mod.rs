//! Controller runtime: work queue and worker pool

mod controller;
mod queue;

pub use controller::{Controller, Reconcile};
pub use queue::WorkQueue;
