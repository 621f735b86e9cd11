//! Warden Store - Object store contract
//!
//! The reconciler talks to the cluster control plane only through the
//! [`ObjectStore`] trait: typed CRUD, label-selector listing, optimistic
//! concurrency on writes, and a watch stream. [`InMemoryStore`] backs tests
//! and the standalone daemon.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use api::{Api, OperationResult};
pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, StoreOp};
pub use object::DynamicObject;
pub use traits::{ObjectStore, WatchEvent, WatchEventType};
