//! Warden Controller - Reconciliation for agent instances
//!
//! Three controllers share one runtime:
//!
//! - [`InstanceReconciler`] converges an instance's namespace, credentials,
//!   rendered configuration, workload, service and tool-directory entry
//! - [`PersonalityReconciler`] validates templates and counts their users
//! - [`McpServerReconciler`] validates shared tool integrations and the
//!   secrets they bind
//!
//! Each is driven by a [`Controller`]: watch events are mapped to keys,
//! deduplicated in a [`WorkQueue`], and handed to a pool of workers.
//! Failed passes back off exponentially according to their [`RetryClass`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod conditions;
pub mod config;
pub mod error;
pub mod events;
pub mod gc;
pub mod integrations;
pub mod mcp_server;
pub mod personality;
pub mod reconciler;
pub mod resources;
pub mod runtime;

pub use config::ControllerConfig;
pub use error::{Action, ReconcileError, Result, RetryClass};
pub use events::{EventRecorder, EventType, RecordedEvent};
pub use gc::SecretCollector;
pub use integrations::{McpResolver, ResolvedIntegrations};
pub use mcp_server::{validate_server, McpServerReconciler};
pub use personality::PersonalityReconciler;
pub use reconciler::InstanceReconciler;
pub use runtime::{Controller, Reconcile, WorkQueue};
