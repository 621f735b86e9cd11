//! Warden Merge - Layered configuration merge engine
//!
//! Combines a template layer with a concrete override layer into one
//! effective configuration bundle. Every function here is pure: no I/O, no
//! errors at merge time. Malformed input is caught afterwards by
//! [`validation`].
//!
//! ## Field rules
//!
//! | Kind | Rule |
//! |---|---|
//! | Scalar | override wins if non-empty, else base |
//! | Optional | override wins if set, else base as-is |
//! | List without key | base followed by override |
//! | Keyed list | base order kept, override replaces in place or appends |
//! | Map | shallow union, override wins |

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod credentials;
pub mod merge;
pub mod rules;
pub mod validation;

pub use credentials::{flatten_bindings, merge_credentials, CredentialBinding};
pub use merge::{merge, merge_agent, merge_personality};
pub use validation::{
    validate_bundle, validate_instance, validate_personality, Result, ValidationError,
};
