#![forbid(unsafe_code)]

//! The capability-gated security layer.
//!
//! Every effectful operation in the runtime passes through here: a
//! [`CapabilitySet`] of named tokens granted once at startup, a filesystem
//! guard confining paths to the working directory, and a URL guard rejecting
//! requests that would reach internal address space. Violations are final —
//! the layer never retries or downgrades a denied operation.

mod capability;
mod guard;
mod violation;

pub use capability::{CAPS_ENV, Capability, CapabilitySet, GRANT_ALL_ENV};
pub use guard::{PROTECTED_PATHS, Sandbox};
pub use violation::SandboxViolation;
