//! warpgrid-registry: environment, configuration and release records.
//!
//! [`Registry`] derives canonical paths through
//! [`warpgrid_keys::KeyTemplates`] and reads and writes them in a
//! [`warpgrid_tree::Tree`].
//!
//! # Optimistic concurrency
//!
//! Reads of a directory (an env root, a config tier) return its
//! [`Revision`], taken from the node's child modification counter.
//! Mutations take the revision the caller last saw and fail with
//! [`RegistryError::Conflict`] if it moved. The check happens once, before
//! the first write; the writes that follow are independent tree calls.
//!
//! Two limitations follow from this and are part of the contract:
//! - the revision moves when children are added or removed, not when a
//!   child's value changes, so two content-only edits do not conflict;
//! - a batch that fails midway is not rolled back. The error lists what was
//!   applied ([`RegistryError::PartiallyApplied`]) and callers re-read
//!   before retrying.

pub mod batch;
pub mod conf;
pub mod env;
pub mod error;
pub mod registry;
pub mod releases;
pub mod revision;

pub use batch::ChangeSummary;
pub use conf::{BaseScope, ConfChange, ConfObject, ConfScope, OverrideScope, Tier};
pub use env::{EnvChange, EnvList};
pub use error::{Conflict, RegistryError, RegistryResult};
pub use registry::Registry;
pub use revision::Revision;
pub use warpgrid_keys::ConfKind;
