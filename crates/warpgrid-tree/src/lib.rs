//! warpgrid-tree: the hierarchical key-value store the platform
//! coordinates through.
//!
//! The coordination service itself is external. This crate defines the
//! capability the rest of WarpGrid needs from it ([`Tree`]) and ships
//! [`MemoryTree`], an in-process implementation used by tests and local
//! development.
//!
//! # Model
//!
//! - Nodes are addressed by absolute `/`-separated paths and carry a byte
//!   value.
//! - Each node keeps a child modification counter (`child_version`) that
//!   moves whenever a direct child is created or deleted. Higher layers use
//!   it as an optimistic-concurrency revision.
//! - Watches are long-lived: [`Tree::keep_watch`] re-arms after every event
//!   until the handler returns `false` or the returned stop signal fires.

pub mod error;
pub mod memory;
pub mod node;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use memory::MemoryTree;
pub use node::{Node, WatchEvent, WatchEventKind};
pub use tree::{children, BoxFuture, Tree, WatchHandler, WatchStop};
