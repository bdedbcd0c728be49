//! Directory revisions used as write preconditions.

use std::fmt;

use serde::{Deserialize, Serialize};
use warpgrid_tree::Node;

/// Opaque, monotonically non-decreasing version of a directory node.
///
/// Callers echo it back unchanged on conditional writes; only equality is
/// meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl From<&Node> for Revision {
    fn from(node: &Node) -> Self {
        Self(node.child_version)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
