//! The registry handle shared by the env, conf and release operations.

use std::sync::Arc;

use tracing::debug;
use warpgrid_keys::KeyTemplates;
use warpgrid_tree::{Node, Tree, TreeError};

use crate::error::{Conflict, RegistryError, RegistryResult};
use crate::revision::Revision;

/// Typed access to the records WarpGrid keeps in the coordination tree.
///
/// Cheap to clone; clones share the tree handle and templates.
pub struct Registry<T> {
    pub(crate) tree: Arc<T>,
    pub(crate) templates: Arc<KeyTemplates>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            templates: Arc::clone(&self.templates),
        }
    }
}

impl<T: Tree> Registry<T> {
    pub fn new(tree: Arc<T>, templates: Arc<KeyTemplates>) -> Self {
        Self { tree, templates }
    }

    pub fn tree(&self) -> &Arc<T> {
        &self.tree
    }

    /// Read a node, mapping a missing node to [`RegistryError::NotFound`].
    pub(crate) async fn node(&self, path: &str) -> RegistryResult<Node> {
        match self.tree.get(path).await {
            Ok(node) => Ok(node),
            Err(TreeError::NotFound(_)) => Err(RegistryError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a directory node that must not exist yet.
    pub(crate) async fn create_exclusive(&self, path: &str, value: &str) -> RegistryResult<Node> {
        match self.tree.create(path, value.as_bytes()).await {
            Ok(node) => Ok(node),
            Err(TreeError::AlreadyExists(_)) => Err(RegistryError::Conflict {
                path: path.to_string(),
                conflict: Conflict::Exists,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `value` at `path`, creating the node if needed.
    pub(crate) async fn upsert(&self, path: &str, value: &str) -> RegistryResult<Node> {
        match self.tree.create(path, value.as_bytes()).await {
            Ok(node) => Ok(node),
            Err(TreeError::AlreadyExists(_)) => {
                let node = self.node(path).await?;
                debug!(path, "replacing existing value");
                Ok(self.tree.set(&node, value.as_bytes()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Fail with a revision conflict unless `node` is still at `expected`.
pub(crate) fn check_revision(node: &Node, expected: Revision) -> RegistryResult<()> {
    let actual = Revision::from(node);
    if actual == expected {
        return Ok(());
    }
    Err(RegistryError::Conflict {
        path: node.path.clone(),
        conflict: Conflict::Revision { expected, actual },
    })
}

/// A node's value as UTF-8 text.
pub(crate) fn decode(node: &Node) -> RegistryResult<String> {
    String::from_utf8(node.value.clone()).map_err(|e| RegistryError::Decode {
        path: node.path.clone(),
        reason: e.to_string(),
    })
}
