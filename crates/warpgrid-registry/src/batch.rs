//! Planning and applying a set of child writes under one directory.

use serde::Serialize;
use tracing::debug;
use warpgrid_tree::{Node, Tree, TreeError};

use crate::error::{RegistryError, RegistryResult};

/// Counts of the writes a change performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Writes partitioned by kind, applied creates first, then updates, then
/// deletes. Stops at the first failure.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    creates: Vec<(String, Vec<u8>)>,
    updates: Vec<(Node, Vec<u8>)>,
    deletes: Vec<Node>,
    applied: Vec<String>,
}

impl Batch {
    /// A batch that only creates nodes, for a directory created by `root`.
    pub(crate) fn creating(root: &str, creates: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            creates,
            applied: vec![root.to_string()],
            ..Self::default()
        }
    }

    /// Read every target once to split writes into creates and updates.
    /// Deletes of absent nodes are dropped.
    pub(crate) async fn plan<T: Tree>(
        tree: &T,
        writes: Vec<(String, Vec<u8>)>,
        deletes: Vec<String>,
    ) -> RegistryResult<Self> {
        let mut batch = Self::default();
        for (path, value) in writes {
            match tree.get(&path).await {
                Ok(node) => batch.updates.push((node, value)),
                Err(TreeError::NotFound(_)) => batch.creates.push((path, value)),
                Err(e) => return Err(e.into()),
            }
        }
        for path in deletes {
            match tree.get(&path).await {
                Ok(node) => batch.deletes.push(node),
                Err(TreeError::NotFound(_)) => debug!(%path, "delete of absent key skipped"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(batch)
    }

    /// Paths of the existing nodes this batch will delete.
    pub(crate) fn delete_paths(&self) -> Vec<String> {
        self.deletes.iter().map(|node| node.path.clone()).collect()
    }

    pub(crate) async fn apply<T: Tree>(mut self, tree: &T) -> RegistryResult<ChangeSummary> {
        let summary = ChangeSummary {
            created: self.creates.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
        };

        for (path, value) in std::mem::take(&mut self.creates) {
            let result = tree.create(&path, &value).await.map(drop);
            self.record(path, result)?;
        }
        for (node, value) in std::mem::take(&mut self.updates) {
            let result = tree.set(&node, &value).await.map(drop);
            self.record(node.path, result)?;
        }
        for node in std::mem::take(&mut self.deletes) {
            let result = tree.delete(&node).await;
            self.record(node.path, result)?;
        }

        Ok(summary)
    }

    fn record(&mut self, path: String, result: Result<(), TreeError>) -> RegistryResult<()> {
        match result {
            Ok(()) => {
                self.applied.push(path);
                Ok(())
            }
            Err(source) if self.applied.is_empty() => Err(source.into()),
            Err(source) => Err(RegistryError::PartiallyApplied {
                applied: std::mem::take(&mut self.applied),
                failed: path,
                source,
            }),
        }
    }
}
