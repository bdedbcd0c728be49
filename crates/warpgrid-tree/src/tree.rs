//! The store capability.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::TreeResult;
use crate::node::{Node, WatchEvent};

/// Boxed future returned by watch handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Called for every event on a watched path. Resolves to whether the
/// watch should stay installed.
pub type WatchHandler = Arc<dyn Fn(WatchEvent) -> BoxFuture<bool> + Send + Sync>;

/// Stop signal for a watch. Sending `true`, or dropping the sender, tears
/// the watch down. Teardown completes asynchronously.
pub type WatchStop = watch::Sender<bool>;

/// Operations WarpGrid needs from the coordination service.
///
/// Multi-node mutations are built from these primitives and are not atomic.
pub trait Tree: Send + Sync + 'static {
    /// Read one node. Fails with `NotFound` if it does not exist.
    fn get(&self, path: &str) -> impl Future<Output = TreeResult<Node>> + Send;

    /// Create a node, creating missing ancestors with empty values.
    /// Fails with `AlreadyExists` if the node exists.
    fn create(&self, path: &str, value: &[u8]) -> impl Future<Output = TreeResult<Node>> + Send;

    /// Replace a node's value.
    fn set(&self, node: &Node, value: &[u8]) -> impl Future<Output = TreeResult<Node>> + Send;

    /// Delete a node. Fails with `NotEmpty` if it still has children.
    fn delete(&self, node: &Node) -> impl Future<Output = TreeResult<()>> + Send;

    /// Depth-first walk over the descendants of `node`, in path order.
    /// The visitor returns `false` to skip a child's subtree.
    fn visit_children_recursive<F>(
        &self,
        node: &Node,
        visitor: F,
    ) -> impl Future<Output = TreeResult<()>> + Send
    where
        F: FnMut(&Node) -> bool + Send;

    /// Install a watch on `path` that stays armed across events.
    fn keep_watch(
        &self,
        path: &str,
        handler: WatchHandler,
    ) -> impl Future<Output = TreeResult<WatchStop>> + Send;
}

/// Direct children of `node`, in path order.
pub async fn children<T: Tree>(tree: &T, node: &Node) -> TreeResult<Vec<Node>> {
    let mut children = Vec::new();
    tree.visit_children_recursive(node, |child| {
        children.push(child.clone());
        false
    })
    .await?;
    Ok(children)
}
