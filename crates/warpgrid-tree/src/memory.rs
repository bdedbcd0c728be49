//! In-process [`Tree`] for tests and local development.
//!
//! Semantics follow the coordination service closely enough for the
//! registry and watch layers: implicit ancestor creation, child
//! modification counters, non-recursive watches that fire for the node
//! itself and for changes to its direct children.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::error::{TreeError, TreeResult};
use crate::node::{Node, WatchEvent, WatchEventKind};
use crate::tree::{Tree, WatchHandler, WatchStop};

const ROOT: &str = "/";
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Default)]
struct Entry {
    value: Vec<u8>,
    version: u64,
    child_version: u64,
}

struct Shared {
    nodes: RwLock<BTreeMap<String, Entry>>,
    events: broadcast::Sender<WatchEvent>,
    active_watches: Arc<AtomicUsize>,
    /// Writes under this prefix fail with `TreeError::Backend`.
    failing_prefix: RwLock<Option<String>>,
}

/// Thread-safe in-memory tree. Clones share the same nodes.
#[derive(Clone)]
pub struct MemoryTree {
    shared: Arc<Shared>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Create an empty tree holding only the root node.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), Entry::default());
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            shared: Arc::new(Shared {
                nodes: RwLock::new(nodes),
                events,
                active_watches: Arc::new(AtomicUsize::new(0)),
                failing_prefix: RwLock::new(None),
            }),
        }
    }

    /// Number of watches whose delivery task is still running.
    pub fn active_watches(&self) -> usize {
        self.shared.active_watches.load(Ordering::SeqCst)
    }

    /// Deliver a disconnect event to every installed watch.
    pub fn disconnect(&self) {
        self.emit(WatchEvent::new(WatchEventKind::Disconnected, ""));
    }

    /// Make every write to a path starting with `prefix` fail.
    pub fn fail_writes_under(&self, prefix: &str) {
        *self.shared.failing_prefix.write().expect("tree lock") = Some(prefix.to_string());
    }

    /// Undo [`fail_writes_under`](Self::fail_writes_under).
    pub fn clear_failures(&self) {
        *self.shared.failing_prefix.write().expect("tree lock") = None;
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.shared.nodes.read().expect("tree lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    fn emit(&self, event: WatchEvent) {
        // No receivers simply means nobody is watching.
        let _ = self.shared.events.send(event);
    }

    fn check_writable(&self, path: &str) -> TreeResult<()> {
        let failing = self.shared.failing_prefix.read().expect("tree lock");
        match failing.as_deref() {
            Some(prefix) if path.starts_with(prefix) => {
                Err(TreeError::Backend(format!("injected failure writing {path}")))
            }
            _ => Ok(()),
        }
    }
}

fn validate(path: &str) -> TreeResult<()> {
    let valid = path == ROOT
        || (path.starts_with('/') && !path.ends_with('/') && !path.contains("//"));
    if valid {
        Ok(())
    } else {
        Err(TreeError::InvalidPath(path.to_string()))
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

fn child_prefix(path: &str) -> String {
    if path == ROOT {
        ROOT.to_string()
    } else {
        format!("{path}/")
    }
}

/// Direct children of `path`, in path order.
fn direct_children<'a>(nodes: &'a BTreeMap<String, Entry>, path: &str) -> Vec<&'a str> {
    let prefix = child_prefix(path);
    nodes
        .range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&prefix))
        .map(|(key, _)| key.as_str())
        .filter(|key| *key != ROOT && !key[prefix.len()..].contains('/'))
        .collect()
}

fn snapshot(nodes: &BTreeMap<String, Entry>, path: &str) -> TreeResult<Node> {
    let entry = nodes
        .get(path)
        .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
    Ok(Node {
        path: path.to_string(),
        value: entry.value.clone(),
        version: entry.version,
        child_version: entry.child_version,
        num_children: direct_children(nodes, path).len() as u32,
    })
}

fn visit(
    nodes: &BTreeMap<String, Entry>,
    path: &str,
    visitor: &mut impl FnMut(&Node) -> bool,
) -> TreeResult<()> {
    for child in direct_children(nodes, path) {
        let node = snapshot(nodes, child)?;
        if visitor(&node) {
            visit(nodes, child, visitor)?;
        }
    }
    Ok(())
}

impl Tree for MemoryTree {
    async fn get(&self, path: &str) -> TreeResult<Node> {
        validate(path)?;
        let nodes = self.shared.nodes.read().expect("tree lock");
        snapshot(&nodes, path)
    }

    async fn create(&self, path: &str, value: &[u8]) -> TreeResult<Node> {
        validate(path)?;
        self.check_writable(path)?;

        let mut events = Vec::new();
        let node = {
            let mut nodes = self.shared.nodes.write().expect("tree lock");
            if nodes.contains_key(path) {
                return Err(TreeError::AlreadyExists(path.to_string()));
            }

            // Collect missing ancestors, nearest first.
            let mut missing = vec![path];
            let mut cursor = path;
            while let Some(parent) = parent_of(cursor) {
                if nodes.contains_key(parent) {
                    break;
                }
                missing.push(parent);
                cursor = parent;
            }

            for created in missing.into_iter().rev() {
                let value = if created == path { value.to_vec() } else { Vec::new() };
                nodes.insert(
                    created.to_string(),
                    Entry {
                        value,
                        ..Entry::default()
                    },
                );
                if let Some(parent) = parent_of(created) {
                    if let Some(entry) = nodes.get_mut(parent) {
                        entry.child_version += 1;
                    }
                    events.push(WatchEvent::new(WatchEventKind::ChildrenChanged, parent));
                }
                events.push(WatchEvent::new(WatchEventKind::Created, created));
            }
            snapshot(&nodes, path)?
        };

        debug!(path, "node created");
        for event in events {
            self.emit(event);
        }
        Ok(node)
    }

    async fn set(&self, node: &Node, value: &[u8]) -> TreeResult<Node> {
        validate(&node.path)?;
        self.check_writable(&node.path)?;

        let updated = {
            let mut nodes = self.shared.nodes.write().expect("tree lock");
            let entry = nodes
                .get_mut(&node.path)
                .ok_or_else(|| TreeError::NotFound(node.path.clone()))?;
            entry.value = value.to_vec();
            entry.version += 1;
            snapshot(&nodes, &node.path)?
        };

        debug!(path = %node.path, "node set");
        self.emit(WatchEvent::new(WatchEventKind::Changed, node.path.as_str()));
        Ok(updated)
    }

    async fn delete(&self, node: &Node) -> TreeResult<()> {
        validate(&node.path)?;
        let Some(parent) = parent_of(&node.path) else {
            return Err(TreeError::InvalidPath(node.path.clone()));
        };
        self.check_writable(&node.path)?;

        {
            let mut nodes = self.shared.nodes.write().expect("tree lock");
            if !nodes.contains_key(&node.path) {
                return Err(TreeError::NotFound(node.path.clone()));
            }
            if !direct_children(&nodes, &node.path).is_empty() {
                return Err(TreeError::NotEmpty(node.path.clone()));
            }
            nodes.remove(&node.path);
            if let Some(entry) = nodes.get_mut(parent) {
                entry.child_version += 1;
            }
        }

        debug!(path = %node.path, "node deleted");
        self.emit(WatchEvent::new(WatchEventKind::Deleted, node.path.as_str()));
        self.emit(WatchEvent::new(WatchEventKind::ChildrenChanged, parent));
        Ok(())
    }

    async fn visit_children_recursive<F>(&self, node: &Node, mut visitor: F) -> TreeResult<()>
    where
        F: FnMut(&Node) -> bool + Send,
    {
        validate(&node.path)?;
        // Walk a copy so the visitor runs without the lock held.
        let nodes = {
            let nodes = self.shared.nodes.read().expect("tree lock");
            if !nodes.contains_key(&node.path) {
                return Err(TreeError::NotFound(node.path.clone()));
            }
            let prefix = child_prefix(&node.path);
            let mut subtree: BTreeMap<String, Entry> = nodes
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect();
            if let Some(entry) = nodes.get(&node.path) {
                subtree.insert(node.path.clone(), entry.clone());
            }
            subtree
        };
        visit(&nodes, &node.path, &mut visitor)
    }

    async fn keep_watch(&self, path: &str, handler: WatchHandler) -> TreeResult<WatchStop> {
        validate(path)?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut events = self.shared.events.subscribe();
        let active = Arc::clone(&self.shared.active_watches);
        let path = path.to_string();

        active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            debug!(%path, "watch armed");
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) if event.path == path || event.is_disconnect() => {
                            if !handler(event).await {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%path, skipped, "watch lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            active.fetch_sub(1, Ordering::SeqCst);
            debug!(%path, "watch released");
        });

        Ok(stop_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{children, BoxFuture};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn wait_for_watches(tree: &MemoryTree, expected: usize) {
        for _ in 0..100 {
            if tree.active_watches() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {expected} watches, found {}", tree.active_watches());
    }

    fn forwarding_handler(tx: mpsc::UnboundedSender<WatchEvent>) -> WatchHandler {
        Arc::new(move |event: WatchEvent| -> BoxFuture<bool> {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(event);
                true
            })
        })
    }

    #[tokio::test]
    async fn create_makes_ancestors_and_bumps_counters() {
        let tree = MemoryTree::new();
        tree.create("/prod/api/env/PORT", b"8080").await.unwrap();

        let env = tree.get("/prod/api/env").await.unwrap();
        assert_eq!(env.child_version, 1);
        assert_eq!(env.num_children, 1);
        assert!(env.value.is_empty());

        tree.create("/prod/api/env/HOST", b"db").await.unwrap();
        assert_eq!(tree.get("/prod/api/env").await.unwrap().child_version, 2);
        assert_eq!(tree.get("/prod/api/env/PORT").await.unwrap().value, b"8080");
    }

    #[tokio::test]
    async fn create_existing_fails() {
        let tree = MemoryTree::new();
        tree.create("/a", b"").await.unwrap();
        assert_eq!(
            tree.create("/a", b"x").await.unwrap_err(),
            TreeError::AlreadyExists("/a".to_string())
        );
    }

    #[tokio::test]
    async fn set_does_not_move_parent_counter() {
        let tree = MemoryTree::new();
        let node = tree.create("/a/b", b"1").await.unwrap();
        let before = tree.get("/a").await.unwrap().child_version;

        let updated = tree.set(&node, b"2").await.unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.value, b"2");
        assert_eq!(tree.get("/a").await.unwrap().child_version, before);
    }

    #[tokio::test]
    async fn delete_requires_empty_node() {
        let tree = MemoryTree::new();
        tree.create("/a/b", b"").await.unwrap();
        let a = tree.get("/a").await.unwrap();
        assert_eq!(
            tree.delete(&a).await.unwrap_err(),
            TreeError::NotEmpty("/a".to_string())
        );

        let b = tree.get("/a/b").await.unwrap();
        tree.delete(&b).await.unwrap();
        assert_eq!(tree.get("/a").await.unwrap().child_version, 2);
        assert!(matches!(tree.get("/a/b").await, Err(TreeError::NotFound(_))));
        assert!(matches!(tree.delete(&b).await, Err(TreeError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_malformed_paths() {
        let tree = MemoryTree::new();
        for path in ["relative", "/trailing/", "/double//slash"] {
            assert!(matches!(
                tree.create(path, b"").await,
                Err(TreeError::InvalidPath(_))
            ));
        }
        let root = tree.get("/").await.unwrap();
        assert!(tree.delete(&root).await.is_err());
    }

    #[tokio::test]
    async fn visit_is_depth_first_and_prunable() {
        let tree = MemoryTree::new();
        for path in ["/r/a/x", "/r/a-b", "/r/c"] {
            tree.create(path, b"").await.unwrap();
        }
        let root = tree.get("/r").await.unwrap();

        let mut seen = Vec::new();
        tree.visit_children_recursive(&root, |n| {
            seen.push(n.path.clone());
            true
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["/r/a", "/r/a/x", "/r/a-b", "/r/c"]);

        let direct: Vec<String> = children(&tree, &root)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.path)
            .collect();
        assert_eq!(direct, vec!["/r/a", "/r/a-b", "/r/c"]);
    }

    #[tokio::test]
    async fn injected_failures_block_writes() {
        let tree = MemoryTree::new();
        tree.fail_writes_under("/locked");
        assert!(matches!(
            tree.create("/locked/a", b"").await,
            Err(TreeError::Backend(_))
        ));
        tree.create("/open", b"").await.unwrap();

        tree.clear_failures();
        tree.create("/locked/a", b"").await.unwrap();
    }

    #[tokio::test]
    async fn watch_delivers_node_and_child_events() {
        let tree = MemoryTree::new();
        tree.create("/svc", b"").await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _stop = tree.keep_watch("/svc", forwarding_handler(tx)).await.unwrap();

        tree.create("/svc/child", b"").await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event, WatchEvent::new(WatchEventKind::ChildrenChanged, "/svc"));

        let node = tree.get("/svc").await.unwrap();
        tree.set(&node, b"touched").await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, WatchEventKind::Changed);

        tree.disconnect();
        assert!(rx.recv().await.unwrap().is_disconnect());
    }

    #[tokio::test]
    async fn stop_signal_releases_watch() {
        let tree = MemoryTree::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let stop = tree.keep_watch("/svc", forwarding_handler(tx)).await.unwrap();
        wait_for_watches(&tree, 1).await;

        let _ = stop.send(true);
        wait_for_watches(&tree, 0).await;
    }

    #[tokio::test]
    async fn handler_returning_false_ends_watch() {
        let tree = MemoryTree::new();
        let handler: WatchHandler = Arc::new(|_: WatchEvent| -> BoxFuture<bool> { Box::pin(async { false }) });
        let _stop = tree.keep_watch("/once", handler).await.unwrap();
        wait_for_watches(&tree, 1).await;

        tree.create("/once", b"").await.unwrap();
        wait_for_watches(&tree, 0).await;
    }
}
