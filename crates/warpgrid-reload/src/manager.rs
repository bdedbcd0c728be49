//! Watch manager: one replaceable remote watch per key.
//!
//! Each watched key holds the stop signal of its remote watch and a rule
//! the caller attaches to it. Re-registering a key signals the old watch to
//! stop before the new one is installed, so at most one watch per key is
//! active. Teardown on the store side completes asynchronously.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use warpgrid_tree::{Tree, WatchHandler, WatchStop};

use crate::error::{ReloadError, ReloadResult};

/// Per-key watch state.
struct WatchSlot<R> {
    /// Stop signal for the remote watch.
    stop: WatchStop,
    /// Caller metadata, read by handlers at event time.
    rule: R,
}

/// Manages remote watches for a set of keys.
pub struct WatchManager<T, R> {
    tree: Arc<T>,
    /// Active watches: key → slot.
    watches: RwLock<HashMap<String, WatchSlot<R>>>,
}

impl<T: Tree, R: Clone + Send + Sync + 'static> WatchManager<T, R> {
    pub fn new(tree: Arc<T>) -> Self {
        Self {
            tree,
            watches: RwLock::new(HashMap::new()),
        }
    }

    /// Watch `key`, replacing any existing watch on it.
    ///
    /// The old watch is signalled to stop before the new one is installed.
    /// If installation fails the key is left unwatched.
    pub async fn add_watcher(&self, key: &str, rule: R, handler: WatchHandler) -> ReloadResult<()> {
        let mut watches = self.watches.write().await;
        if let Some(old) = watches.remove(key) {
            // The old watch may already be gone; the signal is best effort.
            let _ = old.stop.send(true);
            debug!(%key, "previous watch signalled to stop");
        }

        let stop = match self.tree.keep_watch(key, handler).await {
            Ok(stop) => stop,
            Err(source) => {
                warn!(%key, error = %source, "watch installation failed");
                return Err(ReloadError::Watch {
                    key: key.to_string(),
                    source,
                });
            }
        };
        watches.insert(key.to_string(), WatchSlot { stop, rule });
        info!(%key, "watch installed");
        Ok(())
    }

    /// Stop watching `key`. Returns whether a watch existed.
    pub async fn stop_watch(&self, key: &str) -> bool {
        let mut watches = self.watches.write().await;
        match watches.remove(key) {
            Some(slot) => {
                let _ = slot.stop.send(true);
                info!(%key, "watch stopped");
                true
            }
            None => false,
        }
    }

    /// Stop all watches (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut watches = self.watches.write().await;
        for (key, slot) in watches.drain() {
            let _ = slot.stop.send(true);
            debug!(%key, "watch stopped");
        }
        info!("all watches stopped");
    }

    pub async fn get_rule(&self, key: &str) -> Option<R> {
        let watches = self.watches.read().await;
        watches.get(key).map(|slot| slot.rule.clone())
    }

    /// Replace the rule attached to `key` without touching its watch.
    /// Returns `false` if `key` is not watched.
    pub async fn update_rule(&self, key: &str, rule: R) -> bool {
        let mut watches = self.watches.write().await;
        match watches.get_mut(key) {
            Some(slot) => {
                slot.rule = rule;
                debug!(%key, "watch rule updated");
                true
            }
            None => false,
        }
    }

    /// Watched keys, sorted.
    pub async fn active_watches(&self) -> Vec<String> {
        let watches = self.watches.read().await;
        let mut keys: Vec<String> = watches.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub async fn is_watching(&self, key: &str) -> bool {
        let watches = self.watches.read().await;
        watches.contains_key(key)
    }
}
