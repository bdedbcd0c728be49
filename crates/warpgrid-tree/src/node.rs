//! Tree nodes and watch events.

/// A snapshot of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub path: String,
    pub value: Vec<u8>,
    /// Bumps on every `set` of this node's value.
    pub version: u64,
    /// Bumps whenever a direct child is created or deleted.
    pub child_version: u64,
    pub num_children: u32,
}

impl Node {
    /// Last path segment (empty for the root).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn is_leaf(&self) -> bool {
        self.num_children == 0
    }

    /// Path of this node relative to `ancestor`, if it lies below it.
    pub fn relative_to(&self, ancestor: &str) -> Option<&str> {
        let rest = self.path.strip_prefix(ancestor)?;
        if ancestor == "/" {
            return Some(rest);
        }
        rest.strip_prefix('/')
    }
}

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Changed,
    Deleted,
    ChildrenChanged,
    /// The session to the coordination service dropped. Watches stay
    /// installed; the service re-delivers once it reconnects.
    Disconnected,
}

/// A change notification delivered to a watch handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn is_disconnect(&self) -> bool {
        self.kind == WatchEventKind::Disconnected
    }
}
