//! Lifecycle states of a deployed container.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a workload container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
    Removed,
}

impl ContainerState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transition table for [`ContainerState`].
///
/// Every state is known to the table; `Removed` has no outgoing edges.
pub fn container_transitions(from: &ContainerState) -> Option<Vec<ContainerState>> {
    use ContainerState::*;

    let targets = match from {
        Starting => vec![Running, Stopping, Failed],
        Running => vec![Stopping, Failed],
        Stopping => vec![Stopped, Failed],
        Stopped => vec![Starting, Removed],
        Failed => vec![Starting, Removed],
        Removed => vec![],
    };
    Some(targets)
}
