//! warpgrid-reload: keeps local configuration in step with the tree.
//!
//! [`WatchManager`] owns one remote watch per key and replaces it on
//! re-registration. [`ReloadCoordinator`] installs watches whose handler
//! re-renders a configuration template from the registry, writes it to
//! disk and optionally runs a reload command.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;

pub use config::{CoordConfig, ReloadRuleConfig};
pub use coordinator::{ConfRef, EnvRef, ReloadCoordinator, ReloadOutcome, ReloadRule};
pub use error::{ConfigError, ReloadError, ReloadResult};
pub use manager::WatchManager;
