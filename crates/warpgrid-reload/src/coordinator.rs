//! Reload coordinator: re-renders and re-applies configuration when a
//! watched path changes.
//!
//! A reload cycle has three steps, each of which can fail and abort the
//! rest: render the rule's template against the release environment, write
//! the result to the output path, run the reload command. Failures are
//! returned to the caller of [`ReloadCoordinator::reload_now`] or logged by
//! the watch handler. Nothing is retried here.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde_json::json;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use warpgrid_keys::Template;
use warpgrid_registry::{ConfKind, ConfScope, EnvList, Registry};
use warpgrid_tree::{BoxFuture, Tree, WatchEvent, WatchHandler};

use crate::error::{ReloadError, ReloadResult};
use crate::manager::WatchManager;

/// The release whose environment feeds the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRef {
    pub domain: String,
    pub service: String,
    pub version: String,
}

/// The configuration object holding the template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfRef {
    pub kind: ConfKind,
    pub scope: ConfScope,
    pub name: String,
}

/// What to do when the watched path changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRule {
    /// Tree path to watch.
    pub watch: String,
    pub env: EnvRef,
    pub template: ConfRef,
    pub output: PathBuf,
    /// Program and arguments; empty for none.
    pub command: Vec<String>,
}

/// Result of a successful reload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub output: PathBuf,
    pub bytes: usize,
    pub command_ran: bool,
}

struct Inner<T> {
    registry: Registry<T>,
    watches: WatchManager<T, ReloadRule>,
}

/// Drives reload cycles from watches on the tree.
///
/// Cheap to clone. Watch handlers hold a weak reference, so dropping the
/// last clone tears every watch down.
pub struct ReloadCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ReloadCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Tree> ReloadCoordinator<T> {
    pub fn new(registry: Registry<T>) -> Self {
        let watches = WatchManager::new(Arc::clone(registry.tree()));
        Self {
            inner: Arc::new(Inner { registry, watches }),
        }
    }

    /// Install (or replace) the watch for `rule.watch`.
    pub async fn watch(&self, rule: ReloadRule) -> ReloadResult<()> {
        let key = rule.watch.clone();
        let handler = reload_handler(Arc::downgrade(&self.inner), key.clone());
        self.inner.watches.add_watcher(&key, rule, handler).await
    }

    pub async fn unwatch(&self, key: &str) -> bool {
        self.inner.watches.stop_watch(key).await
    }

    /// Replace the rule for `key`; takes effect on the next event.
    pub async fn update_rule(&self, key: &str, rule: ReloadRule) -> bool {
        self.inner.watches.update_rule(key, rule).await
    }

    /// Run one reload cycle for `key` without waiting for an event.
    pub async fn reload_now(&self, key: &str) -> ReloadResult<ReloadOutcome> {
        self.inner.reload(key).await
    }

    pub fn watches(&self) -> &WatchManager<T, ReloadRule> {
        &self.inner.watches
    }

    pub async fn shutdown(&self) {
        self.inner.watches.stop_all().await;
    }
}

impl<T: Tree> Inner<T> {
    async fn reload(&self, key: &str) -> ReloadResult<ReloadOutcome> {
        let rule = self
            .watches
            .get_rule(key)
            .await
            .ok_or_else(|| ReloadError::NoRule(key.to_string()))?;

        let rendered = self.render(&rule).await?;
        write_output(&rule.output, rendered.as_bytes()).await?;
        let command_ran = match rule.command.split_first() {
            Some((program, args)) => {
                run_command(program, args).await?;
                true
            }
            None => false,
        };

        Ok(ReloadOutcome {
            output: rule.output,
            bytes: rendered.len(),
            command_ran,
        })
    }

    async fn render(&self, rule: &ReloadRule) -> ReloadResult<String> {
        let conf = &rule.template;
        let object = self
            .registry
            .get_conf(conf.kind, &conf.scope, &conf.name)
            .await?;

        let env = match self
            .registry
            .get_env(&rule.env.domain, &rule.env.service, &rule.env.version)
            .await
        {
            Ok((env, _)) => env,
            Err(e) if e.is_not_found() => {
                debug!(service = %rule.env.service, version = %rule.env.version, "no env, rendering without it");
                EnvList::new()
            }
            Err(e) => return Err(e.into()),
        };

        let render_error = |source| ReloadError::Render {
            template: conf.name.clone(),
            source,
        };
        let template = Template::parse(&conf.name, &object.text()).map_err(render_error)?;
        let context = json!({
            "Domain": rule.env.domain,
            "Service": rule.env.service,
            "Version": rule.env.version,
            "Env": env,
        });
        template.render(&context).map_err(render_error)
    }
}

async fn write_output(path: &Path, data: &[u8]) -> ReloadResult<()> {
    let write_error = |source| ReloadError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    tokio::fs::write(path, data).await.map_err(write_error)?;
    debug!(path = %path.display(), bytes = data.len(), "rendered config written");
    Ok(())
}

async fn run_command(program: &str, args: &[String]) -> ReloadResult<()> {
    let command = std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| ReloadError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ReloadError::Command {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    debug!(%command, "reload command succeeded");
    Ok(())
}

fn reload_handler<T: Tree>(inner: Weak<Inner<T>>, key: String) -> WatchHandler {
    Arc::new(move |event: WatchEvent| -> BoxFuture<bool> {
        let inner = inner.clone();
        let key = key.clone();
        Box::pin(async move {
            let Some(inner) = inner.upgrade() else {
                debug!(%key, "coordinator dropped, releasing watch");
                return false;
            };
            if event.is_disconnect() {
                warn!(%key, "coordination session disconnected, keeping watch");
                return true;
            }
            match inner.reload(&key).await {
                Ok(outcome) => info!(
                    %key,
                    kind = ?event.kind,
                    output = %outcome.output.display(),
                    bytes = outcome.bytes,
                    command_ran = outcome.command_ran,
                    "reload applied"
                ),
                Err(e) => error!(%key, kind = ?event.kind, error = %e, "reload failed"),
            }
            true
        })
    })
}
