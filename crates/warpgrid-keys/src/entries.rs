//! Structured entries rendered through the namespace templates.
//!
//! Field names serialize in PascalCase, which is what the templates
//! reference (`container_id` is `{{.ContainerId}}`).

use serde::{Deserialize, Serialize};

pub const ENV_ROOT: &str = "env-root";
pub const ENV_ENTRY: &str = "env-entry";
pub const RELEASE: &str = "release";
pub const RELEASE_WATCH: &str = "release-watch";
pub const IMAGE_COUNT: &str = "image-count";
pub const CONTAINER: &str = "container";
pub const LIVE: &str = "live";
pub const LIVE_WATCH: &str = "live-watch";
pub const DASHBOARD: &str = "dashboard";
pub const CONF_BASE_ROOT: &str = "conf-base-root";
pub const CONF_BASE: &str = "conf-base";
pub const CONF_OVERRIDE_ROOT: &str = "conf-override-root";
pub const CONF_OVERRIDE: &str = "conf-override";

/// An entry type bound to the template that renders it.
pub trait NamespaceEntry: Serialize {
    const TEMPLATE: &'static str;
}

macro_rules! namespace_entry {
    ($ty:ty => $template:expr) => {
        impl NamespaceEntry for $ty {
            const TEMPLATE: &'static str = $template;
        }
    };
}

// ── Environment ────────────────────────────────────────────────────

/// The directory holding one release's environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvRoot {
    pub domain: String,
    pub service: String,
    pub version: String,
}

impl EnvRoot {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            version: version.into(),
        }
    }

    /// The entry for variable `name` under this root.
    pub fn entry(&self, name: impl Into<String>, value: impl Into<String>) -> EnvEntry {
        EnvEntry {
            domain: self.domain.clone(),
            service: self.service.clone(),
            version: self.version.clone(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvEntry {
    pub domain: String,
    pub service: String,
    pub version: String,
    pub name: String,
    pub value: String,
}

impl EnvEntry {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        EnvRoot::new(domain, service, version).entry(name, value)
    }
}

// ── Releases and containers ────────────────────────────────────────

/// The image a release runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Release {
    pub domain: String,
    pub service: String,
    pub version: String,
    pub image: String,
}

/// Node touched to notify watchers of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseWatch {
    pub domain: String,
    pub service: String,
    pub version: String,
}

/// Desired container count for one image of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageCount {
    pub domain: String,
    pub service: String,
    pub version: String,
    pub image: String,
    pub count: u32,
}

/// A running container published under its release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRegistration {
    pub domain: String,
    pub service: String,
    pub version: String,
    pub image: String,
    pub container_id: String,
    /// Port inside the container.
    pub port: u16,
    pub host: String,
    /// Port the host maps to `port`.
    pub host_port: u16,
}

// ── Live pointer ───────────────────────────────────────────────────

/// Node touched to notify watchers of a service's live pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LiveWatch {
    pub domain: String,
    pub service: String,
}

/// Names the container and env paths currently live for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LivePointer {
    pub domain: String,
    pub service: String,
    pub container_path: String,
    pub env_path: String,
}

impl LivePointer {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        container_path: impl Into<String>,
        env_path: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            container_path: container_path.into(),
            env_path: env_path.into(),
        }
    }
}

/// A dashboard endpoint serving a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DashboardRegistration {
    pub domain: String,
    pub service: String,
    pub host: String,
    pub port: u16,
    pub url: String,
}

// ── Configuration tiers ────────────────────────────────────────────

/// What a configuration blob holds. Selects the tree root it lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfKind {
    #[serde(rename = "conf")]
    Config,
    #[serde(rename = "pkg")]
    Package,
}

/// Base tier directory: `(domain class, service)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfBaseRoot {
    pub kind: ConfKind,
    pub domain_class: String,
    pub service: String,
}

/// One base tier object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfBase {
    pub kind: ConfKind,
    pub domain_class: String,
    pub service: String,
    pub name: String,
}

/// Override tier directory: `(domain class, domain instance, service, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfOverrideRoot {
    pub kind: ConfKind,
    pub domain_class: String,
    pub domain_instance: String,
    pub service: String,
    pub version: String,
}

/// One override tier object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfOverride {
    pub kind: ConfKind,
    pub domain_class: String,
    pub domain_instance: String,
    pub service: String,
    pub version: String,
    pub name: String,
}

namespace_entry!(EnvRoot => ENV_ROOT);
namespace_entry!(EnvEntry => ENV_ENTRY);
namespace_entry!(Release => RELEASE);
namespace_entry!(ReleaseWatch => RELEASE_WATCH);
namespace_entry!(ImageCount => IMAGE_COUNT);
namespace_entry!(ContainerRegistration => CONTAINER);
namespace_entry!(LiveWatch => LIVE_WATCH);
namespace_entry!(LivePointer => LIVE);
namespace_entry!(DashboardRegistration => DASHBOARD);
namespace_entry!(ConfBaseRoot => CONF_BASE_ROOT);
namespace_entry!(ConfBase => CONF_BASE);
namespace_entry!(ConfOverrideRoot => CONF_OVERRIDE_ROOT);
namespace_entry!(ConfOverride => CONF_OVERRIDE);
