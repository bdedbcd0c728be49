//! Two-tier configuration and package blobs.
//!
//! Objects live in a base tier scoped to `(domain class, service)` and an
//! override tier scoped to `(domain class, domain instance, service,
//! version)`. Reads at override scope fall back to the base tier when the
//! override tier has no such object. Writes and deletes only touch the tier
//! they name.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warpgrid_keys::{ConfBase, ConfBaseRoot, ConfKind, ConfOverride, ConfOverrideRoot};
use warpgrid_tree::{children, Tree};

use crate::batch::{Batch, ChangeSummary};
use crate::error::RegistryResult;
use crate::registry::{check_revision, Registry};
use crate::revision::Revision;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseScope {
    pub domain_class: String,
    pub service: String,
}

impl BaseScope {
    pub fn new(domain_class: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain_class: domain_class.into(),
            service: service.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverrideScope {
    pub domain_class: String,
    pub domain_instance: String,
    pub service: String,
    pub version: String,
}

impl OverrideScope {
    pub fn new(
        domain_class: impl Into<String>,
        domain_instance: impl Into<String>,
        service: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            domain_class: domain_class.into(),
            domain_instance: domain_instance.into(),
            service: service.into(),
            version: version.into(),
        }
    }

    /// The base scope this override falls back to.
    pub fn base(&self) -> BaseScope {
        BaseScope::new(self.domain_class.clone(), self.service.clone())
    }
}

/// Which tier an operation addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum ConfScope {
    Base(BaseScope),
    Override(OverrideScope),
}

impl ConfScope {
    pub fn tier(&self) -> Tier {
        match self {
            Self::Base(_) => Tier::Base,
            Self::Override(_) => Tier::Override,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Base,
    Override,
}

/// An object as read, with the tier that served it and that tier's revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfObject {
    pub name: String,
    pub data: Vec<u8>,
    pub tier: Tier,
    pub revision: Revision,
}

impl ConfObject {
    /// The data as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Edits to one tier: upserts and deletions by object name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfChange {
    pub update: BTreeMap<String, Vec<u8>>,
    pub delete: BTreeSet<String>,
}

impl<T: Tree> Registry<T> {
    /// Object names in one tier, with the tier's revision. No fallback.
    pub async fn list_conf(
        &self,
        kind: ConfKind,
        scope: &ConfScope,
    ) -> RegistryResult<(Vec<String>, Revision)> {
        let root = self.node(&self.conf_root(kind, scope)?).await?;
        let names = children(&*self.tree, &root)
            .await?
            .iter()
            .map(|child| child.name().to_string())
            .collect();
        Ok((names, Revision::from(&root)))
    }

    /// Read `name` at `scope`, falling back to the base tier for an
    /// override scope that lacks it.
    pub async fn get_conf(
        &self,
        kind: ConfKind,
        scope: &ConfScope,
        name: &str,
    ) -> RegistryResult<ConfObject> {
        match self.read_conf(kind, scope, name).await {
            Err(e) if e.is_not_found() => match scope {
                ConfScope::Override(over) => {
                    debug!(?kind, name, service = %over.service, "override miss, reading base tier");
                    self.read_conf(kind, &ConfScope::Base(over.base()), name).await
                }
                ConfScope::Base(_) => Err(e),
            },
            other => other,
        }
    }

    /// Create a tier with its initial objects.
    ///
    /// Fails with a conflict if the tier already exists.
    pub async fn new_conf(
        &self,
        kind: ConfKind,
        scope: &ConfScope,
        objects: &BTreeMap<String, Vec<u8>>,
    ) -> RegistryResult<Revision> {
        let root_path = self.conf_root(kind, scope)?;
        self.create_exclusive(&root_path, "").await?;

        let creates = objects
            .iter()
            .map(|(name, data)| -> RegistryResult<(String, Vec<u8>)> {
                Ok((self.conf_object(kind, scope, name)?, data.clone()))
            })
            .collect::<RegistryResult<Vec<_>>>()?;
        Batch::creating(&root_path, creates).apply(&*self.tree).await?;

        let revision = Revision::from(&self.node(&root_path).await?);
        info!(path = %root_path, count = objects.len(), %revision, "conf tier created");
        Ok(revision)
    }

    /// Apply `change` to one tier if it is still at `expected`.
    pub async fn save_conf(
        &self,
        kind: ConfKind,
        scope: &ConfScope,
        change: &ConfChange,
        expected: Revision,
    ) -> RegistryResult<ChangeSummary> {
        let root_path = self.conf_root(kind, scope)?;
        let root = self.node(&root_path).await?;
        check_revision(&root, expected)?;

        let writes = change
            .update
            .iter()
            .map(|(name, data)| -> RegistryResult<(String, Vec<u8>)> {
                Ok((self.conf_object(kind, scope, name)?, data.clone()))
            })
            .collect::<RegistryResult<Vec<_>>>()?;
        let deletes = change
            .delete
            .iter()
            .map(|name| self.conf_object(kind, scope, name))
            .collect::<RegistryResult<Vec<_>>>()?;

        let summary = Batch::plan(&*self.tree, writes, deletes)
            .await?
            .apply(&*self.tree)
            .await?;
        info!(
            path = %root_path,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "conf tier saved"
        );
        Ok(summary)
    }

    /// Delete one object from the tier `scope` names. Never touches the
    /// other tier. Returns the tier's new revision.
    pub async fn delete_conf(
        &self,
        kind: ConfKind,
        scope: &ConfScope,
        name: &str,
        expected: Revision,
    ) -> RegistryResult<Revision> {
        let root_path = self.conf_root(kind, scope)?;
        let root = self.node(&root_path).await?;
        check_revision(&root, expected)?;

        let object = self.node(&self.conf_object(kind, scope, name)?).await?;
        self.tree.delete(&object).await?;

        let revision = Revision::from(&self.node(&root_path).await?);
        info!(path = %object.path, %revision, "conf object deleted");
        Ok(revision)
    }

    async fn read_conf(
        &self,
        kind: ConfKind,
        scope: &ConfScope,
        name: &str,
    ) -> RegistryResult<ConfObject> {
        let root = self.node(&self.conf_root(kind, scope)?).await?;
        let object = self.node(&self.conf_object(kind, scope, name)?).await?;
        Ok(ConfObject {
            name: name.to_string(),
            data: object.value,
            tier: scope.tier(),
            revision: Revision::from(&root),
        })
    }

    fn conf_root(&self, kind: ConfKind, scope: &ConfScope) -> RegistryResult<String> {
        let path = match scope {
            ConfScope::Base(base) => self.templates.path(&ConfBaseRoot {
                kind,
                domain_class: base.domain_class.clone(),
                service: base.service.clone(),
            })?,
            ConfScope::Override(over) => self.templates.path(&ConfOverrideRoot {
                kind,
                domain_class: over.domain_class.clone(),
                domain_instance: over.domain_instance.clone(),
                service: over.service.clone(),
                version: over.version.clone(),
            })?,
        };
        Ok(path)
    }

    fn conf_object(&self, kind: ConfKind, scope: &ConfScope, name: &str) -> RegistryResult<String> {
        let path = match scope {
            ConfScope::Base(base) => self.templates.path(&ConfBase {
                kind,
                domain_class: base.domain_class.clone(),
                service: base.service.clone(),
                name: name.to_string(),
            })?,
            ConfScope::Override(over) => self.templates.path(&ConfOverride {
                kind,
                domain_class: over.domain_class.clone(),
                domain_instance: over.domain_instance.clone(),
                service: over.service.clone(),
                version: over.version.clone(),
                name: name.to_string(),
            })?,
        };
        Ok(path)
    }
}
