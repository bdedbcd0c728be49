//! Per-release environment variables.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warpgrid_keys::EnvRoot;
use warpgrid_tree::{Tree, TreeError};

use crate::batch::{Batch, ChangeSummary};
use crate::error::RegistryResult;
use crate::registry::{check_revision, decode, Registry};
use crate::revision::Revision;

/// Variable name to value, ordered by name.
pub type EnvList = BTreeMap<String, String>;

/// Edits to an environment: upserts and deletions by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvChange {
    #[serde(default)]
    pub update: EnvList,
    #[serde(default)]
    pub delete: BTreeSet<String>,
}

impl EnvChange {
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.delete.is_empty()
    }
}

impl<T: Tree> Registry<T> {
    /// Every variable under the release's env root, with the root's revision.
    ///
    /// Names are paths relative to the root, so nested keys read back as
    /// `group/NAME`. Directories emptied by [`Registry::save_env`] are
    /// removed with their last variable and never read back as names.
    pub async fn get_env(
        &self,
        domain: &str,
        service: &str,
        version: &str,
    ) -> RegistryResult<(EnvList, Revision)> {
        let root_path = self.templates.path(&EnvRoot::new(domain, service, version))?;
        let root = self.node(&root_path).await?;

        let mut leaves = Vec::new();
        self.tree
            .visit_children_recursive(&root, |child| {
                if child.is_leaf() {
                    leaves.push(child.clone());
                }
                true
            })
            .await?;

        let mut env = EnvList::new();
        for leaf in &leaves {
            let name = leaf.relative_to(&root_path).unwrap_or_else(|| leaf.name());
            env.insert(name.to_string(), decode(leaf)?);
        }
        debug!(path = %root_path, count = env.len(), "env read");
        Ok((env, Revision::from(&root)))
    }

    /// Create the env root and its initial variables.
    ///
    /// Fails with a conflict if the root already exists.
    pub async fn new_env(
        &self,
        domain: &str,
        service: &str,
        version: &str,
        vars: &EnvList,
    ) -> RegistryResult<Revision> {
        let root = EnvRoot::new(domain, service, version);
        let (root_path, root_value) = self.templates.derive(&root)?;
        self.create_exclusive(&root_path, &root_value).await?;

        let creates = vars
            .iter()
            .map(|(name, value)| -> RegistryResult<(String, Vec<u8>)> {
                let (path, value) = self.templates.derive(&root.entry(name, value))?;
                Ok((path, value.into_bytes()))
            })
            .collect::<RegistryResult<Vec<_>>>()?;
        Batch::creating(&root_path, creates).apply(&*self.tree).await?;

        let revision = Revision::from(&self.node(&root_path).await?);
        info!(path = %root_path, count = vars.len(), %revision, "env created");
        Ok(revision)
    }

    /// Apply `change` if the env root is still at `expected`.
    ///
    /// A stale revision fails with a conflict before anything is written.
    /// Deleting the last variable of a nested group also removes the group.
    pub async fn save_env(
        &self,
        domain: &str,
        service: &str,
        version: &str,
        change: &EnvChange,
        expected: Revision,
    ) -> RegistryResult<ChangeSummary> {
        let root = EnvRoot::new(domain, service, version);
        let root_path = self.templates.path(&root)?;
        let node = self.node(&root_path).await?;
        check_revision(&node, expected)?;
        if change.is_empty() {
            return Ok(ChangeSummary::default());
        }

        let writes = change
            .update
            .iter()
            .map(|(name, value)| -> RegistryResult<(String, Vec<u8>)> {
                let (path, value) = self.templates.derive(&root.entry(name, value))?;
                Ok((path, value.into_bytes()))
            })
            .collect::<RegistryResult<Vec<_>>>()?;
        let deletes = change
            .delete
            .iter()
            .map(|name| -> RegistryResult<String> {
                Ok(self.templates.path(&root.entry(name, ""))?)
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        let batch = Batch::plan(&*self.tree, writes, deletes).await?;
        let removed = batch.delete_paths();
        let summary = batch.apply(&*self.tree).await?;
        let pruned = self.prune_empty_groups(&root_path, &removed).await?;
        info!(
            path = %root_path,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            pruned,
            "env saved"
        );
        Ok(summary)
    }

    /// Delete the ancestors of `removed` that are left as empty directories,
    /// walking up to but never including `root`.
    async fn prune_empty_groups(&self, root: &str, removed: &[String]) -> RegistryResult<usize> {
        let prefix = format!("{root}/");
        let mut pruned = 0;
        for path in removed {
            let mut cursor = path.as_str();
            while let Some((parent, _)) = cursor.rsplit_once('/') {
                if !parent.starts_with(&prefix) {
                    break;
                }
                let group = match self.tree.get(parent).await {
                    Ok(group) => group,
                    Err(TreeError::NotFound(_)) => break,
                    Err(e) => return Err(e.into()),
                };
                if group.num_children > 0 || !group.value.is_empty() {
                    break;
                }
                match self.tree.delete(&group).await {
                    Ok(()) => {}
                    Err(TreeError::NotFound(_) | TreeError::NotEmpty(_)) => break,
                    Err(e) => return Err(e.into()),
                }
                debug!(path = parent, "empty env group removed");
                pruned += 1;
                cursor = parent;
            }
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warpgrid_keys::KeyTemplates;
    use warpgrid_tree::MemoryTree;

    use super::*;
    use crate::error::{Conflict, RegistryError};

    fn registry() -> (MemoryTree, Registry<MemoryTree>) {
        let tree = MemoryTree::new();
        let registry = Registry::new(Arc::new(tree.clone()), Arc::new(KeyTemplates::standard()));
        (tree, registry)
    }

    fn vars(pairs: &[(&str, &str)]) -> EnvList {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn new_env_round_trips() {
        let (_, registry) = registry();
        let created = registry
            .new_env("prod", "api", "1.2", &vars(&[("PORT", "8080"), ("MODE", "fast")]))
            .await
            .unwrap();

        let (env, revision) = registry.get_env("prod", "api", "1.2").await.unwrap();
        assert_eq!(env, vars(&[("MODE", "fast"), ("PORT", "8080")]));
        assert_eq!(revision, created);
    }

    #[tokio::test]
    async fn new_env_twice_is_a_conflict() {
        let (_, registry) = registry();
        registry.new_env("prod", "api", "1", &EnvList::new()).await.unwrap();

        let err = registry
            .new_env("prod", "api", "1", &vars(&[("A", "1")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Conflict { conflict: Conflict::Exists, .. }
        ));
        let (env, _) = registry.get_env("prod", "api", "1").await.unwrap();
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn missing_env_is_not_found() {
        let (_, registry) = registry();
        let err = registry.get_env("prod", "api", "9").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn save_env_creates_updates_and_deletes() {
        let (_, registry) = registry();
        let rev = registry
            .new_env("prod", "api", "1", &vars(&[("A", "1"), ("B", "2")]))
            .await
            .unwrap();

        let change = EnvChange {
            update: vars(&[("A", "10"), ("C", "3")]),
            delete: ["B".to_string(), "GONE".to_string()].into(),
        };
        let summary = registry
            .save_env("prod", "api", "1", &change, rev)
            .await
            .unwrap();
        assert_eq!(
            summary,
            ChangeSummary {
                created: 1,
                updated: 1,
                deleted: 1
            }
        );

        let (env, new_rev) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(env, vars(&[("A", "10"), ("C", "3")]));
        assert_ne!(new_rev, rev);
    }

    #[tokio::test]
    async fn stale_revision_writes_nothing() {
        let (tree, registry) = registry();
        let rev = registry
            .new_env("prod", "api", "1", &vars(&[("A", "1")]))
            .await
            .unwrap();
        let add = EnvChange {
            update: vars(&[("B", "2")]),
            ..EnvChange::default()
        };
        registry.save_env("prod", "api", "1", &add, rev).await.unwrap();

        let size = tree.len();
        let late = EnvChange {
            update: vars(&[("A", "changed"), ("Z", "new")]),
            delete: ["B".to_string()].into(),
        };
        let err = registry
            .save_env("prod", "api", "1", &late, rev)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(tree.len(), size);

        let (env, _) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(env, vars(&[("A", "1"), ("B", "2")]));
    }

    #[tokio::test]
    async fn value_only_edits_keep_the_revision() {
        let (_, registry) = registry();
        let rev = registry
            .new_env("prod", "api", "1", &vars(&[("A", "1")]))
            .await
            .unwrap();
        let edit = EnvChange {
            update: vars(&[("A", "2")]),
            ..EnvChange::default()
        };
        registry.save_env("prod", "api", "1", &edit, rev).await.unwrap();

        let (_, after) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(after, rev);
    }

    #[tokio::test]
    async fn failure_midway_reports_applied_writes() {
        let (tree, registry) = registry();
        let rev = registry.new_env("prod", "api", "1", &EnvList::new()).await.unwrap();
        tree.fail_writes_under("/prod/api/1/env/B");

        let change = EnvChange {
            update: vars(&[("A", "1"), ("B", "2"), ("C", "3")]),
            ..EnvChange::default()
        };
        let err = registry
            .save_env("prod", "api", "1", &change, rev)
            .await
            .unwrap_err();
        match err {
            RegistryError::PartiallyApplied {
                applied,
                failed,
                source,
            } => {
                assert_eq!(applied, vec!["/prod/api/1/env/A".to_string()]);
                assert_eq!(failed, "/prod/api/1/env/B");
                assert!(matches!(source, TreeError::Backend(_)));
            }
            other => panic!("expected partial failure, got {other:?}"),
        }

        tree.clear_failures();
        let (env, _) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(env, vars(&[("A", "1")]));
    }

    #[tokio::test]
    async fn nested_names_read_back_relative_to_root() {
        let (_, registry) = registry();
        registry
            .new_env("prod", "api", "1", &vars(&[("db/HOST", "pg"), ("PORT", "80")]))
            .await
            .unwrap();
        let (env, _) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(env, vars(&[("PORT", "80"), ("db/HOST", "pg")]));
    }

    #[tokio::test]
    async fn deleting_last_nested_name_removes_its_group() {
        let (tree, registry) = registry();
        let rev = registry
            .new_env("prod", "api", "1", &vars(&[("db/HOST", "pg"), ("PORT", "80")]))
            .await
            .unwrap();

        let change = EnvChange {
            delete: ["db/HOST".to_string()].into(),
            ..EnvChange::default()
        };
        let summary = registry
            .save_env("prod", "api", "1", &change, rev)
            .await
            .unwrap();
        assert_eq!(summary.deleted, 1);

        let (env, after) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(env, vars(&[("PORT", "80")]));
        assert_ne!(after, rev);
        assert!(matches!(
            tree.get("/prod/api/1/env/db").await,
            Err(TreeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn group_with_remaining_names_is_kept() {
        let (tree, registry) = registry();
        let rev = registry
            .new_env(
                "prod",
                "api",
                "1",
                &vars(&[("db/HOST", "pg"), ("db/PORT", "5432")]),
            )
            .await
            .unwrap();

        let change = EnvChange {
            delete: ["db/HOST".to_string(), "db/MISSING".to_string()].into(),
            ..EnvChange::default()
        };
        registry.save_env("prod", "api", "1", &change, rev).await.unwrap();

        let (env, _) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(env, vars(&[("db/PORT", "5432")]));
        assert!(tree.get("/prod/api/1/env/db").await.is_ok());
    }

    #[tokio::test]
    async fn empty_change_still_checks_revision() {
        let (tree, registry) = registry();
        let rev = registry
            .new_env("prod", "api", "1", &vars(&[("A", "1")]))
            .await
            .unwrap();
        let size = tree.len();

        let summary = registry
            .save_env("prod", "api", "1", &EnvChange::default(), rev)
            .await
            .unwrap();
        assert_eq!(summary, ChangeSummary::default());
        assert_eq!(tree.len(), size);

        let err = registry
            .save_env("prod", "api", "1", &EnvChange::default(), Revision(rev.0 + 5))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn new_env_failure_midway_reports_root_and_created_names() {
        let (tree, registry) = registry();
        tree.fail_writes_under("/prod/api/1/env/B");

        let err = registry
            .new_env("prod", "api", "1", &vars(&[("A", "1"), ("B", "2"), ("C", "3")]))
            .await
            .unwrap_err();
        match err {
            RegistryError::PartiallyApplied { applied, failed, .. } => {
                assert_eq!(
                    applied,
                    vec!["/prod/api/1/env".to_string(), "/prod/api/1/env/A".to_string()]
                );
                assert_eq!(failed, "/prod/api/1/env/B");
            }
            other => panic!("expected partial failure, got {other:?}"),
        }

        tree.clear_failures();
        let err = registry
            .new_env("prod", "api", "1", &vars(&[("B", "2")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Conflict { conflict: Conflict::Exists, .. }
        ));
        let (env, _) = registry.get_env("prod", "api", "1").await.unwrap();
        assert_eq!(env, vars(&[("A", "1")]));
    }
}
