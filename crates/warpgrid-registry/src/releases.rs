//! Release, container, live pointer and dashboard records.

use tracing::{debug, info, warn};
use warpgrid_keys::{
    parse_host_port, parse_live_value, ContainerRegistration, DashboardRegistration, EnvRoot,
    ImageCount, LivePointer, LiveWatch, Release, ReleaseWatch,
};
use warpgrid_tree::{children, Tree, TreeError};

use crate::error::{Conflict, RegistryError, RegistryResult};
use crate::registry::{decode, Registry};

impl<T: Tree> Registry<T> {
    /// Record the image a release runs, replacing any previous one.
    pub async fn set_release(&self, release: &Release) -> RegistryResult<()> {
        let (path, value) = self.templates.derive(release)?;
        self.upsert(&path, &value).await?;
        info!(%path, image = %release.image, "release recorded");
        Ok(())
    }

    pub async fn get_release(
        &self,
        domain: &str,
        service: &str,
        version: &str,
    ) -> RegistryResult<Release> {
        let mut release = Release {
            domain: domain.to_string(),
            service: service.to_string(),
            version: version.to_string(),
            image: String::new(),
        };
        let path = self.templates.path(&release)?;
        release.image = decode(&self.node(&path).await?)?;
        Ok(release)
    }

    /// Touch the release watch node so watchers of it fire.
    pub async fn touch_release(&self, watch: &ReleaseWatch) -> RegistryResult<()> {
        let (path, value) = self.templates.derive(watch)?;
        self.upsert(&path, &value).await?;
        debug!(%path, "release watch touched");
        Ok(())
    }

    pub async fn set_image_count(&self, count: &ImageCount) -> RegistryResult<()> {
        let (path, value) = self.templates.derive(count)?;
        self.upsert(&path, &value).await?;
        info!(%path, count = count.count, "image count recorded");
        Ok(())
    }

    pub async fn get_image_count(&self, release: &Release) -> RegistryResult<u32> {
        let path = self.templates.path(&image_count(release, 0))?;
        let node = self.node(&path).await?;
        let text = decode(&node)?;
        text.trim().parse().map_err(|_| RegistryError::Decode {
            path,
            reason: format!("container count {text:?} is not a number"),
        })
    }

    /// Publish a container under its release image.
    ///
    /// Fails with a conflict if the same container and port is already
    /// registered.
    pub async fn register_container(&self, container: &ContainerRegistration) -> RegistryResult<()> {
        let (path, value) = self.templates.derive(container)?;
        match self.tree.create(&path, value.as_bytes()).await {
            Ok(_) => {
                info!(%path, host = %value, "container registered");
                Ok(())
            }
            Err(TreeError::AlreadyExists(_)) => Err(RegistryError::Conflict {
                path,
                conflict: Conflict::Exists,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn unregister_container(&self, container: &ContainerRegistration) -> RegistryResult<()> {
        let path = self.templates.path(container)?;
        let node = self.node(&path).await?;
        self.tree.delete(&node).await?;
        info!(%path, "container unregistered");
        Ok(())
    }

    /// Containers registered under a release image.
    ///
    /// Children whose name or value does not parse are skipped with a
    /// warning. An image with no registrations yields an empty list.
    pub async fn list_containers(
        &self,
        release: &Release,
    ) -> RegistryResult<Vec<ContainerRegistration>> {
        let path = self.templates.path(&image_count(release, 0))?;
        let dir = match self.node(&path).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut containers = Vec::new();
        for child in children(&*self.tree, &dir).await? {
            let value = String::from_utf8_lossy(&child.value);
            let parsed = parse_port_pair(child.name()).zip(parse_port_pair(&value));
            let Some(((container_id, port), (host, host_port))) = parsed else {
                warn!(path = %child.path, %value, "skipping malformed container registration");
                continue;
            };
            containers.push(ContainerRegistration {
                domain: release.domain.clone(),
                service: release.service.clone(),
                version: release.version.clone(),
                image: release.image.clone(),
                container_id: container_id.to_string(),
                port,
                host: host.to_string(),
                host_port,
            });
        }
        Ok(containers)
    }

    /// The live pointer for a release: its image's container directory and
    /// its env root.
    pub fn live_pointer(&self, release: &Release) -> RegistryResult<LivePointer> {
        let container_path = self.templates.path(&image_count(release, 0))?;
        let env_path = self.templates.path(&EnvRoot::new(
            release.domain.as_str(),
            release.service.as_str(),
            release.version.as_str(),
        ))?;
        Ok(LivePointer::new(
            release.domain.as_str(),
            release.service.as_str(),
            container_path,
            env_path,
        ))
    }

    /// Point a service at a new live release, then touch its live watch.
    pub async fn set_live(&self, pointer: &LivePointer) -> RegistryResult<()> {
        let (path, value) = self.templates.derive(pointer)?;
        self.upsert(&path, &value).await?;

        let watch = LiveWatch {
            domain: pointer.domain.clone(),
            service: pointer.service.clone(),
        };
        let (watch_path, watch_value) = self.templates.derive(&watch)?;
        self.upsert(&watch_path, &watch_value).await?;
        info!(%path, container = %pointer.container_path, env = %pointer.env_path, "live pointer set");
        Ok(())
    }

    /// The service's live pointer. `None` if the stored value is malformed.
    pub async fn get_live(&self, domain: &str, service: &str) -> RegistryResult<Option<LivePointer>> {
        let probe = LivePointer::new(domain, service, "", "");
        let path = self.templates.path(&probe)?;
        let value = decode(&self.node(&path).await?)?;
        match parse_live_value(&value) {
            Some((container_path, env_path)) => Ok(Some(LivePointer::new(
                domain,
                service,
                container_path,
                env_path,
            ))),
            None => {
                warn!(%path, %value, "malformed live pointer");
                Ok(None)
            }
        }
    }

    pub async fn register_dashboard(&self, dashboard: &DashboardRegistration) -> RegistryResult<()> {
        let (path, value) = self.templates.derive(dashboard)?;
        self.upsert(&path, &value).await?;
        info!(%path, url = %dashboard.url, "dashboard registered");
        Ok(())
    }
}

fn image_count(release: &Release, count: u32) -> ImageCount {
    ImageCount {
        domain: release.domain.clone(),
        service: release.service.clone(),
        version: release.version.clone(),
        image: release.image.clone(),
        count,
    }
}

fn parse_port_pair(value: &str) -> Option<(&str, u16)> {
    let (name, port) = parse_host_port(value)?;
    Some((name, port.parse().ok()?))
}
