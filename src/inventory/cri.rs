use std::path::{Path, PathBuf};

use tonic::transport::Channel;

use super::{Error, Inventory, Result};
use crate::config::Filters;
use crate::container::{ContainerID, DiscoveredContainer};
use crate::runtime::v1::runtime_service_client::RuntimeServiceClient;
use crate::runtime::v1::{
    self as runtime, ContainerFilter, ContainerState, ContainerStateValue, ListContainersRequest,
    ListPodSandboxRequest, PodSandbox, PodSandboxFilter, PodSandboxState, PodSandboxStateValue,
};

/// Container inventory backed by the CRI runtime service of the node.
#[derive(Debug, Clone)]
pub struct CriInventory {
    client: RuntimeServiceClient<Channel>,
    socket_path: PathBuf,
    filters: Filters,
}

impl CriInventory {
    /// Creates an inventory for the runtime listening on `socket_path`.
    ///
    /// No connection is made until the first discovery. Must be called from within a
    /// tokio runtime.
    pub fn new(socket_path: impl AsRef<Path>, filters: Filters) -> Self {
        let socket_path = socket_path.as_ref().to_path_buf();
        let channel = super::grpc::cri_channel(&socket_path);
        Self {
            client: RuntimeServiceClient::new(channel),
            socket_path,
            filters,
        }
    }

    async fn list_ready_sandboxes(&self) -> Result<Vec<PodSandbox>> {
        let request = ListPodSandboxRequest {
            filter: Some(PodSandboxFilter {
                state: Some(PodSandboxStateValue {
                    state: PodSandboxState::SandboxReady as i32,
                }),
                ..Default::default()
            }),
        };
        let response = self
            .client
            .clone()
            .list_pod_sandbox(request)
            .await
            .map_err(|err| Error::Rpc {
                method: "ListPodSandbox",
                source: Box::new(err),
            })?;

        Ok(response.into_inner().items)
    }

    async fn list_running_containers(&self, sandbox_id: &str) -> Result<Vec<runtime::Container>> {
        let request = ListContainersRequest {
            filter: Some(ContainerFilter {
                pod_sandbox_id: sandbox_id.to_owned(),
                state: Some(ContainerStateValue {
                    state: ContainerState::ContainerRunning as i32,
                }),
                ..Default::default()
            }),
        };
        let response = self
            .client
            .clone()
            .list_containers(request)
            .await
            .map_err(|err| Error::Rpc {
                method: "ListContainers",
                source: Box::new(err),
            })?;

        Ok(response.into_inner().containers)
    }
}

impl Inventory for CriInventory {
    async fn discover_containers(&self) -> Result<Vec<DiscoveredContainer>> {
        log::debug!("Discovering containers via {}", self.socket_path.display());
        let sandboxes = self.list_ready_sandboxes().await?;

        let mut discovered = Vec::new();
        for sandbox in sandboxes {
            let Some(metadata) = sandbox.metadata.as_ref() else {
                log::debug!("Skipping sandbox `{}` without metadata", sandbox.id);
                continue;
            };
            if sandbox.state() != PodSandboxState::SandboxReady {
                continue;
            }

            let containers = match self.list_running_containers(&sandbox.id).await {
                Ok(containers) => containers,
                Err(err) => {
                    log::warn!(
                        "Failed to list containers for pod {}/{}: {}",
                        metadata.namespace,
                        metadata.name,
                        err
                    );
                    continue;
                }
            };
            discovered.extend(select_containers(
                &metadata.namespace,
                &metadata.name,
                containers,
                &self.filters,
            ));
        }

        log::debug!("Container discovery complete: {} containers", discovered.len());
        Ok(discovered)
    }
}

/// Keeps the running containers of one pod that pass the filters.
fn select_containers(
    namespace: &str,
    pod: &str,
    containers: Vec<runtime::Container>,
    filters: &Filters,
) -> Vec<DiscoveredContainer> {
    containers
        .into_iter()
        .filter(|c| c.state() == ContainerState::ContainerRunning)
        .filter_map(|c| {
            let name = c.metadata.as_ref()?.name.clone();
            if !filters.matches_container(namespace, pod, &name) {
                log::debug!("Container {}/{}/{} filtered out", namespace, pod, name);
                return None;
            }
            match to_discovered(&c.id, namespace, pod, name) {
                Ok(container) => Some(container),
                Err(err) => {
                    log::warn!("Skipping container in pod {}/{}: {}", namespace, pod, err);
                    None
                }
            }
        })
        .collect()
}

fn to_discovered(id: &str, namespace: &str, pod: &str, name: String) -> Result<DiscoveredContainer> {
    Ok(DiscoveredContainer {
        id: ContainerID::new(id)?,
        namespace: namespace.to_owned(),
        pod: pod.to_owned(),
        container: name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterRule;
    use crate::runtime::v1::ContainerMetadata;

    fn cri_container(id: &str, name: &str, state: ContainerState) -> runtime::Container {
        runtime::Container {
            id: id.to_owned(),
            pod_sandbox_id: "sandbox".to_owned(),
            metadata: Some(ContainerMetadata {
                name: name.to_owned(),
                attempt: 0,
            }),
            state: state as i32,
            ..Default::default()
        }
    }

    fn filters(container: &str) -> Filters {
        Filters::new(vec![FilterRule {
            namespace: "default".to_owned(),
            pod: "*".to_owned(),
            container: container.to_owned(),
            command: "*".to_owned(),
        }])
    }

    #[test]
    fn test_select_running_matching_containers() {
        let containers = vec![
            cri_container("aaa", "app", ContainerState::ContainerRunning),
            cri_container("bbb", "sidecar", ContainerState::ContainerRunning),
            cri_container("ccc", "app", ContainerState::ContainerExited),
        ];
        let selected = select_containers("default", "web-0", containers, &filters("app"));

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.as_str(), "aaa");
        assert_eq!(selected[0].namespace, "default");
        assert_eq!(selected[0].pod, "web-0");
        assert_eq!(selected[0].container, "app");
    }

    #[test]
    fn test_select_rejects_namespace_mismatch() {
        let containers = vec![cri_container("aaa", "app", ContainerState::ContainerRunning)];
        assert!(select_containers("kube-system", "web-0", containers, &filters("*")).is_empty());
    }

    #[test]
    fn test_select_skips_invalid_ids_and_missing_metadata() {
        let mut no_metadata = cri_container("ddd", "app", ContainerState::ContainerRunning);
        no_metadata.metadata = None;
        let containers = vec![
            cri_container("", "app", ContainerState::ContainerRunning),
            no_metadata,
            cri_container("eee", "app", ContainerState::ContainerRunning),
        ];
        let selected = select_containers("default", "web-0", containers, &filters("*"));

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.as_str(), "eee");
    }

    #[test]
    fn test_container_state_uses_cri_field_number() {
        use prost::Message;

        // tag 6, varint, value 1 (CONTAINER_RUNNING)
        let decoded = runtime::Container::decode(&[0x30u8, 0x01][..]).unwrap();
        assert_eq!(decoded.state(), ContainerState::ContainerRunning);
    }

    #[tokio::test]
    async fn test_discover_fails_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let inventory = CriInventory::new(dir.path().join("missing.sock"), filters("*"));
        let err = inventory.discover_containers().await.unwrap_err();
        assert!(matches!(err, Error::Rpc { method: "ListPodSandbox", .. }));
    }
}
