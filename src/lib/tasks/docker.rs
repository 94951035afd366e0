use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    image::CreateImageOptions,
    models::{HostConfig, PortBinding, PortMap, RestartPolicy, RestartPolicyNameEnum},
};
use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

use super::types::{Config, DockerResult};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("failed to create container {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("failed to start container {id}: {source}")]
    Start {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("failed to stop container {id}: {source}")]
    Stop {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("failed to remove container {id}: {source}")]
    Remove {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("container runtime error: {0}")]
    Failed(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Starts and stops containers on behalf of a worker.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn start(&self, config: &Config) -> RuntimeResult<DockerResult>;

    /// Stops and removes the container.
    async fn stop(&self, container_id: &str) -> RuntimeResult<DockerResult>;
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    pub client: Docker,
}

impl DockerClient {
    pub fn new() -> RuntimeResult<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(DockerClient { client })
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        info!(image, "pulling image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image, %status, "pull progress");
                    }
                }
                Err(source) => {
                    return Err(RuntimeError::Pull {
                        image: image.to_string(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    fn host_config(config: &Config) -> HostConfig {
        let restart_policy = RestartPolicy {
            name: Some(
                config
                    .restart_policy
                    .parse()
                    .unwrap_or(RestartPolicyNameEnum::NO),
            ),
            maximum_retry_count: None,
        };

        let port_bindings: PortMap = config
            .port_bindings
            .iter()
            .map(|(container_port, host_port)| {
                (
                    container_port.clone(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(host_port.clone()),
                    }]),
                )
            })
            .collect();

        HostConfig {
            restart_policy: Some(restart_policy),
            nano_cpus: (config.cpu > 0.0).then(|| (config.cpu * 1_000_000_000.0) as i64),
            memory: (config.memory > 0).then_some(config.memory),
            publish_all_ports: Some(port_bindings.is_empty()),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            ..Default::default()
        }
    }

    /// Published ports as `container port -> host port`.
    async fn published_ports(&self, container_id: &str) -> BTreeMap<String, String> {
        let inspect = match self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(e) => {
                warn!(container_id, error = %e, "could not inspect container ports");
                return BTreeMap::new();
            }
        };

        inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(port, bindings)| {
                let host_port = bindings?.into_iter().find_map(|b| b.host_port)?;
                Some((port, host_port))
            })
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn start(&self, config: &Config) -> RuntimeResult<DockerResult> {
        self.pull_image(&config.image).await?;

        let container_config = ContainerConfig {
            image: Some(config.image.clone()),
            cmd: (!config.cmd.is_empty()).then(|| config.cmd.clone()),
            env: Some(config.env.clone()),
            exposed_ports: Some(
                config
                    .exposed_ports
                    .iter()
                    .map(|port| (port.clone(), HashMap::new()))
                    .collect(),
            ),
            host_config: Some(Self::host_config(config)),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: config.name.clone(),
            ..Default::default()
        });

        let created = self
            .client
            .create_container(options, container_config)
            .await
            .map_err(|source| RuntimeError::Create {
                name: config.name.clone(),
                source,
            })?;
        debug!(container_id = %created.id, name = %config.name, "container created");

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|source| RuntimeError::Start {
                id: created.id.clone(),
                source,
            })?;
        info!(container_id = %created.id, name = %config.name, "container started");

        let mut result = DockerResult::success(&created.id, "start");
        result.host_ports = self.published_ports(&created.id).await;
        Ok(result)
    }

    async fn stop(&self, container_id: &str) -> RuntimeResult<DockerResult> {
        info!(container_id, "stopping container");

        self.client
            .stop_container(container_id, None::<StopContainerOptions>)
            .await
            .map_err(|source| RuntimeError::Stop {
                id: container_id.to_string(),
                source,
            })?;

        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|source| RuntimeError::Remove {
                id: container_id.to_string(),
                source,
            })?;

        info!(container_id, "container stopped and removed");
        Ok(DockerResult::success(container_id, "stop"))
    }
}
