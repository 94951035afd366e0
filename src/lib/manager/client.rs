use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

use super::types::{ManagerError, ManagerResult};
use crate::api::ErrResponse;
use crate::tasks::types::{Task, TaskEvent};

/// HTTP client for worker APIs and task health endpoints.
///
/// Every request carries the configured timeout so a stuck peer cannot stall
/// one of the manager's loops.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: Client,
}

impl WorkerClient {
    pub fn new(timeout: Duration) -> ManagerResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(WorkerClient { http })
    }

    /// Posts an event and returns the task as the worker accepted it.
    pub async fn send_event(&self, worker: &str, event: &TaskEvent) -> ManagerResult<Task> {
        let url = format!("http://{}/tasks", worker);
        let response = self
            .http
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|source| ManagerError::Transport {
                worker: worker.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrResponse>().await {
                Ok(body) => body.message,
                Err(e) => format!("undecodable error body: {}", e),
            };
            return Err(ManagerError::WorkerRejected {
                worker: worker.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Task>()
            .await
            .map_err(|source| ManagerError::InvalidResponse {
                worker: worker.to_string(),
                source,
            })
    }

    pub async fn get_tasks(&self, worker: &str) -> ManagerResult<Vec<Task>> {
        let url = format!("http://{}/tasks", worker);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ManagerError::Transport {
                worker: worker.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::WorkerRejected {
                worker: worker.to_string(),
                status: status.as_u16(),
                message: "failed to list tasks".to_string(),
            });
        }

        let tasks: Vec<Task> = response
            .json()
            .await
            .map_err(|source| ManagerError::InvalidResponse {
                worker: worker.to_string(),
                source,
            })?;
        debug!(worker, count = tasks.len(), "fetched worker tasks");
        Ok(tasks)
    }

    pub async fn check_health(&self, task_id: Uuid, url: &str) -> ManagerResult<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ManagerError::Unhealthy {
                task_id,
                reason: format!("error connecting to {}: {}", url, e),
            })?;

        if !response.status().is_success() {
            return Err(ManagerError::Unhealthy {
                task_id,
                reason: format!("{} returned {}", url, response.status()),
            });
        }

        Ok(())
    }
}
