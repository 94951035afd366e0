use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::client::WorkerClient;
use crate::scheduler::Scheduler;
use crate::tasks::types::{QueueItem, Task, TaskEvent};

/// Control plane state.
///
/// The manager's task records are a replica of what the workers report.
/// Each structure has its own lock, and no lock is held across a network call.
pub struct Manager {
    pub(crate) pending: Mutex<VecDeque<QueueItem>>,
    pub(crate) task_db: RwLock<HashMap<Uuid, Task>>,
    pub(crate) event_db: RwLock<HashMap<Uuid, TaskEvent>>,
    pub(crate) assignments: Mutex<Assignments>,
    pub workers: Vec<String>,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) client: WorkerClient,
}

/// Which worker runs which task, kept in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignments {
    worker_tasks: HashMap<String, HashSet<Uuid>>,
    task_worker: HashMap<Uuid, String>,
}

impl Assignments {
    pub fn new(workers: &[String]) -> Self {
        Assignments {
            worker_tasks: workers
                .iter()
                .map(|worker| (worker.clone(), HashSet::new()))
                .collect(),
            task_worker: HashMap::new(),
        }
    }

    /// Records `task_id` on `worker`, moving it off any previous worker.
    pub fn assign(&mut self, task_id: Uuid, worker: &str) {
        if let Some(previous) = self.task_worker.insert(task_id, worker.to_string()) {
            if previous != worker {
                if let Some(tasks) = self.worker_tasks.get_mut(&previous) {
                    tasks.remove(&task_id);
                }
            }
        }
        self.worker_tasks
            .entry(worker.to_string())
            .or_default()
            .insert(task_id);
    }

    pub fn worker_for(&self, task_id: Uuid) -> Option<&str> {
        self.task_worker.get(&task_id).map(String::as_str)
    }

    pub fn tasks_for(&self, worker: &str) -> Option<&HashSet<Uuid>> {
        self.worker_tasks.get(worker)
    }
}

pub struct ManagerServer {
    pub manager: Arc<Manager>,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("no workers are available to handle tasks")]
    NoWorkersAvailable,

    #[error("worker {worker} unreachable: {source}")]
    Transport {
        worker: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("worker {worker} rejected request ({status}): {message}")]
    WorkerRejected {
        worker: String,
        status: u16,
        message: String,
    },

    #[error("invalid response from worker {worker}: {source}")]
    InvalidResponse {
        worker: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("task {0} has no assigned worker")]
    NotAssigned(Uuid),

    #[error("task {0} has exhausted its restarts")]
    RestartLimit(Uuid),

    #[error("health check for task {task_id} failed: {reason}")]
    Unhealthy { task_id: Uuid, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl ManagerError {
    /// True when the peer could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, ManagerError::Transport { .. })
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
