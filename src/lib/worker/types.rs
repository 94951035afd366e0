use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::tasks::docker::{ContainerRuntime, RuntimeError};
use crate::tasks::state::TaskError;
use crate::tasks::types::{State, Task};

/// Execution agent: a FIFO of incoming tasks and the local task store.
///
/// Each structure sits behind its own lock and no lock is held across a
/// runtime call, so the API handlers and the pollers never wait on Docker.
pub struct Worker {
    pub name: String,
    pub(crate) queue: Mutex<VecDeque<Task>>,
    pub(crate) db: RwLock<HashMap<Uuid, Task>>,
    pub(crate) stats: RwLock<Arc<Stats>>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
}

/// Resource usage snapshot published on `GET /stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub hostname: String,
    pub system_name: String,
    pub total_cpus: u64,
    pub cpu_usage: f32,
    pub load_one: f64,
    pub load_five: f64,
    pub load_fifteen: f64,
    pub total_memory_mb: u64,
    pub used_memory_mb: u64,
    pub available_memory_mb: u64,
    pub total_swap_mb: u64,
    pub used_swap_mb: u64,
    pub disk_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub task_count: u64,
    /// `None` until the stats poller has run once.
    pub collected_at: Option<DateTime<Utc>>,
}

pub struct TaskServer {
    pub worker: Arc<Worker>,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    InvalidTransition(#[from] TaskError),

    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("task {id} cannot be processed in state {state:?}")]
    UnexpectedState { id: Uuid, state: State },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
