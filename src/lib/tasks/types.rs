use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Restarts allowed per task before the manager stops acting on it.
pub const MAX_RESTART_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

/// A unit of schedulable work.
///
/// The worker's copy is authoritative for the execution fields
/// (`container_id`, `state`, timestamps, `host_ports`); the manager's copy is
/// a replica refreshed by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub id: Uuid,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: State,
    pub image: String,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub disk: i64,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
    /// Requested bindings, container port to host port.
    #[serde(default)]
    pub port_bindings: BTreeMap<String, String>,
    /// Ports actually published by the runtime, e.g. `"80/tcp" -> "49153"`.
    #[serde(default)]
    pub host_ports: BTreeMap<String, String>,
    #[serde(default)]
    pub restart_policy: String,
    #[serde(default)]
    pub health_check: Option<String>,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(name: &str, image: &str) -> Self {
        Task {
            id: Uuid::new_v4(),
            container_id: None,
            name: name.to_string(),
            state: State::Pending,
            image: image.to_string(),
            cpu: 0.0,
            memory: 0,
            disk: 0,
            exposed_ports: Vec::new(),
            port_bindings: BTreeMap::new(),
            host_ports: BTreeMap::new(),
            restart_policy: String::new(),
            health_check: None,
            restart_count: 0,
            start_time: None,
            finish_time: None,
        }
    }

    /// Whether the restart loop may still act on this task.
    pub fn can_restart(&self) -> bool {
        self.restart_count < MAX_RESTART_COUNT
    }

    /// First published host port, used to reach the task's health endpoint.
    pub fn host_port(&self) -> Option<&str> {
        self.host_ports.values().next().map(String::as_str)
    }

    /// Container names must be unique per host, so every restart gets its own.
    pub fn container_name(&self) -> String {
        format!("cube-{}-r{}", self.id, self.restart_count)
    }
}

/// Instruction envelope sent between manager and worker.
///
/// Holds its own copy of the task, never a handle to a live record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub state: State,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl TaskEvent {
    pub fn new(state: State, task: Task) -> Self {
        TaskEvent {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}

/// Entry of the manager's pending queue.
///
/// Client submissions arrive as events; restarts that could not reach their
/// worker are parked as bare tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Task(Task),
    Event(TaskEvent),
}

impl QueueItem {
    pub fn task_id(&self) -> Uuid {
        match self {
            QueueItem::Task(task) => task.id,
            QueueItem::Event(event) => event.task.id,
        }
    }

    pub fn into_event(self) -> TaskEvent {
        match self {
            QueueItem::Task(task) => TaskEvent::new(State::Scheduled, task),
            QueueItem::Event(event) => event,
        }
    }
}

/// Everything the container runtime needs to start a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub cpu: f64,
    pub memory: i64,
    pub disk: i64,
    /// Docker style port keys, e.g. `"80/tcp"`.
    pub exposed_ports: Vec<String>,
    pub port_bindings: BTreeMap<String, String>,
    pub restart_policy: String,
}

pub fn new_config(task: &Task) -> Config {
    Config {
        name: task.container_name(),
        image: task.image.clone(),
        cpu: task.cpu,
        memory: task.memory,
        disk: task.disk,
        exposed_ports: task
            .exposed_ports
            .iter()
            .map(|port| format!("{}/tcp", port))
            .collect(),
        port_bindings: task.port_bindings.clone(),
        restart_policy: task.restart_policy.clone(),
        ..Default::default()
    }
}

/// Outcome of a successful runtime call.
#[derive(Debug, Clone, PartialEq)]
pub struct DockerResult {
    pub container_id: String,
    pub action: String,
    pub host_ports: BTreeMap<String, String>,
}

impl DockerResult {
    pub fn success(container_id: &str, action: &str) -> Self {
        DockerResult {
            container_id: container_id.to_string(),
            action: action.to_string(),
            host_ports: BTreeMap::new(),
        }
    }
}
