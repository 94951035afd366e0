use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sysinfo::System;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::stats::get_stats;
use super::types::{Stats, Worker, WorkerError, WorkerResult};
use crate::tasks::{
    docker::ContainerRuntime,
    state::check_transition,
    types::{State, Task, new_config},
};

impl Worker {
    pub fn new(name: &str, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Worker {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            db: RwLock::new(HashMap::new()),
            stats: RwLock::new(Arc::new(Stats::default())),
            runtime,
        }
    }

    pub async fn add_task(&self, task: Task) {
        debug!(task_id = %task.id, state = ?task.state, "task queued");
        self.queue.lock().await.push_back(task);
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn get_tasks(&self) -> Vec<Task> {
        self.db.read().await.values().cloned().collect()
    }

    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        self.db.read().await.get(&id).cloned()
    }

    pub async fn task_count(&self) -> usize {
        self.db.read().await.len()
    }

    pub async fn stats(&self) -> Arc<Stats> {
        self.stats.read().await.clone()
    }

    /// Takes at most one task off the queue and drives it toward its
    /// requested state.
    ///
    /// Returns `Ok(None)` when the queue is empty. A task seen for the first
    /// time is stored as sent; later copies are validated against the stored
    /// record and rejected copies leave it untouched.
    pub async fn run_task(&self) -> WorkerResult<Option<Task>> {
        let Some(queued) = self.queue.lock().await.pop_front() else {
            debug!(worker = %self.name, "no tasks in queue");
            return Ok(None);
        };

        let persisted = {
            let mut db = self.db.write().await;
            match db.get(&queued.id) {
                Some(task) => Some(task.clone()),
                None => {
                    db.insert(queued.id, queued.clone());
                    None
                }
            }
        };

        if let Some(persisted) = persisted {
            let baseline = if queued.state == State::Scheduled
                && queued.restart_count > persisted.restart_count
                && persisted.state == State::Running
            {
                self.retire_for_restart(persisted).await?
            } else {
                persisted
            };

            if let Err(e) = check_transition(baseline.state, queued.state) {
                warn!(task_id = %queued.id, error = %e, "discarding queued task");
                return Err(e.into());
            }
        }

        match queued.state {
            State::Scheduled => self.start_task(queued).await.map(Some),
            State::Completed => self.stop_task(queued).await.map(Some),
            state => {
                error!(task_id = %queued.id, ?state, "no handler for requested state");
                Err(WorkerError::UnexpectedState {
                    id: queued.id,
                    state,
                })
            }
        }
    }

    /// The manager restarts an unhealthy task by resending it with a higher
    /// restart count. Ends the current run so the restart goes through
    /// `Running -> Failed -> Scheduled`.
    async fn retire_for_restart(&self, mut task: Task) -> WorkerResult<Task> {
        check_transition(task.state, State::Failed)?;

        if let Some(container_id) = task.container_id.as_deref() {
            if let Err(e) = self.runtime.stop(container_id).await {
                warn!(task_id = %task.id, container_id, error = %e, "could not stop container before restart");
            }
        }

        info!(task_id = %task.id, "retiring running task for restart");
        task.state = State::Failed;
        task.finish_time = Some(Utc::now());
        self.db.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    pub async fn start_task(&self, mut task: Task) -> WorkerResult<Task> {
        task.start_time = Some(Utc::now());
        task.finish_time = None;
        let config = new_config(&task);

        match self.runtime.start(&config).await {
            Ok(result) => {
                info!(task_id = %task.id, container_id = %result.container_id, "task running");
                task.container_id = Some(result.container_id);
                task.host_ports = result.host_ports;
                task.state = State::Running;
                self.db.write().await.insert(task.id, task.clone());
                Ok(task)
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "task failed to start");
                task.state = State::Failed;
                self.db.write().await.insert(task.id, task);
                Err(e.into())
            }
        }
    }

    /// Stops the task's container. The task ends up `Completed` even when the
    /// runtime fails to stop it.
    pub async fn stop_task(&self, task: Task) -> WorkerResult<Task> {
        let mut stored = self
            .get_task(task.id)
            .await
            .ok_or(WorkerError::NotFound(task.id))?;

        match stored.container_id.as_deref() {
            Some(container_id) => {
                if let Err(e) = self.runtime.stop(container_id).await {
                    warn!(task_id = %stored.id, container_id, error = %e, "error stopping container");
                }
            }
            None => debug!(task_id = %stored.id, "task has no container to stop"),
        }

        stored.state = State::Completed;
        stored.finish_time = Some(Utc::now());
        self.db.write().await.insert(stored.id, stored.clone());
        info!(task_id = %stored.id, "task completed");
        Ok(stored)
    }
}

pub async fn run_tasks(worker: Arc<Worker>, interval: Duration) {
    loop {
        match worker.run_task().await {
            Ok(Some(task)) => debug!(task_id = %task.id, state = ?task.state, "processed task"),
            Ok(None) => {}
            Err(e) => warn!(worker = %worker.name, error = %e, "error running task"),
        }

        tokio::time::sleep(interval).await;
    }
}

pub async fn collect_stats(worker: Arc<Worker>, interval: Duration) {
    let mut sys = System::new_all();
    loop {
        sys.refresh_all();
        let task_count = worker.task_count().await as u64;
        let stats = get_stats(&sys, task_count);
        debug!(
            cpu_usage = stats.cpu_usage,
            memory_used_percent = stats.memory_used_percent(),
            disk_used_percent = stats.disk_used_percent(),
            task_count,
            "collected stats"
        );
        *worker.stats.write().await = Arc::new(stats);

        tokio::time::sleep(interval).await;
    }
}
