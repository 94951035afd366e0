use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::WorkerClient;
use super::types::{Assignments, Manager, ManagerError, ManagerResult};
use crate::scheduler::{RoundRobin, Scheduler};
use crate::tasks::types::{QueueItem, State, Task, TaskEvent};

impl Manager {
    pub fn new(
        workers: Vec<String>,
        scheduler: Box<dyn Scheduler>,
        request_timeout: Duration,
    ) -> ManagerResult<Self> {
        Ok(Manager {
            pending: Mutex::new(VecDeque::new()),
            task_db: RwLock::new(HashMap::new()),
            event_db: RwLock::new(HashMap::new()),
            assignments: Mutex::new(Assignments::new(&workers)),
            workers,
            scheduler,
            client: WorkerClient::new(request_timeout)?,
        })
    }

    pub fn with_round_robin(workers: Vec<String>, request_timeout: Duration) -> ManagerResult<Self> {
        Self::new(workers, Box::new(RoundRobin::new()), request_timeout)
    }

    pub async fn add_task(&self, item: QueueItem) {
        debug!(task_id = %item.task_id(), "added to pending queue");
        self.pending.lock().await.push_back(item);
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Snapshot of the pending queue, oldest first.
    pub async fn pending_items(&self) -> Vec<QueueItem> {
        self.pending.lock().await.iter().cloned().collect()
    }

    pub async fn get_tasks(&self) -> Vec<Task> {
        self.task_db.read().await.values().cloned().collect()
    }

    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        self.task_db.read().await.get(&id).cloned()
    }

    pub async fn get_event(&self, id: Uuid) -> Option<TaskEvent> {
        self.event_db.read().await.get(&id).cloned()
    }

    pub async fn worker_for(&self, task_id: Uuid) -> Option<String> {
        self.assignments
            .lock()
            .await
            .worker_for(task_id)
            .map(str::to_string)
    }

    pub async fn assignments(&self) -> Assignments {
        self.assignments.lock().await.clone()
    }

    /// Worker already holding the task, or a fresh pick from the scheduler.
    async fn assign_worker(&self, task: &Task) -> Option<String> {
        let mut assignments = self.assignments.lock().await;
        if let Some(worker) = assignments.worker_for(task.id) {
            return Some(worker.to_string());
        }
        let worker = self.scheduler.select_worker(&self.workers, task)?;
        assignments.assign(task.id, &worker);
        Some(worker)
    }

    /// Sends the oldest pending event to a worker.
    ///
    /// Returns `Ok(None)` when nothing is pending. An unreachable worker puts
    /// the event back at the tail and keeps its assignment; a worker that
    /// answers with an error gets the event dropped.
    pub async fn send_work(&self) -> ManagerResult<Option<Task>> {
        let Some(item) = self.pending.lock().await.pop_front() else {
            debug!("no work in the queue");
            return Ok(None);
        };

        let mut event = item.into_event();
        let task_id = event.task.id;

        let Some(worker) = self.assign_worker(&event.task).await else {
            warn!(%task_id, "no worker available, requeueing");
            self.pending.lock().await.push_back(QueueItem::Event(event));
            return Err(ManagerError::NoWorkersAvailable);
        };

        if event.state != State::Completed {
            event.task.state = State::Scheduled;
            self.task_db.write().await.insert(task_id, event.task.clone());
        }
        self.event_db.write().await.insert(event.id, event.clone());

        info!(%task_id, event_id = %event.id, state = ?event.state, %worker, "dispatching task");
        match self.client.send_event(&worker, &event).await {
            Ok(task) => {
                debug!(%task_id, state = ?task.state, "worker accepted task");
                self.task_db.write().await.insert(task.id, task.clone());
                Ok(Some(task))
            }
            Err(e) if e.is_transport() => {
                warn!(%task_id, %worker, error = %e, "worker unreachable, requeueing");
                self.pending.lock().await.push_back(QueueItem::Event(event));
                Err(e)
            }
            Err(e) => {
                warn!(%task_id, %worker, error = %e, "worker rejected task, dropping event");
                Err(e)
            }
        }
    }

    /// Pulls every worker's task list and copies the execution fields of
    /// tracked tasks into the manager's records.
    ///
    /// Workers are the source of truth here, so the manager's view lags by
    /// at most one reconciliation interval. Returns the number of records
    /// refreshed.
    pub async fn update_tasks(&self) -> usize {
        let mut updated = 0;

        for worker in &self.workers {
            debug!(%worker, "checking worker for task updates");
            let reported = match self.client.get_tasks(worker).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(%worker, error = %e, "could not fetch tasks, skipping worker");
                    continue;
                }
            };

            let mut db = self.task_db.write().await;
            for task in reported {
                let Some(local) = db.get_mut(&task.id) else {
                    debug!(task_id = %task.id, %worker, "worker reported untracked task");
                    continue;
                };

                if local.state != task.state {
                    info!(task_id = %task.id, from = ?local.state, to = ?task.state, "task state changed");
                }
                local.state = task.state;
                local.start_time = task.start_time;
                local.finish_time = task.finish_time;
                local.container_id = task.container_id;
                local.host_ports = task.host_ports;
                updated += 1;
            }
        }

        updated
    }

    /// Probes running tasks and restarts unhealthy or failed ones that still
    /// have restarts left. Returns the number of restarts issued.
    pub async fn do_health_checks(&self) -> usize {
        let mut restarted = 0;

        for task in self.get_tasks().await {
            if !task.can_restart() {
                continue;
            }

            let needs_restart = match task.state {
                State::Running => match self.check_task_health(&task).await {
                    Ok(()) => false,
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "task unhealthy");
                        true
                    }
                },
                State::Failed => true,
                _ => false,
            };

            if needs_restart {
                match self.restart_task(task.id).await {
                    Ok(()) => restarted += 1,
                    Err(e) => warn!(task_id = %task.id, error = %e, "restart failed"),
                }
            }
        }

        restarted
    }

    /// Calls the task's health endpoint on its worker's host.
    ///
    /// Tasks without a health path or a published port are not probed.
    async fn check_task_health(&self, task: &Task) -> ManagerResult<()> {
        let Some(path) = task.health_check.as_deref() else {
            return Ok(());
        };
        let Some(host_port) = task.host_port() else {
            debug!(task_id = %task.id, "no published port, skipping health check");
            return Ok(());
        };
        let Some(worker) = self.worker_for(task.id).await else {
            debug!(task_id = %task.id, "no assigned worker, skipping health check");
            return Ok(());
        };

        let host = worker.rsplit_once(':').map_or(worker.as_str(), |(host, _)| host);
        let separator = if path.starts_with('/') { "" } else { "/" };
        let url = format!("http://{}:{}{}{}", host, host_port, separator, path);

        debug!(task_id = %task.id, %url, "calling health check");
        self.client.check_health(task.id, &url).await
    }

    /// Bumps the restart count and sends the task back to the worker it was
    /// assigned to.
    pub async fn restart_task(&self, task_id: Uuid) -> ManagerResult<()> {
        let worker = self
            .worker_for(task_id)
            .await
            .ok_or(ManagerError::NotAssigned(task_id))?;

        let task = {
            let mut db = self.task_db.write().await;
            let stored = db
                .get_mut(&task_id)
                .ok_or(ManagerError::TaskNotFound(task_id))?;
            if !stored.can_restart() {
                return Err(ManagerError::RestartLimit(task_id));
            }
            stored.restart_count += 1;
            stored.state = State::Scheduled;
            stored.clone()
        };

        let event = TaskEvent::new(State::Scheduled, task.clone());
        self.event_db.write().await.insert(event.id, event.clone());

        info!(%task_id, restart_count = task.restart_count, %worker, "restarting task");
        match self.client.send_event(&worker, &event).await {
            Ok(confirmed) => {
                self.task_db.write().await.insert(confirmed.id, confirmed);
                Ok(())
            }
            Err(e) if e.is_transport() => {
                warn!(%task_id, %worker, error = %e, "worker unreachable, parking restart in pending queue");
                self.pending.lock().await.push_back(QueueItem::Task(task));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

pub async fn process_tasks(manager: Arc<Manager>, interval: Duration) {
    loop {
        if let Err(e) = manager.send_work().await {
            warn!(error = %e, "dispatch failed");
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn reconcile_tasks(manager: Arc<Manager>, interval: Duration) {
    loop {
        let updated = manager.update_tasks().await;
        debug!(updated, "task reconciliation completed");
        tokio::time::sleep(interval).await;
    }
}

pub async fn health_check_tasks(manager: Arc<Manager>, interval: Duration) {
    loop {
        let restarted = manager.do_health_checks().await;
        debug!(restarted, "task health checks completed");
        tokio::time::sleep(interval).await;
    }
}
