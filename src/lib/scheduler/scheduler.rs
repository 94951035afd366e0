use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tasks::types::Task;

/// Placement policy: given the current worker pool and the task to place,
/// pick the worker that should run it.
pub trait Scheduler: Send + Sync {
    fn select_worker(&self, workers: &[String], task: &Task) -> Option<String>;
}

/// Cycles through the pool in order, ignoring task requirements.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for RoundRobin {
    fn select_worker(&self, workers: &[String], _task: &Task) -> Option<String> {
        if workers.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % workers.len();
        workers.get(index).cloned()
    }
}
