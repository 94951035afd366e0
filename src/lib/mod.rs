//! A small container orchestrator: a manager that schedules and reconciles
//! tasks, and workers that run them through a container runtime.

pub mod api;
pub mod config;
pub mod manager;
pub mod scheduler;
pub mod tasks;
pub mod worker;
