//! Configuration types, read from `CUBE_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Which halves of the orchestrator this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Worker,
    Manager,
    /// Manager and one worker in the same process.
    Standalone,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "worker" => Ok(Role::Worker),
            "manager" => Ok(Role::Manager),
            "standalone" => Ok(Role::Standalone),
            other => Err(format!("unknown role {:?}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// How often the execution engine pulls one task off its queue.
    pub run_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5556,
            run_interval: Duration::from_secs(10),
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub host: String,
    pub port: u16,
    /// Worker API addresses as `host:port`.
    pub workers: Vec<String>,
    pub dispatch_interval: Duration,
    /// Upper bound on how stale the manager's view of a task can be.
    pub reconcile_interval: Duration,
    pub health_check_interval: Duration,
    /// Deadline for every call the manager makes to a worker or a task.
    pub request_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            workers: Vec::new(),
            dispatch_interval: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(15),
            health_check_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CubeConfig {
    pub role: Role,
    pub worker: WorkerConfig,
    pub manager: ManagerConfig,
}

impl CubeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut worker = WorkerConfig::default();
        let mut manager = ManagerConfig::default();

        let role = parse(&lookup, "CUBE_ROLE")?.unwrap_or(Role::Standalone);

        if let Some(name) = lookup("CUBE_WORKER_NAME") {
            worker.name = name;
        }
        if let Some(host) = lookup("CUBE_WORKER_HOST") {
            worker.host = host;
        }
        if let Some(port) = parse(&lookup, "CUBE_WORKER_PORT")? {
            worker.port = port;
        }
        if let Some(host) = lookup("CUBE_MANAGER_HOST") {
            manager.host = host;
        }
        if let Some(port) = parse(&lookup, "CUBE_MANAGER_PORT")? {
            manager.port = port;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "CUBE_REQUEST_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "CUBE_REQUEST_TIMEOUT_SECS".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            manager.request_timeout = Duration::from_secs(secs);
        }

        manager.workers = match lookup("CUBE_WORKERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec![worker.address()],
        };

        Ok(CubeConfig {
            role,
            worker,
            manager,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}
