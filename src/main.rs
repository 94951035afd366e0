use std::sync::Arc;

use anyhow::Context;
use cube::{
    config::{CubeConfig, ManagerConfig, Role, WorkerConfig},
    manager::{
        Manager, ManagerServer,
        manager::{health_check_tasks, process_tasks, reconcile_tasks},
    },
    tasks::docker::DockerClient,
    worker::{
        TaskServer, Worker,
        worker::{collect_stats, run_tasks},
    },
};
use tokio::task::JoinHandle;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CubeConfig::from_env().context("invalid configuration")?;
    info!(role = ?config.role, "starting cube");

    let mut servers = Vec::new();
    if matches!(config.role, Role::Worker | Role::Standalone) {
        servers.push(start_worker(config.worker.clone())?);
    }
    if matches!(config.role, Role::Manager | Role::Standalone) {
        servers.push(start_manager(config.manager.clone())?);
    }

    // Either API server exiting takes the process down.
    let (result, _, _) = futures_util::future::select_all(servers).await;
    result.context("server task panicked")??;
    Ok(())
}

fn start_worker(config: WorkerConfig) -> anyhow::Result<JoinHandle<std::io::Result<()>>> {
    let runtime = DockerClient::new().context("failed to connect to docker")?;
    let worker = Arc::new(Worker::new(&config.name, Arc::new(runtime)));

    tokio::spawn(run_tasks(worker.clone(), config.run_interval));
    tokio::spawn(collect_stats(worker.clone(), config.stats_interval));

    let server = TaskServer::new(worker, &config.host, config.port);
    Ok(tokio::spawn(server.start_server()))
}

fn start_manager(config: ManagerConfig) -> anyhow::Result<JoinHandle<std::io::Result<()>>> {
    let manager = Arc::new(
        Manager::with_round_robin(config.workers.clone(), config.request_timeout)
            .context("failed to build manager")?,
    );

    tokio::spawn(process_tasks(manager.clone(), config.dispatch_interval));
    tokio::spawn(reconcile_tasks(manager.clone(), config.reconcile_interval));
    tokio::spawn(health_check_tasks(
        manager.clone(),
        config.health_check_interval,
    ));

    let server = ManagerServer::new(manager, &config.host, config.port);
    Ok(tokio::spawn(server.start_server()))
}
