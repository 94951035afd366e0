//! Shared fixtures: a scripted container runtime and a scripted worker API.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;

use cube::api::ErrResponse;
use cube::manager::Manager;
use cube::tasks::docker::{ContainerRuntime, RuntimeError, RuntimeResult};
use cube::tasks::types::{Config, DockerResult, Task, TaskEvent};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime that hands out `container-N` ids without touching Docker.
#[derive(Default)]
pub struct StubRuntime {
    pub started: AtomicUsize,
    pub stopped: Mutex<Vec<String>>,
    pub fail_start: AtomicBool,
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn start(&self, _config: &Config) -> RuntimeResult<DockerResult> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RuntimeError::Failed("pull access denied".to_string()));
        }
        let n = self.started.fetch_add(1, Ordering::SeqCst);
        Ok(DockerResult::success(&format!("container-{}", n), "start"))
    }

    async fn stop(&self, container_id: &str) -> RuntimeResult<DockerResult> {
        self.stopped.lock().unwrap().push(container_id.to_string());
        Ok(DockerResult::success(container_id, "stop"))
    }
}

/// Serves `app` on a random local port and returns its `host:port`.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    address
}

/// An address nothing listens on.
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

pub fn manager(workers: Vec<String>) -> Arc<Manager> {
    Arc::new(Manager::with_round_robin(workers, REQUEST_TIMEOUT).unwrap())
}

/// Worker API double: records posted events, reports a scripted task list
/// and answers `/health` with a scripted status.
#[derive(Default)]
pub struct StubWorker {
    pub events: Mutex<Vec<TaskEvent>>,
    pub tasks: Mutex<Vec<Task>>,
    pub hits: AtomicUsize,
    pub reject: AtomicBool,
    pub health_status: AtomicU16,
}

impl StubWorker {
    pub async fn start() -> (Arc<StubWorker>, String) {
        let stub = Arc::new(StubWorker {
            health_status: AtomicU16::new(200),
            ..Default::default()
        });
        let app = Router::new()
            .route("/tasks", get(list_tasks).post(accept_event))
            .route("/health", get(health))
            .with_state(stub.clone());
        let address = serve(app).await;
        (stub, address)
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn report(&self, tasks: Vec<Task>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub fn port(address: &str) -> String {
        address.rsplit_once(':').unwrap().1.to_string()
    }
}

async fn accept_event(State(stub): State<Arc<StubWorker>>, Json(event): Json<TaskEvent>) -> Response {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    stub.events.lock().unwrap().push(event.clone());
    if stub.reject.load(Ordering::SeqCst) {
        return ErrResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "disk full").into_response();
    }
    (StatusCode::CREATED, Json(event.task)).into_response()
}

async fn list_tasks(State(stub): State<Arc<StubWorker>>) -> Response {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    Json(stub.tasks.lock().unwrap().clone()).into_response()
}

async fn health(State(stub): State<Arc<StubWorker>>) -> StatusCode {
    StatusCode::from_u16(stub.health_status.load(Ordering::SeqCst)).unwrap()
}
