use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use tokio::net::TcpListener;
use tracing::info;

use super::types::{TaskServer, Worker};
use crate::api::{ErrResponse, decode_error, parse_task_id};
use crate::tasks::types::{State, TaskEvent};

impl TaskServer {
    pub fn new(worker: Arc<Worker>, address: &str, port: u16) -> Self {
        Self {
            worker,
            address: address.to_string(),
            port,
        }
    }

    pub fn router(worker: Arc<Worker>) -> Router {
        Router::new()
            .route("/tasks", get(Self::get_tasks).post(Self::start_task))
            .route("/tasks/{id}", delete(Self::stop_task))
            .route("/stats", get(Self::get_stats))
            .with_state(worker)
    }

    async fn get_tasks(AxumState(worker): AxumState<Arc<Worker>>) -> Response {
        Json(worker.get_tasks().await).into_response()
    }

    async fn start_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        payload: Result<Json<TaskEvent>, JsonRejection>,
    ) -> Response {
        let Json(event) = match payload {
            Ok(event) => event,
            Err(rejection) => return decode_error(rejection).into_response(),
        };

        worker.add_task(event.task.clone()).await;
        info!(task_id = %event.task.id, event_id = %event.id, "task queued on worker");
        (StatusCode::CREATED, Json(event.task)).into_response()
    }

    async fn stop_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        Path(id): Path<String>,
    ) -> Response {
        let id = match parse_task_id(&id) {
            Ok(id) => id,
            Err(err) => return err.into_response(),
        };

        let Some(mut task) = worker.get_task(id).await else {
            return ErrResponse::not_found(id).into_response();
        };

        task.state = State::Completed;
        info!(task_id = %id, container_id = ?task.container_id, "task queued for stop");
        worker.add_task(task).await;
        StatusCode::NO_CONTENT.into_response()
    }

    async fn get_stats(AxumState(worker): AxumState<Arc<Worker>>) -> Response {
        let stats = worker.stats().await;
        Json(stats.as_ref().clone()).into_response()
    }

    pub async fn start_server(self) -> std::io::Result<()> {
        let address = format!("{}:{}", self.address, self.port);
        let app = Self::router(self.worker.clone());

        let listener = TcpListener::bind(&address).await?;
        info!(worker = %self.worker.name, %address, "worker API listening");
        axum::serve(listener, app).await
    }
}
