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

use super::types::{Manager, ManagerServer};
use crate::api::{ErrResponse, decode_error, parse_task_id};
use crate::tasks::types::{QueueItem, State, TaskEvent};

impl ManagerServer {
    pub fn new(manager: Arc<Manager>, address: &str, port: u16) -> Self {
        Self {
            manager,
            address: address.to_string(),
            port,
        }
    }

    pub fn router(manager: Arc<Manager>) -> Router {
        Router::new()
            .route("/tasks", get(Self::get_tasks).post(Self::start_task))
            .route("/tasks/{id}", delete(Self::stop_task))
            .with_state(manager)
    }

    async fn start_task(
        AxumState(manager): AxumState<Arc<Manager>>,
        payload: Result<Json<TaskEvent>, JsonRejection>,
    ) -> Response {
        let Json(event) = match payload {
            Ok(event) => event,
            Err(rejection) => return decode_error(rejection).into_response(),
        };

        info!(task_id = %event.task.id, event_id = %event.id, "task submitted");
        manager.add_task(QueueItem::Event(event.clone())).await;
        (StatusCode::CREATED, Json(event)).into_response()
    }

    async fn get_tasks(AxumState(manager): AxumState<Arc<Manager>>) -> Response {
        Json(manager.get_tasks().await).into_response()
    }

    async fn stop_task(
        AxumState(manager): AxumState<Arc<Manager>>,
        Path(id): Path<String>,
    ) -> Response {
        let id = match parse_task_id(&id) {
            Ok(id) => id,
            Err(err) => return err.into_response(),
        };

        let Some(mut task) = manager.get_task(id).await else {
            return ErrResponse::not_found(id).into_response();
        };

        task.state = State::Completed;
        let event = TaskEvent::new(State::Completed, task);
        info!(task_id = %id, event_id = %event.id, "stop requested");
        manager.add_task(QueueItem::Event(event)).await;
        StatusCode::NO_CONTENT.into_response()
    }

    pub async fn start_server(self) -> std::io::Result<()> {
        let address = format!("{}:{}", self.address, self.port);
        let app = Self::router(self.manager.clone());

        let listener = TcpListener::bind(&address).await?;
        info!(%address, workers = ?self.manager.workers, "manager API listening");
        axum::serve(listener, app).await
    }
}
