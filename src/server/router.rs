use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router as AxumRouter};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};

use crate::planner::ListFilter;
use crate::{Error, Kind, Result, StudyPlanner};

/// Default bound on requests handled at the same time.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;

/// The uniform `{ success, data?, error? }` wrapper around every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}

/// HTTP status for each error kind.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::StorageUnavailable(_) | Error::Serialization(_) | Error::Http(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(ApiResponse::<()>::err(self.to_string()))).into_response()
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse::ok(data)).into_response()
}

type Shared = Arc<dyn StudyPlanner>;

fn server_error(e: std::io::Error) -> Error {
    Error::Internal(format!("server error: {}", e))
}

/// HTTP front end for a [`StudyPlanner`].
///
/// Requests beyond the in-flight limit are rejected with `503` rather than
/// queued.
pub struct Router {
    planner: Shared,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(planner: Shared) -> Self {
        Self {
            planner,
            semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    /// The axum application with every route and layer attached.
    pub fn app(&self) -> AxumRouter {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        AxumRouter::new()
            .route("/api/health", get(health))
            .route("/api/progress", get(progress))
            .route("/api/calendar", get(calendar))
            .route("/api/{kind}", get(list_items).post(create_item))
            .route("/api/{kind}/{id}", put(update_item).delete(delete_item))
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
            .with_state(self.planner.clone())
            .layer(middleware::from_fn_with_state(self.semaphore.clone(), limit_in_flight))
            .layer(middleware::from_fn(log_requests))
            .layer(cors)
    }

    pub async fn listen(&self, listener: TcpListener) -> Result<()> {
        info!("Cortex Plan listening on {}", listener.local_addr().map_err(server_error)?);
        axum::serve(listener, self.app()).await.map_err(server_error)
    }

    /// Like [`Router::listen`] but returns once `shutdown` resolves and all
    /// in-flight requests have finished.
    pub async fn listen_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("Cortex Plan listening on {}", listener.local_addr().map_err(server_error)?);
        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(server_error)
    }
}

async fn limit_in_flight(State(semaphore): State<Arc<Semaphore>>, req: Request, next: Next) -> Response {
    let _permit = match semaphore.try_acquire() {
        Ok(p) => p,
        Err(_) => {
            error!("Server busy: too many requests in flight. Rejecting {}", req.uri().path());
            return (StatusCode::SERVICE_UNAVAILABLE, Json(ApiResponse::<()>::err("server busy"))).into_response();
        }
    };
    next.run(req).await
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    info!("{} {} {} {:?}", method, path, response.status().as_u16(), started.elapsed());
    response
}

async fn not_found() -> Response {
    Error::NotFound("not found".to_string()).into_response()
}

async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, Json(ApiResponse::<()>::err("method not allowed"))).into_response()
}

async fn health() -> Response {
    ok(json!({ "status": "ok" }))
}

async fn progress(State(planner): State<Shared>) -> Result<Response> {
    Ok(ok(planner.progress().await?))
}

async fn calendar(State(planner): State<Shared>) -> Result<Response> {
    Ok(ok(planner.calendar().await?))
}

fn body(payload: std::result::Result<Json<Value>, JsonRejection>) -> Result<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| Error::Validation(format!("invalid JSON body: {}", rejection.body_text())))
}

async fn list_items(
    State(planner): State<Shared>,
    Path(kind): Path<String>,
    query: std::result::Result<Query<ListFilter>, QueryRejection>,
) -> Result<Response> {
    let kind: Kind = kind.parse()?;
    let Query(filter) = query.map_err(|rejection| Error::Validation(rejection.body_text()))?;
    let items = planner.list(kind, &filter).await?;
    Ok(ok(json!({ "items": items })))
}

async fn create_item(
    State(planner): State<Shared>,
    Path(kind): Path<String>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Response> {
    let kind: Kind = kind.parse()?;
    let created = planner.create(kind, body(payload)?).await?;
    Ok(ok(created))
}

async fn update_item(
    State(planner): State<Shared>,
    Path((kind, id)): Path<(String, String)>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Response> {
    let kind: Kind = kind.parse()?;
    let updated = planner.update(kind, &id, body(payload)?).await?;
    Ok(ok(updated))
}

async fn delete_item(
    State(planner): State<Shared>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response> {
    let kind: Kind = kind.parse()?;
    if !planner.delete(kind, &id).await? {
        return Err(Error::NotFound(format!("{} {} not found", kind.entity_name(), id)));
    }
    Ok(ok(json!({ "id": id, "deleted": true })))
}
