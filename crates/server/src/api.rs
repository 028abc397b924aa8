use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use catalog::{is_valid_snapshot_shape, GraphSnapshotPayload, SnapshotStore, StoreError};
use common::OperationTimer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Максимальный размер тела POST /api/graph
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Хранилище за мьютексом: все запросы работают с базой по очереди
pub type SharedStore = Arc<Mutex<SnapshotStore>>;

#[derive(Clone)]
pub struct AppState {
    store: SharedStore,
}

/// Тело ответа с ошибкой
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn from_store(context: &str, err: StoreError) -> Self {
        error!(error = %err, "{}", context);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Собрать роутер API поверх общего хранилища
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/api/graph", get(get_graph).post(post_graph))
        .route("/api/health", get(health))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(cors))
        .with_state(AppState { store })
}

/// Выполнить операцию с хранилищем в пуле блокирующих потоков
///
/// Блокировка берётся асинхронно, так что запросы по-прежнему идут по очереди,
/// а SQLite и запись файла не занимают поток рантайма.
async fn with_store<T, F>(store: &SharedStore, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut SnapshotStore) -> T + Send + 'static,
    T: Send + 'static,
{
    let mut guard = store.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || op(&mut *guard))
        .await
        .map_err(|err| {
            error!(error = %err, "Storage task failed");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Storage task failed")
        })
}

async fn get_graph(State(state): State<AppState>) -> Result<Json<GraphSnapshotPayload>, ApiError> {
    let snapshot = with_store(&state.store, |store| store.load_snapshot())
        .await?
        .map_err(|err| ApiError::from_store("Failed to load graph snapshot", err))?;
    Ok(Json(snapshot))
}

async fn post_graph(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, ApiError> {
    let body = body.map_err(|rejection| {
        warn!(status = %rejection.status(), "Rejected graph snapshot body");
        ApiError::new(rejection.status(), rejection.body_text())
    })?;

    let value: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::bad_request(format!("Request body is not valid JSON: {err}")))?;

    if !is_valid_snapshot_shape(&value) {
        return Err(ApiError::bad_request(
            "Graph snapshot must contain domains, modules and artifacts arrays",
        ));
    }

    let snapshot: GraphSnapshotPayload = serde_json::from_value(value)
        .map_err(|err| ApiError::bad_request(format!("Invalid graph snapshot: {err}")))?;

    let mut timer = OperationTimer::new("persist_snapshot");
    timer.add_field("domains", snapshot.domain_count());
    timer.add_field("modules", snapshot.modules.len());
    timer.add_field("artifacts", snapshot.artifacts.len());

    let result = with_store(&state.store, move |store| store.persist_snapshot(&snapshot)).await?;
    timer.finish_with_result(&result);

    result.map_err(|err| ApiError::from_store("Failed to persist graph snapshot", err))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

/// CORS для любого origin; preflight отвечает сразу
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[tokio::test(flavor = "current_thread")]
    async fn test_store_work_runs_off_the_runtime_thread() {
        let store: SharedStore = Arc::new(Mutex::new(SnapshotStore::new()));
        let runtime_thread = thread::current().id();

        let (worker_thread, is_open) =
            with_store(&store, |store| (thread::current().id(), store.is_open()))
                .await
                .expect("storage task");

        assert_ne!(worker_thread, runtime_thread);
        assert!(!is_open);
    }

    #[tokio::test]
    async fn test_store_errors_map_to_500() {
        let store: SharedStore = Arc::new(Mutex::new(SnapshotStore::new()));
        let err = with_store(&store, |store| store.load_snapshot())
            .await
            .expect("storage task")
            .map_err(|err| ApiError::from_store("Failed to load graph snapshot", err))
            .expect_err("closed store");

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("not initialized"));
    }
}
