//! HTTP control surface
//! Small axum API over the list store and syncer: manage list entries, view
//! per-entry sync status, trigger a run, and download generated artifacts.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::store::{ListEntry, ListStore, StoreError};
use crate::sync::{SyncOutcome, Syncer};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ListStore>,
    pub syncer: Arc<Syncer>,
}

/// Serve the API until a shutdown signal arrives
pub async fn serve(addr: SocketAddr, state: AppState, data_dir: &Path) -> std::io::Result<()> {
    let app = build_router(state, data_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Build the complete router
pub fn build_router(state: AppState, data_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/lists", get(get_lists).post(add_list))
        .route("/lists/{name}", put(update_list))
        .route("/status", get(get_status))
        .route("/sync", post(sync_now))
        .nest_service("/files", ServeDir::new(data_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn get_lists(State(state): State<AppState>) -> Json<Vec<ListEntry>> {
    Json(state.store.snapshot())
}

async fn add_list(
    State(state): State<AppState>,
    Json(entry): Json<ListEntry>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.append(entry)?;
    Ok((StatusCode::CREATED, Json(json!({"message": "list added"}))))
}

#[derive(Debug, Deserialize)]
struct UpdateListRequest {
    m3u: String,
    epg: String,
}

async fn update_list(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
    Json(req): Json<UpdateListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.update(&name, req.m3u, req.epg)?;
    Ok(Json(json!({"message": "list updated"})))
}

async fn get_status(State(state): State<AppState>) -> Json<HashMap<String, SyncOutcome>> {
    Json(state.syncer.status())
}

/// Kick off a cycle and acknowledge immediately; the outcome shows up under
/// /status once the run finishes.
async fn sync_now(State(state): State<AppState>) -> impl IntoResponse {
    state.syncer.trigger_now();
    (StatusCode::ACCEPTED, Json(json!({"message": "sync started"})))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::InvalidName(_) | StoreError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            StoreError::Duplicate(_) => StatusCode::CONFLICT,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            // Json only surfaces here when serializing the configuration
            // for persistence fails; malformed request bodies are rejected
            // by the Json extractor before the handler runs.
            StoreError::Io(_) | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("list store failure: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Fetcher;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(dir: &Path) -> AppState {
        let store = Arc::new(ListStore::load(&dir.join("config.json")).unwrap());
        let fetcher = Fetcher::new(Duration::from_secs(5), "m3u-epg-matcher-test");
        let syncer = Arc::new(Syncer::new(
            Arc::clone(&store),
            dir.join("data"),
            fetcher,
        ));
        AppState { store, syncer }
    }

    fn router(dir: &Path) -> Router {
        std::fs::create_dir_all(dir.join("data")).unwrap();
        build_router(test_state(dir), &dir.join("data"))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_add_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .clone()
            .oneshot(
                Request::post("/lists")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"name": "uk", "m3u": "http://x/a.m3u", "epg": "http://x/a.xml.gz"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(Request::get("/lists").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let lists = body_json(response).await;
        assert_eq!(lists[0]["name"], "uk");
    }

    #[tokio::test]
    async fn test_add_rejects_traversal_name() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .oneshot(
                Request::post("/lists")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"name": "../evil", "m3u": "http://x/a", "epg": "http://x/b"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("invalid list name"));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());
        let entry = r#"{"name": "uk", "m3u": "http://x/a.m3u", "epg": "http://x/a.xml.gz"}"#;

        let post = |app: Router| async move {
            app.oneshot(
                Request::post("/lists")
                    .header("content-type", "application/json")
                    .body(Body::from(entry))
                    .unwrap(),
            )
            .await
            .unwrap()
        };

        assert_eq!(post(app.clone()).await.status(), StatusCode::CREATED);
        assert_eq!(post(app).await.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_update_unknown_list_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .oneshot(
                Request::put("/lists/nope")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"m3u": "http://x/a", "epg": "http://x/b"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_persistence_failures_map_to_500() {
        let json_err = serde_json::from_str::<ListEntry>("{").unwrap_err();
        let response = ApiError(StoreError::Json(json_err)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let io_err = std::io::Error::other("disk full");
        let response = ApiError(StoreError::Io(io_err)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_add_with_unwritable_store_is_500() {
        // A valid request that cannot be persisted is the server's fault
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let store =
            Arc::new(ListStore::load(&dir.path().join("missing").join("config.json")).unwrap());
        let fetcher = Fetcher::new(Duration::from_secs(5), "m3u-epg-matcher-test");
        let syncer = Arc::new(Syncer::new(
            Arc::clone(&store),
            dir.path().join("data"),
            fetcher,
        ));
        let app = build_router(AppState { store, syncer }, &dir.path().join("data"));

        let response = app
            .oneshot(
                Request::post("/lists")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"name": "uk", "m3u": "http://x/a.m3u", "epg": "http://x/a.xml.gz"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_sync_acknowledges_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .oneshot(Request::post("/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_status_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_files_serves_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());
        std::fs::write(
            dir.path().join("data").join("uk_matched.m3u"),
            "#EXTM3U\n",
        )
        .unwrap();

        let response = app
            .oneshot(
                Request::get("/files/uk_matched.m3u")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
