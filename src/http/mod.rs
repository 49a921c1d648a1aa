//! The HTTP adapter: a thin axum layer translating JSON requests into calls
//! against the core subsystems and rendering their results back out. Request
//! parsing, routing, and CORS live here; nothing else does.

mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::path_safety::PathSafety;
use crate::task_manager::TaskManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub path_safety: PathSafety,
    pub task_manager: TaskManager,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/files", get(handlers::list_files))
        .route("/path-info", get(handlers::path_info))
        .route("/search", get(handlers::search))
        .route("/create-folder", post(handlers::create_folder))
        .route("/create-file", post(handlers::create_file))
        .route("/update-file", post(handlers::update_file))
        .route("/rename", post(handlers::rename))
        .route("/delete", delete(handlers::delete_one))
        .route("/delete/batch", post(handlers::delete_batch))
        .route("/copy/batch", post(handlers::copy_batch))
        .route("/move/batch", post(handlers::move_batch))
        .route("/count-files", post(handlers::count_files))
        .route("/tasks/{id}/progress", get(handlers::task_progress))
        .route("/tasks/{id}/cancel", post(handlers::task_cancel))
        .route("/api/config", get(handlers::get_config))
        .route("/history", get(handlers::get_history).post(handlers::save_history))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, build_router(state)).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::path_safety::PathConfinement;

    fn test_state(root: &std::path::Path) -> AppState {
        AppState {
            config: Arc::new(Config {
                base_dir: root.to_path_buf(),
                start_dir: root.to_path_buf(),
                host: "127.0.0.1".to_string(),
                port: 0,
            }),
            path_safety: PathSafety::new(PathConfinement::new(root.to_path_buf())),
            task_manager: TaskManager::new(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn path_escaping_root_returns_forbidden() {
        let dir = tempdir().unwrap();
        let router = build_router(test_state(dir.path()));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/files?path=../etc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_folder_then_list_round_trips() {
        let dir = tempdir().unwrap();
        let router = build_router(test_state(dir.path()));

        let create = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/create-folder")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"path": "", "name": "notes"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(create.status(), StatusCode::OK);

        let list = router
            .oneshot(
                Request::builder()
                    .uri("/files?path=")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(list.status(), StatusCode::OK);
        let body = body_json(list).await;
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "notes");
    }

    #[tokio::test]
    async fn copy_collision_returns_200_with_item_level_failure() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        std::fs::write(dir.path().join("out/a.txt"), "B").unwrap();

        let router = build_router(test_state(dir.path()));
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/copy/batch")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"src_paths": ["a.txt"], "dest_path": "out", "overwrite": false}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success_count"], 0);
        assert_eq!(body["fail_count"], 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("out/a.txt")).unwrap(), "B");
    }
}
