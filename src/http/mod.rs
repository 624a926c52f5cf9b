//! HTTP request surface.
//!
//! | Verb   | Operation             |
//! |--------|-----------------------|
//! | GET    | read (listing, file, or zip with `Accept: application/x-gtar`) |
//! | HEAD   | headers of GET        |
//! | PUT    | create (never overwrites) |
//! | POST   | replace an existing file |
//! | DELETE | remove, recursively for directories |

mod response;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::executor::{Executor, ReadMode, ReadOutcome};
pub use response::{ApiError, Operation};

/// `Accept` value that asks for a directory as a zip archive.
pub const ARCHIVE_ACCEPT: &str = "application/x-gtar";

/// Build the router serving the managed root.
pub fn router(executor: Executor) -> Router {
    let resource = || -> MethodRouter<Executor> {
        get(get_resource)
            .head(head_resource)
            .put(put_resource)
            .post(post_resource)
            .delete(delete_resource)
    };

    Router::new()
        .route("/", resource())
        .route("/{*path}", resource())
        .with_state(executor)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn raw_path(path: Option<Path<String>>) -> String {
    path.map(|Path(p)| p).unwrap_or_default()
}

fn read_mode(headers: &HeaderMap) -> ReadMode {
    let wants_archive = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == ARCHIVE_ACCEPT);
    if wants_archive {
        ReadMode::Archive
    } else {
        ReadMode::Plain
    }
}

async fn read(
    executor: &Executor,
    path: Option<Path<String>>,
    headers: &HeaderMap,
    with_body: bool,
) -> Result<Response, ApiError> {
    let path = executor
        .resolve(&raw_path(path))
        .map_err(ApiError::read)?;
    let outcome = executor
        .read(&path, read_mode(headers))
        .await
        .map_err(ApiError::read)?;
    Ok(render(outcome, with_body))
}

async fn get_resource(
    State(executor): State<Executor>,
    path: Option<Path<String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    read(&executor, path, &headers, true).await
}

async fn head_resource(
    State(executor): State<Executor>,
    path: Option<Path<String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    read(&executor, path, &headers, false).await
}

async fn put_resource(
    State(executor): State<Executor>,
    path: Option<Path<String>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let path = executor
        .resolve(&raw_path(path))
        .map_err(ApiError::create)?;
    executor
        .create(&path, &body)
        .await
        .map_err(ApiError::create)?;
    Ok(StatusCode::OK)
}

async fn post_resource(
    State(executor): State<Executor>,
    path: Option<Path<String>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let path = executor
        .resolve(&raw_path(path))
        .map_err(ApiError::replace)?;
    executor
        .replace(&path, &body)
        .await
        .map_err(ApiError::replace)?;
    Ok(StatusCode::OK)
}

async fn delete_resource(
    State(executor): State<Executor>,
    path: Option<Path<String>>,
) -> Result<StatusCode, ApiError> {
    let path = executor
        .resolve(&raw_path(path))
        .map_err(ApiError::remove)?;
    executor.remove(&path).await.map_err(ApiError::remove)?;
    Ok(StatusCode::OK)
}

/// Headers of a read, plus the body unless `with_body` is false (HEAD).
///
/// Archives are streamed while they are built, so they carry no
/// `Content-Length`; HEAD never starts building one.
fn render(outcome: ReadOutcome, with_body: bool) -> Response {
    let body = |body: Body| if with_body { body } else { Body::empty() };
    match outcome {
        ReadOutcome::Listing(names) => {
            // A Vec<String> always serializes.
            let json = serde_json::to_vec(&names).unwrap_or_else(|_| b"[]".to_vec());
            (
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                    (header::CONTENT_LENGTH, HeaderValue::from(json.len())),
                ],
                body(Body::from(json)),
            )
                .into_response()
        }
        ReadOutcome::File(file) => {
            let content_type = HeaderValue::from_str(&file.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_LENGTH, HeaderValue::from(file.len)),
                ],
                body(Body::from_stream(ReaderStream::new(file.file))),
            )
                .into_response()
        }
        ReadOutcome::Archive(archive) => {
            let headers = [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
                (
                    header::CONTENT_DISPOSITION,
                    HeaderValue::from_static("attachment; filename=\"archive.zip\""),
                ),
            ];
            if with_body {
                (headers, Body::from_stream(ReaderStream::new(archive.stream()))).into_response()
            } else {
                (headers, Body::empty()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use axum::http::{Method, Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::event::{EventBus, ChangeKind};
    use crate::resolver::Resolver;

    fn setup() -> (TempDir, std::path::PathBuf, EventBus, Router) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let bus = EventBus::new(64);
        let app = router(Executor::new(Resolver::new(root.clone()), bus.clone()));
        (dir, root, bus, app)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_put_then_get_file() {
        let (_dir, _root, bus, app) = setup();
        let mut events = bus.subscribe();

        let resp = send(&app, Method::PUT, "/foo/bar.txt", "hello").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let ev = events.try_recv().unwrap();
        assert_eq!(ev.kind(), ChangeKind::Created);
        assert_eq!(ev.path(), "/foo/bar.txt");

        let resp = send(&app, Method::GET, "/foo/bar.txt", "").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(body_bytes(resp).await, b"hello");
    }

    #[tokio::test]
    async fn test_get_directory_listing() {
        let (_dir, root, _bus, app) = setup();
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs/a.md"), "a").unwrap();

        let resp = send(&app, Method::GET, "/docs", "").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let names: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(names, vec!["a.md".to_string()]);

        let resp = send(&app, Method::GET, "/", "").await;
        let names: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(names, vec!["docs".to_string()]);
    }

    async fn send_archive(app: &Router, method: Method, uri: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::ACCEPT, ARCHIVE_ACCEPT)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_directory_as_archive() {
        let (_dir, root, _bus, app) = setup();
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs/a.md"), "a").unwrap();
        fs::write(root.join("docs/.secret"), "token").unwrap();
        fs::write(root.join(".treecast.toml"), "[server]\n").unwrap();

        let resp = send_archive(&app, Method::GET, "/docs").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
        assert!(resp.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(
            resp.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .contains("archive.zip")
        );
        let archive = zip::ZipArchive::new(Cursor::new(body_bytes(resp).await)).unwrap();
        assert_eq!(archive.file_names().collect::<Vec<_>>(), vec!["a.md"]);

        let resp = send_archive(&app, Method::GET, "/").await;
        let archive = zip::ZipArchive::new(Cursor::new(body_bytes(resp).await)).unwrap();
        let mut names: Vec<_> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["docs/", "docs/a.md"]);
    }

    #[tokio::test]
    async fn test_head_archive_sends_headers_only() {
        let (_dir, root, _bus, app) = setup();
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs/a.md"), "a").unwrap();

        let resp = send_archive(&app, Method::HEAD, "/docs").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
        assert!(resp.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(body_bytes(resp).await.is_empty());

        let resp = send_archive(&app, Method::HEAD, "/missing").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_mirrors_get_without_body() {
        let (_dir, root, _bus, app) = setup();
        fs::write(root.join("a.json"), "{\"k\":1}").unwrap();

        let resp = send(&app, Method::HEAD, "/a.json", "").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "7");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (_dir, root, _bus, app) = setup();
        fs::write(root.join("exists.txt"), "keep").unwrap();
        fs::create_dir(root.join("dir")).unwrap();

        let cases = [
            (Method::GET, "/missing.txt", StatusCode::NOT_FOUND),
            (Method::PUT, "/exists.txt", StatusCode::METHOD_NOT_ALLOWED),
            (Method::PUT, "/dir", StatusCode::METHOD_NOT_ALLOWED),
            (Method::POST, "/missing.txt", StatusCode::METHOD_NOT_ALLOWED),
            (Method::POST, "/dir", StatusCode::METHOD_NOT_ALLOWED),
            (Method::DELETE, "/missing.txt", StatusCode::BAD_REQUEST),
            (Method::DELETE, "/", StatusCode::BAD_REQUEST),
            (Method::GET, "/%2e%2e/etc/passwd", StatusCode::BAD_REQUEST),
        ];
        for (method, uri, expected) in cases {
            let resp = send(&app, method.clone(), uri, "body").await;
            assert_eq!(resp.status(), expected, "{method} {uri}");
        }
        assert_eq!(fs::read_to_string(root.join("exists.txt")).unwrap(), "keep");
        assert!(!root.join("missing.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_bad_request() {
        let (_dir, root, _bus, app) = setup();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        let cases = [
            (Method::GET, "/link/secret.txt"),
            (Method::HEAD, "/link/secret.txt"),
            (Method::GET, "/link"),
            (Method::POST, "/link/secret.txt"),
            (Method::PUT, "/link/planted.txt"),
            (Method::DELETE, "/link/secret.txt"),
        ];
        for (method, uri) in cases {
            let resp = send(&app, method.clone(), uri, "owned").await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{method} {uri}");
        }
        assert_eq!(
            fs::read_to_string(outside.path().join("secret.txt")).unwrap(),
            "secret"
        );
        assert!(!outside.path().join("planted.txt").exists());
    }

    #[tokio::test]
    async fn test_post_replaces_and_delete_removes() {
        let (_dir, root, _bus, app) = setup();
        fs::write(root.join("a.txt"), "old").unwrap();

        assert_eq!(send(&app, Method::POST, "/a.txt", "new").await.status(), StatusCode::OK);
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "new");

        assert_eq!(send(&app, Method::DELETE, "/a.txt", "").await.status(), StatusCode::OK);
        assert!(!root.join("a.txt").exists());
    }
}
