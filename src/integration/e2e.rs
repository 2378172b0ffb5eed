//! End-to-end scenarios through the router

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

use crate::http::create_router;
use crate::integration::fixtures::{patterned_bytes, signature_for, stream_uri, MountFixture};
use crate::signature::{sign, Claims};
use crate::state::AppState;

struct Gateway {
    fixture: MountFixture,
    state: Arc<AppState>,
}

impl Gateway {
    fn new(mounts: usize) -> Self {
        let fixture = MountFixture::new(mounts);
        let state = Arc::new(AppState::new(fixture.server_config()));
        Self { fixture, state }
    }

    fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn stream(&self, path: &str) -> Response {
        self.get(&stream_uri(path, &signature_for(3600))).await
    }
}

async fn body(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn text(response: Response) -> String {
    String::from_utf8(body(response).await.to_vec()).unwrap()
}

/// Swap the claims of a valid envelope while keeping its tag.
fn tampered_signature() -> String {
    let outer = STANDARD.decode(signature_for(3600)).unwrap();
    let mut envelope: serde_json::Value = serde_json::from_slice(&outer).unwrap();
    let forged = Claims {
        item_id: "other-item".into(),
        media_id: "media-1".into(),
        expire_at: chrono::Utc::now().timestamp() + 3600,
    };
    envelope["data"] = STANDARD
        .encode(serde_json::to_vec(&forged).unwrap())
        .into();
    STANDARD.encode(serde_json::to_vec(&envelope).unwrap())
}

#[tokio::test]
async fn test_streams_file_from_the_mount_that_has_it() {
    let gw = Gateway::new(3);
    gw.fixture.write(2, "movies/film.mp4", &patterned_bytes(4096));

    let response = gw.stream("movies/film.mp4").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "4096");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
    assert_eq!(body(response).await.as_ref(), &patterned_bytes(4096)[..]);

    assert_eq!(
        gw.state.cache.load("movies/film.mp4"),
        Some(gw.fixture.path(2, "movies/film.mp4"))
    );
}

#[tokio::test]
async fn test_range_request() {
    let gw = Gateway::new(2);
    gw.fixture.write(0, "a.mp4", &patterned_bytes(1000));

    let request = Request::get(stream_uri("a.mp4", &signature_for(3600)))
        .header(header::RANGE, "bytes=100-199")
        .body(Body::empty())
        .unwrap();
    let response = gw.send(request).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-199/1000");
    let bytes = body(response).await;
    assert_eq!(bytes.len(), 100);
    assert_eq!(bytes.as_ref(), &patterned_bytes(1000)[100..200]);
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let gw = Gateway::new(1);
    gw.fixture.write(0, "a.mp4", &patterned_bytes(10));

    let request = Request::get(stream_uri("a.mp4", &signature_for(3600)))
        .header(header::RANGE, "bytes=50-60")
        .body(Body::empty())
        .unwrap();
    let response = gw.send(request).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
}

#[tokio::test]
async fn test_missing_parameters_are_bad_requests() {
    let gw = Gateway::new(1);
    gw.fixture.write(0, "a.mp4", b"x");
    let signature = signature_for(3600);

    for uri in [
        "/stream".to_string(),
        "/stream?path=a.mp4".to_string(),
        stream_uri("a.mp4", ""),
        stream_uri("", &signature),
    ] {
        let response = gw.get(&uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(text(response).await, "Missing path or signature");
    }
}

#[tokio::test]
async fn test_expired_signature_is_forbidden() {
    let gw = Gateway::new(1);
    gw.fixture.write(0, "a.mp4", b"x");

    let response = gw.get(&stream_uri("a.mp4", &signature_for(-60))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(text(response).await, "Invalid or expired signature");
    // rejected before the resolver ran
    assert!(gw.state.cache.is_empty());
}

#[tokio::test]
async fn test_tampered_and_foreign_signatures_are_forbidden() {
    let gw = Gateway::new(1);
    gw.fixture.write(0, "a.mp4", b"x");

    let foreign = sign(
        &Claims {
            item_id: "item-1".into(),
            media_id: "media-1".into(),
            expire_at: chrono::Utc::now().timestamp() + 3600,
        },
        "some-other-secret",
    )
    .unwrap();

    for sig in [tampered_signature(), foreign, "not base64!".to_string()] {
        let response = gw.get(&stream_uri("a.mp4", &sig)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
    assert!(gw.state.cache.is_empty());
}

#[tokio::test]
async fn test_traversal_is_forbidden() {
    let gw = Gateway::new(1);
    gw.fixture.mkdir(0, "inner");

    for path in ["../../etc/passwd", "inner/../../x", "/.."] {
        let response = gw.stream(path).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", path);
        assert_eq!(text(response).await, "Invalid path");
    }
}

#[tokio::test]
async fn test_directory_is_forbidden() {
    let gw = Gateway::new(2);
    gw.fixture.mkdir(1, "season1");

    let response = gw.stream("season1").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let gw = Gateway::new(3);

    let response = gw.stream("nowhere.mp4").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let message = text(response).await;
    assert_eq!(message, "File not found");
    assert!(gw.state.cache.is_empty());
}

#[tokio::test]
async fn test_second_request_uses_cache_and_survives_moves() {
    let gw = Gateway::new(2);
    gw.fixture.write(0, "a.mp4", b"first");

    assert_eq!(body(gw.stream("a.mp4").await).await.as_ref(), b"first");
    assert_eq!(body(gw.stream("./a.mp4").await).await.as_ref(), b"first");
    assert_eq!(gw.state.cache.len(), 1);

    std::fs::remove_file(gw.fixture.path(0, "a.mp4")).unwrap();
    gw.fixture.write(1, "a.mp4", b"moved");

    let response = gw.stream("a.mp4").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await.as_ref(), b"moved");
    assert_eq!(
        gw.state.cache.load("a.mp4"),
        Some(gw.fixture.path(1, "a.mp4"))
    );
}

#[tokio::test]
async fn test_head_request() {
    let gw = Gateway::new(1);
    gw.fixture.write(0, "a.mkv", &patterned_bytes(300));

    let request = Request::builder()
        .method(Method::HEAD)
        .uri(stream_uri("a.mkv", &signature_for(3600)))
        .body(Body::empty())
        .unwrap();
    let response = gw.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "300");
    assert!(body(response).await.is_empty());
}

#[tokio::test]
async fn test_conditional_get() {
    let gw = Gateway::new(1);
    gw.fixture.write(0, "a.mp4", &patterned_bytes(64));

    let first = gw.stream("a.mp4").await;
    let etag = first.headers()[header::ETAG].clone();

    let request = Request::get(stream_uri("a.mp4", &signature_for(3600)))
        .header(header::IF_NONE_MATCH, etag)
        .body(Body::empty())
        .unwrap();
    let response = gw.send(request).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body(response).await.is_empty());
}

#[tokio::test]
async fn test_health_counts_cache_entries() {
    let gw = Gateway::new(2);
    gw.fixture.write(0, "a.mp4", b"x");
    gw.fixture.write(1, "b.mp4", b"y");

    body(gw.stream("a.mp4").await).await;
    body(gw.stream("b.mp4").await).await;

    let health: serde_json::Value =
        serde_json::from_slice(&body(gw.get("/health").await).await).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["mounts"], 2);
    assert_eq!(health["cache_entries"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_streams() {
    let gw = Arc::new(Gateway::new(3));
    for i in 0..3 {
        gw.fixture.write(i, "hot.mp4", &patterned_bytes(2048));
    }

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let gw = Arc::clone(&gw);
            tokio::spawn(async move {
                let response = gw.stream("hot.mp4").await;
                assert_eq!(response.status(), StatusCode::OK);
                body(response).await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().len(), 2048);
    }
    assert_eq!(gw.state.cache.len(), 1);
}
