//! HTTP surface against a running server with a scripted decoder

#![cfg(target_os = "linux")]

mod common;

use common::*;
use multicam_streamer::record_provider::RecordProvider;
use multicam_streamer::state::{AppConfig, AppState};
use multicam_streamer::web_api::create_router;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

struct TestServer {
    base: String,
    client: Client,
    state: AppState,
}

impl TestServer {
    async fn start() -> Self {
        let config = AppConfig {
            frame_width: 2,
            frame_height: 2,
            max_pipelines: 4,
            frame_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(100),
            restart_cooldown: Duration::from_millis(100),
            feed_max_fps: 0,
            feed_idle_timeout: Duration::from_secs(2),
            probe_timeout: Duration::from_millis(200),
            ..AppConfig::default()
        };
        let records = Arc::new(RecordProvider::in_memory(inventory(&[
            (1, &[1, 2]),
            (2, &[]),
        ])));
        let state = AppState::build_with_decoder(config, records, script_decoder(FRAMES));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            base: format!("http://{}", addr),
            client,
            state,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_healthz() {
    let server = TestServer::start().await;
    let (status, body) = server.get_json("/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["records_backend"], "memory");
    assert_eq!(body["live_pipelines"], 0);
    assert_eq!(body["admission"]["max_pipelines"], 4);
    assert_eq!(body["admission"]["healthy"], true);
}

#[tokio::test]
async fn test_multi_stream_activates_section() {
    let server = TestServer::start().await;

    let (status, body) = server.get_json("/api/multi_stream/1").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["ok"], true);
    let data = &body["data"];
    assert_eq!(data["message"], "All cameras feed path");
    assert_eq!(data["streams"]["1"], "/api/video_feed/1");
    assert_eq!(data["streams"]["2"], "/api/video_feed/2");
    assert_eq!(data["started"], serde_json::json!([1, 2]));
    assert_eq!(server.state.supervisor.live_count().await, 2);
    assert_eq!(server.state.supervisor.active_section().await, Some(1));

    // Trailing slash form retains everything
    let (status, body) = server.get_json("/api/multi_stream/1/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["retained"], serde_json::json!([1, 2]));
    assert_eq!(server.state.supervisor.live_count().await, 2);

    server.state.supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_multi_stream_errors() {
    let server = TestServer::start().await;

    let (status, body) = server.get_json("/api/multi_stream/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "SECTION_NOT_FOUND");

    let (status, body) = server.get_json("/api/multi_stream/2").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "UNAVAILABLE");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("No active cameras found"));
    assert_eq!(server.state.supervisor.live_count().await, 0);
}

#[tokio::test]
async fn test_video_feed_unknown_camera() {
    let server = TestServer::start().await;
    let (status, body) = server.get_json("/api/video_feed/42").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "CAMERA_NOT_FOUND");
    assert_eq!(server.state.supervisor.live_count().await, 0);
}

#[tokio::test]
async fn test_video_feed_streams_jpeg_parts() {
    let server = TestServer::start().await;

    let mut resp = server
        .client
        .get(server.url("/api/video_feed/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert_eq!(
        resp.headers()[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );

    let head = b"--frame\r\nContent-Type: image/jpeg\r\n";
    let mut body = Vec::new();
    while body.len() < head.len() + 64 {
        let chunk = resp
            .chunk()
            .await
            .unwrap()
            .expect("feed ended before the first frame");
        body.extend_from_slice(&chunk);
    }
    assert!(body.starts_with(head));
    let jpeg_start = body
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .unwrap();
    assert_eq!(&body[jpeg_start..jpeg_start + 2], &[0xFF, 0xD8]);
    assert!(server.state.supervisor.is_streaming(1).await);

    // Viewer disconnect leaves the pipeline running
    drop(resp);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.state.supervisor.is_streaming(1).await);

    let resp = server
        .client
        .delete(server.url("/api/streams/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["outcome"], "stopped");
    assert!(!server.state.supervisor.is_streaming(1).await);
}

#[tokio::test]
async fn test_records_endpoints() {
    let server = TestServer::start().await;

    let (status, body) = server.get_json("/api/sections/1").await;
    assert_eq!(status, StatusCode::OK);
    let cameras = body["data"]["cameras"].as_array().unwrap();
    assert_eq!(cameras.len(), 2);
    assert_eq!(cameras[0]["name"], "cam-1");
    assert!(cameras[0].get("password").is_none());

    let (status, body) = server.get_json("/api/cameras/7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "CAMERA_NOT_FOUND");

    let (status, body) = server.get_json("/api/cameras/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["feed_url"], "/api/video_feed/2");
    assert!(body["data"]["stream_health"].is_null());
    assert_eq!(body["data"]["streaming"], false);
}
