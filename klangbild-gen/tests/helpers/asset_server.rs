//! Local HTTP server standing in for remote asset hosts and the inference
//! sidecar

use axum::{
    extract::Path,
    http::{header, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::net::SocketAddr;

use super::mocks::{sample_jpeg, sample_png};

/// Running test server
pub struct AssetServer {
    pub addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl AssetServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl Drop for AssetServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Routes:
/// - `GET /image.png`, `GET /image.jpg`: valid images
/// - `GET /sized/:width`: PNG `width` pixels wide, 3 high
/// - `GET /missing.png`: 404
/// - `GET /garbage.png`: 200 with undecodable body
/// - `POST /img2img`: echoes the posted image back
/// - `POST /musicgen`: short clip at 32 kHz
/// - `POST /failing/img2img`, `POST /failing/musicgen`: 500
pub async fn spawn_asset_server() -> AssetServer {
    let app = Router::new()
        .route(
            "/image.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], sample_png(8, 8)) }),
        )
        .route(
            "/image.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], sample_jpeg(6, 4)) }),
        )
        .route(
            "/sized/:width",
            get(|Path(width): Path<u32>| async move {
                ([(header::CONTENT_TYPE, "image/png")], sample_png(width, 3))
            }),
        )
        .route(
            "/missing.png",
            get(|| async { (StatusCode::NOT_FOUND, "not here") }),
        )
        .route(
            "/garbage.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], b"not an image".to_vec()) }),
        )
        .route(
            "/img2img",
            post(|Json(body): Json<Value>| async move {
                let image = body["image"].as_str().unwrap_or_default().to_string();
                Json(json!({ "image": image }))
            }),
        )
        .route(
            "/musicgen",
            post(|Json(body): Json<Value>| async move {
                assert!(body["prompt"].as_str().is_some());
                Json(json!({ "samples": [0.0, 0.25, -0.25, 0.5], "sample_rate": 32000 }))
            }),
        )
        .route(
            "/failing/img2img",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        )
        .route(
            "/failing/musicgen",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    AssetServer { addr, handle }
}

/// Base64 of a valid PNG, for request bodies
pub fn sample_png_base64() -> String {
    STANDARD.encode(sample_png(4, 4))
}
