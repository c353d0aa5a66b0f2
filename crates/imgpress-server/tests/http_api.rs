//! End-to-end tests driving the router with in-memory requests.

mod common;

use axum::http::StatusCode;
use common::{Form, body_bytes, body_json, build_test_app, get, header_str, png, send, test_config};
use image::{GenericImageView, ImageFormat};
use imgpress_core::OutputFormat;
use imgpress_server::ServerConfig;
use std::{
    io::{Cursor, Read},
    time::Duration,
};
use zip::ZipArchive;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn health_reports_ok_and_version() {
    let (_service, app) = build_test_app(test_config());
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn compress_returns_image_and_result_headers() {
    let (_service, app) = build_test_app(test_config());
    let input = png(200, 100);
    let request = Form::new()
        .file("file", "photo.png", &input)
        .text("quality", "50")
        .text("format", "jpeg")
        .into_request("/compress");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "image/jpeg");
    assert_eq!(header_str(&response, "x-original-size"), input.len().to_string());
    assert_eq!(header_str(&response, "x-strategy"), "scale");
    assert_eq!(header_str(&response, "x-job-id").len(), 36);
    assert_eq!(
        header_str(&response, "content-disposition"),
        "attachment; filename=\"photo.jpg\""
    );
    let compressed_size: usize = header_str(&response, "x-compressed-size").parse().unwrap();
    let ratio: f64 = header_str(&response, "x-compression-ratio").parse().unwrap();
    assert!(ratio > 0.0);
    let processing_ms: u64 = header_str(&response, "x-processing-time-ms").parse().unwrap();
    let latency_ms: u64 = header_str(&response, "x-latency-ms").parse().unwrap();
    assert!(latency_ms >= processing_ms);

    let body = body_bytes(response).await;
    assert_eq!(body.len(), compressed_size);
    let decoded = image::load_from_memory_with_format(&body, ImageFormat::Jpeg).unwrap();
    assert_eq!(decoded.dimensions(), (100, 50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn query_parameters_apply_and_unknown_values_fall_back() {
    let (_service, app) = build_test_app(test_config());
    let request = Form::new()
        .file("image", "a.png", &png(40, 40))
        .text("strategy", "does-not-exist")
        .into_request("/compress?format=png&quality=abc");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "image/png");
    assert_eq!(header_str(&response, "x-strategy"), "scale");

    // quality=abc falls back to 80.
    let decoded = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!(decoded.dimensions(), (32, 32));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unsupported_format_is_rejected() {
    let (_service, app) = build_test_app(test_config());
    let request = Form::new()
        .file("file", "a.png", &png(20, 20))
        .text("format", "tiff")
        .into_request("/compress");

    let response = send(app.clone(), request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let json = body_json(response).await;
    assert_eq!(json["kind"], "unsupported_format");

    let request = Form::new()
        .file("images", "a.png", &png(20, 20))
        .file("images", "b.png", &png(20, 20))
        .into_request("/compress/batch?format=gif");
    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_format_uses_configured_default() {
    let config = ServerConfig {
        default_format: OutputFormat::Png,
        ..test_config()
    };
    let (_service, app) = build_test_app(config);
    let request = Form::new()
        .file("file", "uploads/a.jpeg", &png(20, 20))
        .text("format", " ")
        .into_request("/compress");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "image/png");
    assert_eq!(
        header_str(&response, "content-disposition"),
        "attachment; filename=\"a.png\""
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn undecodable_upload_is_bad_request() {
    let (_service, app) = build_test_app(test_config());
    let request = Form::new()
        .file("file", "notes.txt", b"just some text")
        .into_request("/compress");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "decode");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_file_is_bad_request() {
    let (_service, app) = build_test_app(test_config());
    let request = Form::new().text("quality", "50").into_request("/compress");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "invalid_request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversized_body_is_rejected() {
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..test_config()
    };
    let (_service, app) = build_test_app(config);
    let request = Form::new()
        .file("file", "big.bin", &vec![7u8; 8 * 1024])
        .into_request("/compress");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn request_past_its_deadline_times_out() {
    let config = ServerConfig {
        num_workers: 1,
        request_timeout: Duration::from_millis(1),
        max_upload_bytes: 64 * 1024 * 1024,
        ..test_config()
    };
    let (_service, app) = build_test_app(config);
    let request = Form::new()
        .file("file", "large.png", &png(1500, 1500))
        .text("format", "png")
        .into_request("/compress");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["kind"], "timeout");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_packs_successes_and_lists_failures() {
    let (_service, app) = build_test_app(test_config());
    let request = Form::new()
        .file("images", "one.png", &png(30, 30))
        .file("images", "one.jpg", &common::image_bytes(30, 30, ImageFormat::Jpeg))
        .file("images", "broken.png", b"\x89PNG not really")
        .text("format", "png")
        .into_request("/compress/batch");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "application/zip");
    assert_eq!(header_str(&response, "x-failed-files"), "1");
    assert_eq!(header_str(&response, "x-processed-files"), "2");

    let mut archive = ZipArchive::new(Cursor::new(body_bytes(response).await)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, ["errors.json", "one.png", "one_1.png"]);

    let mut manifest = String::new();
    archive
        .by_name("errors.json")
        .unwrap()
        .read_to_string(&mut manifest)
        .unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest[0]["filename"], "broken.png");
    assert_eq!(manifest[0]["kind"], "decode");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_without_failures_has_no_manifest() {
    let (_service, app) = build_test_app(test_config());
    let request = Form::new()
        .file("images", "a.png", &png(16, 16))
        .file("images", "b.png", &png(16, 16))
        .into_request("/compress/batch");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-failed-files"), "0");

    let archive = ZipArchive::new(Cursor::new(body_bytes(response).await)).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(names, ["a.webp", "b.webp"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_where_everything_failed_is_unprocessable() {
    let (_service, app) = build_test_app(test_config());
    let request = Form::new()
        .file("images", "x.png", b"nope")
        .file("images", "y.png", b"nope either")
        .into_request("/compress/batch");

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["kind"], "batch_failed");
    assert_eq!(json["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_and_oversized_batches_are_bad_requests() {
    let (_service, app) = build_test_app(test_config());
    let response = send(
        app.clone(),
        Form::new().text("quality", "10").into_request("/compress/batch"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut form = Form::new();
    for i in 0..6 {
        form = form.file("images", &format!("{i}.png"), &png(8, 8));
    }
    let response = send(app, form.into_request("/compress/batch")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "invalid_request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stats_count_requests_and_bytes() {
    let (_service, app) = build_test_app(test_config());
    let input = png(50, 50);
    let response = send(
        app.clone(),
        Form::new().file("file", "a.png", &input).into_request("/compress"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(
        app.clone(),
        Form::new().file("file", "b.png", b"garbage").into_request("/compress"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(get(app, "/stats").await).await;
    assert_eq!(json["requests"], 2);
    assert_eq!(json["successes"], 1);
    assert_eq!(json["failures"], 1);
    assert_eq!(json["bytes_in"], input.len() as u64);
    assert_eq!(json["worker_count"], 2);
    assert_eq!(json["queue_capacity"], 4);
    assert_eq!(json["busy_workers"], 0);
    assert!(json["max_item_latency_ms"].as_f64().unwrap() > 0.0);
    assert!(json["avg_item_latency_ms"].as_f64().unwrap() > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_turns_health_and_compress_unavailable() {
    let (service, app) = build_test_app(test_config());
    service.shutdown().await;

    let response = get(app.clone(), "/health").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "shutting_down");

    let response = send(
        app,
        Form::new().file("file", "a.png", &png(10, 10)).into_request("/compress"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["kind"], "shutdown");
}
