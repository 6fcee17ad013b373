//! End-to-end tests of the HTTP surface
//!
//! Requests go through the full router (body limit, CORS, tracing layers)
//! with a mock backend standing in for the segmentation model.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use garment_label_api::{
    server::{self, WELCOME_MESSAGE},
    BackendSegmenter, LabelDetectionProcessor, LabelTaxonomy, MockBackend,
};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::{atomic::Ordering, Arc};
use tower::ServiceExt;

const BOUNDARY: &str = "----garment-label-test-boundary";

fn app(backend: MockBackend) -> Router {
    app_with_limit(backend, 16 * 1024 * 1024)
}

fn app_with_limit(backend: MockBackend, max_upload_bytes: usize) -> Router {
    let segmenter = BackendSegmenter::new(Box::new(backend)).unwrap();
    let processor = LabelDetectionProcessor::new(Arc::new(segmenter), LabelTaxonomy::clothes());
    server::router(processor, max_upload_bytes)
}

fn encoded_image(format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(40, 30, |x, y| image::Rgb([x as u8 * 6, y as u8 * 8, 120]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

/// A single multipart part; `filename: None` omits the attribute entirely
struct Part<'a> {
    name: &'a str,
    filename: Option<&'a str>,
    data: &'a [u8],
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.filename {
            Some(filename) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.name, filename
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn predict_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_home_returns_welcome_text() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app(MockBackend::with_class_counts(18, (4, 4), &[]))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], WELCOME_MESSAGE.as_bytes());
}

#[tokio::test]
async fn test_predict_without_file_field() {
    let backend = MockBackend::with_class_counts(18, (4, 4), &[]);
    let calls = backend.call_counter();
    let request = predict_request(&[Part {
        name: "comment",
        filename: None,
        data: b"hello",
    }]);

    let (status, body) = send(app(backend), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_predict_with_non_multipart_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, body) = send(app(MockBackend::with_class_counts(18, (4, 4), &[])), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
}

#[tokio::test]
async fn test_predict_with_empty_filename() {
    let image = encoded_image(ImageFormat::Png);
    let request = predict_request(&[Part {
        name: "file",
        filename: Some(""),
        data: &image,
    }]);

    let (status, body) = send(app(MockBackend::with_class_counts(18, (4, 4), &[])), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No selected file" }));
}

#[tokio::test]
async fn test_predict_with_non_image_payload() {
    let backend = MockBackend::with_class_counts(18, (4, 4), &[]);
    let calls = backend.call_counter();
    let request = predict_request(&[Part {
        name: "file",
        filename: Some("x.txt"),
        data: b"this is plainly not an image",
    }]);

    let (status, body) = send(app(backend), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Could not process image:"), "{message}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_predict_dominant_label() {
    // 10x10 map: 70 background, 20 Upper-clothes, 10 Pants
    let backend = MockBackend::with_class_counts(18, (10, 10), &[(4, 20), (6, 10)]);
    let calls = backend.call_counter();
    let image = encoded_image(ImageFormat::Jpeg);
    let request = predict_request(&[Part {
        name: "file",
        filename: Some("outfit.jpg"),
        data: &image,
    }]);

    let (status, body) = send(app(backend), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "detected_label": "Upper-clothes" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_predict_background_only() {
    let image = encoded_image(ImageFormat::Png);
    let request = predict_request(&[Part {
        name: "file",
        filename: Some("empty-room.png"),
        data: &image,
    }]);

    let (status, body) = send(app(MockBackend::with_class_counts(18, (8, 8), &[])), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "detected_label": "None" }));
}

#[tokio::test]
async fn test_predict_picks_file_among_other_fields() {
    let backend = MockBackend::with_class_counts(18, (4, 4), &[(6, 3), (4, 2)]);
    let image = encoded_image(ImageFormat::Png);
    let request = predict_request(&[
        Part {
            name: "note",
            filename: None,
            data: b"ignored",
        },
        Part {
            name: "file",
            filename: Some("jeans.png"),
            data: &image,
        },
    ]);

    let (status, body) = send(app(backend), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "detected_label": "Pants" }));
}

#[tokio::test]
async fn test_predict_inference_failure() {
    let image = encoded_image(ImageFormat::Png);
    let request = predict_request(&[Part {
        name: "file",
        filename: Some("shirt.png"),
        data: &image,
    }]);

    let (status, body) = send(app(MockBackend::failing()), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Inference failed" }));
}

#[tokio::test]
async fn test_predict_rejects_oversized_body() {
    let image = encoded_image(ImageFormat::Png);
    let request = predict_request(&[Part {
        name: "file",
        filename: Some("big.png"),
        data: &image,
    }]);

    let backend = MockBackend::with_class_counts(18, (4, 4), &[]);
    let calls = backend.call_counter();
    let response = app_with_limit(backend, 64).oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let request = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app(MockBackend::with_class_counts(18, (4, 4), &[]))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_concurrent_requests_share_one_model() {
    let backend = MockBackend::with_class_counts(18, (4, 4), &[(4, 5)]);
    let calls = backend.call_counter();
    let router = app(backend);
    let image = encoded_image(ImageFormat::Png);

    let mut handles = Vec::new();
    for i in 0..4 {
        let router = router.clone();
        let image = image.clone();
        handles.push(tokio::spawn(async move {
            let filename = format!("shirt-{i}.png");
            let request = predict_request(&[Part {
                name: "file",
                filename: Some(&filename),
                data: &image,
            }]);
            send(router, request).await
        }));
    }

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "detected_label": "Upper-clothes" }));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
