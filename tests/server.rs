use std::{io::Cursor, sync::Arc};

use infernum_pose::{
    CoordinateConvention, DetectResponse, InferenceModel, NormalizedLandmark, PoseDetector,
    PoseLandmarks, PoseModel, PoseRequest, StatusResponse,
};
use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use serde_json::{Value, json};

/// Returns the same landmarks for every image, or none for a black one.
struct FixedPose(PoseLandmarks);

impl InferenceModel for FixedPose {
    type Request = PoseRequest;
    type Response = PoseLandmarks;
    type Error = std::convert::Infallible;

    fn run(&mut self, request: PoseRequest) -> Result<PoseLandmarks, Self::Error> {
        if request.image.as_slice().iter().all(|&v| v == 0) {
            return Ok(PoseLandmarks::new());
        }
        Ok(self.0.clone())
    }
}

impl PoseModel for FixedPose {}

fn landmarks() -> PoseLandmarks {
    vec![
        NormalizedLandmark {
            x: 0.5,
            y: 0.25,
            z: -0.125,
            visibility: 0.9,
        },
        NormalizedLandmark {
            x: 0.0,
            y: 1.0,
            z: 0.5,
            visibility: 0.4,
        },
    ]
}

async fn spawn_server(convention: CoordinateConvention) -> String {
    let detector = Arc::new(PoseDetector::new(FixedPose(landmarks()), convention));
    let app = infernum_pose::router(detector);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    format!("http://{addr}")
}

fn png(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
    let buffer = image::RgbImage::from_pixel(width, height, image::Rgb(pixel));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(buffer)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn upload(bytes: Vec<u8>) -> Form {
    Form::new().part("file", Part::bytes(bytes).file_name("frame.png"))
}

async fn post(base: &str, form: Form) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(format!("{base}/detect"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    (response.status(), response.json().await.unwrap())
}

#[tokio::test]
async fn missing_file_field_is_a_bad_request() {
    let base = spawn_server(CoordinateConvention::default()).await;

    let form = Form::new().text("other", "value");
    let (status, body) = post(&base, form).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
}

#[tokio::test]
async fn text_field_named_file_is_not_an_upload() {
    let base = spawn_server(CoordinateConvention::default()).await;

    let form = Form::new().text("file", "hello");
    let (status, body) = post(&base, form).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
}

#[tokio::test]
async fn non_multipart_body_is_a_bad_request() {
    let base = spawn_server(CoordinateConvention::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/detect"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "No file uploaded" }));
}

#[tokio::test]
async fn keypoints_are_scaled_to_image_pixels() {
    let base = spawn_server(CoordinateConvention::default()).await;

    let (status, body) = post(&base, upload(png(64, 32, [200, 100, 50]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "keypoints": [[32.0, 8.0, -0.125], [0.0, 32.0, 0.5]] })
    );

    let response: DetectResponse = serde_json::from_value(body).unwrap();
    for keypoint in response.keypoints {
        assert!((0.0..=64.0).contains(&keypoint.0));
        assert!((0.0..=32.0).contains(&keypoint.1));
    }
}

#[tokio::test]
async fn flipped_convention_moves_the_origin() {
    let base = spawn_server(CoordinateConvention {
        flip_x: false,
        flip_y: true,
    })
    .await;

    let (status, body) = post(&base, upload(png(64, 32, [1, 1, 1]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "keypoints": [[32.0, 24.0, -0.125], [0.0, 0.0, 0.5]] })
    );
}

#[tokio::test]
async fn no_person_yields_empty_keypoints() {
    let base = spawn_server(CoordinateConvention::default()).await;

    let (status, body) = post(&base, upload(png(16, 16, [0, 0, 0]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "keypoints": [] }));
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let base = spawn_server(CoordinateConvention::default()).await;

    let (status, body) = post(&base, upload(b"not an image at all".to_vec())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Invalid image"), "{message}");
}

#[tokio::test]
async fn same_image_twice_gives_same_count() {
    let base = spawn_server(CoordinateConvention::default()).await;
    let bytes = png(40, 30, [90, 90, 90]);

    let (_, first) = post(&base, upload(bytes.clone())).await;
    let (_, second) = post(&base, upload(bytes)).await;

    assert_eq!(
        first["keypoints"].as_array().unwrap().len(),
        second["keypoints"].as_array().unwrap().len()
    );
}

#[tokio::test]
async fn status_reports_idle_engine_and_request_count() {
    let base = spawn_server(CoordinateConvention::default()).await;
    post(&base, upload(png(8, 8, [5, 5, 5]))).await;

    let status: StatusResponse = reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status.status, "idle");
    assert_eq!(status.requests, 1);

    let welcome = reqwest::get(&base).await.unwrap().text().await.unwrap();
    assert_eq!(welcome, "Welcome to infernum-pose!");
}
