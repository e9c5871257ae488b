use std::{path::PathBuf, sync::Arc};

use argh::FromArgs;
use infernum_pose::{
    BlazePoseLandmarker, CoordinateConvention, LandmarkerConfig, PoseDetector, RunningMode,
    config::{
        DEFAULT_HOST, DEFAULT_INPUT_NAME, DEFAULT_INPUT_SIZE, DEFAULT_INTRA_THREADS,
        DEFAULT_LANDMARKS_OUTPUT, DEFAULT_MIN_DETECTION_CONFIDENCE,
        DEFAULT_MIN_TRACKING_CONFIDENCE, DEFAULT_MODEL_PATH, DEFAULT_PORT,
        DEFAULT_PRESENCE_OUTPUT,
    },
};

#[derive(FromArgs)]
/// Serves pose keypoints detected in uploaded images.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// path to the ONNX pose landmark model
    #[argh(option, short = 'm', default = "PathBuf::from(DEFAULT_MODEL_PATH)")]
    model: PathBuf,

    /// side of the square model input in pixels
    #[argh(option, default = "DEFAULT_INPUT_SIZE")]
    input_size: usize,

    /// presence score needed to accept a pose found on the full frame
    #[argh(option, default = "DEFAULT_MIN_DETECTION_CONFIDENCE")]
    min_detection_confidence: f32,

    /// presence score needed to keep tracking a pose between images
    #[argh(option, default = "DEFAULT_MIN_TRACKING_CONFIDENCE")]
    min_tracking_confidence: f32,

    /// treat every image independently instead of tracking
    #[argh(switch)]
    static_image_mode: bool,

    /// mirror x coordinates (x = width - x)
    #[argh(switch)]
    flip_x: bool,

    /// put the origin at the bottom-left corner (y = height - y)
    #[argh(switch)]
    flip_y: bool,

    /// number of threads used by the ONNX runtime
    #[argh(option, default = "DEFAULT_INTRA_THREADS")]
    threads: usize,

    /// name of the model's image input tensor
    #[argh(option, default = "DEFAULT_INPUT_NAME.to_string()")]
    input_name: String,

    /// name of the model's landmark output tensor
    #[argh(option, default = "DEFAULT_LANDMARKS_OUTPUT.to_string()")]
    landmarks_output: String,

    /// name of the model's pose presence output tensor
    #[argh(option, default = "DEFAULT_PRESENCE_OUTPUT.to_string()")]
    presence_output: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let landmarker = BlazePoseLandmarker::new(LandmarkerConfig {
        model_path: args.model,
        input_size: args.input_size,
        input_name: args.input_name,
        landmarks_output: args.landmarks_output,
        presence_output: args.presence_output,
        min_detection_confidence: args.min_detection_confidence,
        min_tracking_confidence: args.min_tracking_confidence,
        running_mode: if args.static_image_mode {
            RunningMode::StaticImage
        } else {
            RunningMode::Tracking
        },
        intra_threads: args.threads,
    })?;

    let detector = Arc::new(PoseDetector::new(
        landmarker,
        CoordinateConvention {
            flip_x: args.flip_x,
            flip_y: args.flip_y,
        },
    ));

    let app = infernum_pose::router(detector);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
