//! Pose keypoint detection served over HTTP.
//!
//! An uploaded image is decoded into an RGB buffer, handed to a pose model running
//! on a dedicated [`InferenceEngine`] thread, and the normalized landmarks that come
//! back are scaled into pixel-space [`Keypoint`]s.

pub mod blazepose;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod model;
pub mod server;

pub use blazepose::BlazePoseLandmarker;
pub use config::{CoordinateConvention, LandmarkerConfig, RunningMode};
pub use detect::{DetectError, Keypoint, PoseDetector, scale_landmarks};
pub use engine::{EngineResponse, EngineState, InferenceEngine};
pub use error::{EngineError, PoseError};
pub use ingest::{ChannelOrder, RgbImage, SquareRoi};
pub use model::{
    InferenceModel, NormalizedLandmark, PoseLandmarks, PoseModel, PoseRequest, RequestMetadata,
};
pub use server::{ApiError, DetectResponse, StatusResponse, router};
