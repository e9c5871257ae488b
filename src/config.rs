use std::path::PathBuf;

// defaults for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

// defaults for the landmark model
pub const DEFAULT_MODEL_PATH: &str = "models/pose_landmark_full.onnx";
pub const DEFAULT_INPUT_SIZE: usize = 256;
pub const DEFAULT_INPUT_NAME: &str = "input_1";
pub const DEFAULT_LANDMARKS_OUTPUT: &str = "Identity";
pub const DEFAULT_PRESENCE_OUTPUT: &str = "Identity_1";
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.8;
pub const DEFAULT_MIN_TRACKING_CONFIDENCE: f32 = 0.8;
pub const DEFAULT_INTRA_THREADS: usize = 4;

/// How the landmarker treats consecutive images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunningMode {
    /// Every image is processed on its own, on the full frame.
    StaticImage,
    /// The region of interest found in one image seeds the next one.
    #[default]
    Tracking,
}

/// Optional axis flips applied after keypoints are scaled to pixels.
///
/// With `flip_y` set the origin moves to the bottom-left corner, which is what
/// texture coordinates in most game engines expect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinateConvention {
    pub flip_x: bool,
    pub flip_y: bool,
}

/// Settings for [`crate::BlazePoseLandmarker`].
#[derive(Clone, Debug)]
pub struct LandmarkerConfig {
    /// Path to the ONNX landmark model.
    pub model_path: PathBuf,
    /// Side of the square model input, in pixels.
    pub input_size: usize,
    pub input_name: String,
    pub landmarks_output: String,
    pub presence_output: String,
    /// Presence score needed to accept a full-frame pass.
    pub min_detection_confidence: f32,
    /// Presence score needed to keep following the tracked region.
    pub min_tracking_confidence: f32,
    pub running_mode: RunningMode,
    pub intra_threads: usize,
}

impl Default for LandmarkerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_INPUT_SIZE,
            input_name: DEFAULT_INPUT_NAME.to_string(),
            landmarks_output: DEFAULT_LANDMARKS_OUTPUT.to_string(),
            presence_output: DEFAULT_PRESENCE_OUTPUT.to_string(),
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_tracking_confidence: DEFAULT_MIN_TRACKING_CONFIDENCE,
            running_mode: RunningMode::default(),
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}
