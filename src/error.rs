use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("invalid pixel buffer: {0}")]
    Buffer(#[from] kornia_image::ImageError),

    #[error("onnx runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("model has no tensor named `{0}`")]
    MissingTensor(String),

    #[error("tensor `{name}` has {actual} values, expected at least {expected}")]
    UnexpectedOutput {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors surfaced by [`crate::InferenceEngine`].
#[derive(Debug, Error)]
pub enum EngineError<E: std::error::Error + 'static> {
    #[error("inference engine is not running")]
    Stopped,

    #[error(transparent)]
    Model(E),

    #[error("model panicked: {0}")]
    Panicked(String),
}
