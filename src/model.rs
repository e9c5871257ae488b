use kornia_image::ImageSize;

use crate::ingest::{ChannelOrder, RgbImage};

/// Trait for implementing inference models that can be used with the [`crate::InferenceEngine`].
///
/// Implementors define the request and response types and the inference logic.
/// The engine moves the model onto its own thread, so `run` never races with itself.
pub trait InferenceModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// The engine keeps this next to the response so callers can use it without
/// cloning heavy data like images.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    fn metadata(&self) -> Self::Metadata;
}

/// A single image handed to a pose model.
pub struct PoseRequest {
    /// Pixels, already in the order reported by [`PoseModel::channel_order`].
    pub image: RgbImage,
    pub channel_order: ChannelOrder,
}

impl RequestMetadata for PoseRequest {
    type Metadata = ImageSize;

    fn metadata(&self) -> Self::Metadata {
        self.image.size()
    }
}

/// One body landmark in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NormalizedLandmark {
    /// Horizontal position, `0.0` is the left edge and `1.0` the right edge.
    pub x: f32,
    /// Vertical position, `0.0` is the top edge and `1.0` the bottom edge.
    pub y: f32,
    /// Depth relative to the hips, in roughly the same scale as `x`.
    pub z: f32,
    pub visibility: f32,
}

/// Landmarks of the detected pose, empty when nobody was found.
pub type PoseLandmarks = Vec<NormalizedLandmark>;

/// A model that turns one image into a set of pose landmarks.
pub trait PoseModel:
    InferenceModel<Request = PoseRequest, Response = PoseLandmarks> + Send + 'static
{
    /// Channel order the model expects its pixels in.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }
}
