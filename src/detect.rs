use kornia_image::ImageSize;
use serde::{Deserialize, Serialize};

use crate::{
    config::CoordinateConvention,
    engine::{EngineState, InferenceEngine},
    error::{EngineError, PoseError},
    ingest::{self, ChannelOrder, RgbImage},
    model::{NormalizedLandmark, PoseModel, PoseRequest},
};

/// A body landmark in pixel space, serialized as `[x, y, z]`.
///
/// `z` is left in the model's own depth units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint(pub f32, pub f32, pub f32);

#[derive(Debug, thiserror::Error)]
pub enum DetectError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Image(#[from] PoseError),

    #[error(transparent)]
    Engine(#[from] EngineError<E>),
}

/// Process-wide pose detector shared by every request.
pub struct PoseDetector<M: PoseModel> {
    engine: InferenceEngine<M>,
    channel_order: ChannelOrder,
    convention: CoordinateConvention,
}

impl<M: PoseModel> PoseDetector<M> {
    pub fn new(model: M, convention: CoordinateConvention) -> Self {
        let channel_order = model.channel_order();
        Self {
            engine: InferenceEngine::new(model),
            channel_order,
            convention,
        }
    }

    /// Detects the pose in `image` and returns its keypoints in pixels.
    ///
    /// An image without a person yields an empty list.
    pub async fn detect(&self, image: RgbImage) -> Result<Vec<Keypoint>, DetectError<M::Error>> {
        let request = self.request(image)?;
        let reply = self.engine.infer(request).await?;
        Ok(self.finish(reply.request_metadata, &reply.response))
    }

    /// Blocking flavour of [`Self::detect`].
    pub fn detect_blocking(
        &self,
        image: RgbImage,
    ) -> Result<Vec<Keypoint>, DetectError<M::Error>> {
        let request = self.request(image)?;
        let reply = self.engine.infer_blocking(request)?;
        Ok(self.finish(reply.request_metadata, &reply.response))
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn requests(&self) -> u64 {
        self.engine.requests()
    }

    fn request(&self, image: RgbImage) -> Result<PoseRequest, PoseError> {
        Ok(PoseRequest {
            image: ingest::to_channel_order(image, self.channel_order)?,
            channel_order: self.channel_order,
        })
    }

    fn finish(&self, size: ImageSize, landmarks: &[NormalizedLandmark]) -> Vec<Keypoint> {
        let keypoints = scale_landmarks(landmarks, size, self.convention);
        if !keypoints.is_empty() {
            log::info!("Keypoints detected: {}", keypoints.len());
        }
        keypoints
    }
}

/// Scales normalized landmarks to pixel coordinates of an image of `size`.
pub fn scale_landmarks(
    landmarks: &[NormalizedLandmark],
    size: ImageSize,
    convention: CoordinateConvention,
) -> Vec<Keypoint> {
    let (width, height) = (size.width as f32, size.height as f32);
    landmarks
        .iter()
        .map(|lm| {
            let mut x = lm.x * width;
            let mut y = lm.y * height;
            if convention.flip_x {
                x = width - x;
            }
            if convention.flip_y {
                y = height - y;
            }
            Keypoint(x, y, lm.z)
        })
        .collect()
}
