//! BlazePose-style landmark model running on ONNX Runtime.
//!
//! The model takes a square NHWC crop with values in `[0, 1]` and returns
//! 39 landmarks of five values each (`x`, `y`, `z`, visibility, presence),
//! expressed in input pixels, plus a single pose presence score. Only the
//! first 33 landmarks describe the body; the rest are auxiliary points.

use kornia_image::ImageSize;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};

use crate::{
    config::{LandmarkerConfig, RunningMode},
    error::PoseError,
    ingest::{self, ChannelOrder, RgbImage, SquareRoi},
    model::{InferenceModel, NormalizedLandmark, PoseLandmarks, PoseModel, PoseRequest},
};

pub const BODY_LANDMARKS: usize = 33;
const VALUES_PER_LANDMARK: usize = 5;

/// Output of a single pass of the landmark model.
struct Estimate {
    presence: f32,
    landmarks: PoseLandmarks,
}

/// Picks the region each pass runs on and remembers the last accepted pose.
///
/// The pose is kept in normalized coordinates, so the tracked region is rebuilt
/// against the size of whichever image comes next.
struct Tracker {
    running_mode: RunningMode,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    previous: Option<PoseLandmarks>,
}

impl Tracker {
    fn new(config: &LandmarkerConfig) -> Self {
        Self {
            running_mode: config.running_mode,
            min_detection_confidence: config.min_detection_confidence,
            min_tracking_confidence: config.min_tracking_confidence,
            previous: None,
        }
    }

    fn step<F>(&mut self, size: ImageSize, mut run_pass: F) -> Result<PoseLandmarks, PoseError>
    where
        F: FnMut(&SquareRoi) -> Result<Estimate, PoseError>,
    {
        let tracking = self.running_mode == RunningMode::Tracking;
        let tracked_roi = self
            .previous
            .take()
            .filter(|_| tracking)
            .and_then(|landmarks| SquareRoi::around(&landmarks, size));

        if let Some(roi) = tracked_roi {
            let estimate = run_pass(&roi)?;
            if estimate.presence >= self.min_tracking_confidence {
                self.previous = Some(estimate.landmarks.clone());
                return Ok(estimate.landmarks);
            }
            log::warn!(
                "Lost track of the pose (presence {:.2}), searching the full frame",
                estimate.presence
            );
        }

        let estimate = run_pass(&SquareRoi::full_frame(size))?;
        if estimate.presence < self.min_detection_confidence {
            log::debug!("No pose found (presence {:.2})", estimate.presence);
            return Ok(PoseLandmarks::new());
        }

        if tracking {
            self.previous = Some(estimate.landmarks.clone());
        }
        Ok(estimate.landmarks)
    }
}

pub struct BlazePoseLandmarker {
    session: Session,
    config: LandmarkerConfig,
    tracker: Tracker,
}

impl BlazePoseLandmarker {
    /// Loads the model and checks that the configured tensors exist.
    pub fn new(config: LandmarkerConfig) -> Result<Self, PoseError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(&config.model_path)?;

        if !session.inputs.iter().any(|i| i.name == config.input_name) {
            return Err(PoseError::MissingTensor(config.input_name));
        }
        for name in [&config.landmarks_output, &config.presence_output] {
            if !session.outputs.iter().any(|o| &o.name == name) {
                return Err(PoseError::MissingTensor(name.clone()));
            }
        }

        log::info!(
            "Loaded pose model {} ({:?} mode)",
            config.model_path.display(),
            config.running_mode
        );

        Ok(Self {
            session,
            tracker: Tracker::new(&config),
            config,
        })
    }
}

fn estimate(
    session: &mut Session,
    config: &LandmarkerConfig,
    image: &RgbImage,
    roi: &SquareRoi,
) -> Result<Estimate, PoseError> {
    let size = config.input_size;
    let input = Tensor::from_array(ingest::roi_to_tensor(image, roi, size))?;

    let outputs = session.run(ort::inputs![config.input_name.as_str() => input])?;

    let raw: Vec<f32> = outputs[config.landmarks_output.as_str()]
        .try_extract_array::<f32>()?
        .iter()
        .copied()
        .collect();
    let presence = outputs[config.presence_output.as_str()]
        .try_extract_array::<f32>()?
        .iter()
        .next()
        .copied()
        .ok_or_else(|| PoseError::UnexpectedOutput {
            name: config.presence_output.clone(),
            expected: 1,
            actual: 0,
        })?;

    if raw.len() < BODY_LANDMARKS * VALUES_PER_LANDMARK {
        return Err(PoseError::UnexpectedOutput {
            name: config.landmarks_output.clone(),
            expected: BODY_LANDMARKS * VALUES_PER_LANDMARK,
            actual: raw.len(),
        });
    }

    Ok(Estimate {
        presence,
        landmarks: project_landmarks(&raw, roi, size, image.size()),
    })
}

impl InferenceModel for BlazePoseLandmarker {
    type Request = PoseRequest;
    type Response = PoseLandmarks;
    type Error = PoseError;

    fn run(&mut self, request: PoseRequest) -> Result<PoseLandmarks, PoseError> {
        let image = request.image;
        let Self {
            session,
            config,
            tracker,
        } = self;

        tracker.step(image.size(), |roi| estimate(session, config, &image, roi))
    }
}

impl PoseModel for BlazePoseLandmarker {
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }
}

/// Maps raw model landmarks from input pixels back to normalized image coordinates.
pub fn project_landmarks(
    raw: &[f32],
    roi: &SquareRoi,
    input_size: usize,
    image_size: ImageSize,
) -> PoseLandmarks {
    let input_size = input_size as f32;
    let (width, height) = (image_size.width as f32, image_size.height as f32);
    let scale = roi.side / input_size;

    raw.chunks_exact(VALUES_PER_LANDMARK)
        .take(BODY_LANDMARKS)
        .map(|lm| NormalizedLandmark {
            x: (roi.left() + lm[0] * scale) / width,
            y: (roi.top() + lm[1] * scale) / height,
            z: lm[2] * scale / width,
            visibility: sigmoid(lm[3]),
        })
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_landmarks(points: &[[f32; 5]]) -> Vec<f32> {
        let mut raw: Vec<f32> = points.iter().flatten().copied().collect();
        raw.resize(39 * VALUES_PER_LANDMARK, 0.0);
        raw
    }

    #[test]
    fn projects_through_letterboxed_full_frame() {
        let size = ImageSize {
            width: 640,
            height: 480,
        };
        let roi = SquareRoi::full_frame(size);
        // center of the input and its bottom-right corner
        let raw = raw_landmarks(&[[128.0, 128.0, 25.6, 0.0, 0.0], [256.0, 208.0, 0.0, 0.0, 0.0]]);

        let landmarks = project_landmarks(&raw, &roi, 256, size);
        assert_eq!(landmarks.len(), BODY_LANDMARKS);

        assert_eq!((landmarks[0].x, landmarks[0].y), (0.5, 0.5));
        assert!((landmarks[0].z - 0.1).abs() < 1e-6);
        assert_eq!(landmarks[0].visibility, 0.5);

        assert_eq!(landmarks[1].x, 1.0);
        // 208 input pixels cover 520 image rows, minus 80 rows of padding
        assert_eq!(landmarks[1].y, 440.0 / 480.0);
    }

    #[test]
    fn projects_through_tracked_roi() {
        let size = ImageSize {
            width: 100,
            height: 100,
        };
        let roi = SquareRoi {
            center_x: 30.0,
            center_y: 70.0,
            side: 20.0,
        };
        let raw = raw_landmarks(&[[0.0, 256.0, 0.0, 10.0, 0.0]]);

        let lm = project_landmarks(&raw, &roi, 256, size)[0];
        assert_eq!((lm.x, lm.y), (0.2, 0.8));
        assert!(lm.visibility > 0.99);
    }

    #[test]
    fn auxiliary_landmarks_are_dropped() {
        let size = ImageSize {
            width: 10,
            height: 10,
        };
        let raw = raw_landmarks(&[]);
        let landmarks = project_landmarks(&raw, &SquareRoi::full_frame(size), 256, size);
        assert_eq!(landmarks.len(), BODY_LANDMARKS);
    }

    const FRAME: ImageSize = ImageSize {
        width: 640,
        height: 480,
    };

    fn tracker(running_mode: RunningMode) -> Tracker {
        Tracker::new(&LandmarkerConfig {
            running_mode,
            ..Default::default()
        })
    }

    fn pose() -> PoseLandmarks {
        [(0.25, 0.25), (0.75, 0.5)]
            .into_iter()
            .map(|(x, y)| NormalizedLandmark {
                x,
                y,
                ..Default::default()
            })
            .collect()
    }

    /// Runs one step, answering each pass with the next presence score.
    fn step(
        tracker: &mut Tracker,
        size: ImageSize,
        presences: &[f32],
    ) -> (PoseLandmarks, Vec<SquareRoi>) {
        let mut scores = presences.iter().copied();
        let mut rois = Vec::new();
        let landmarks = tracker
            .step(size, |roi| {
                rois.push(*roi);
                Ok(Estimate {
                    presence: scores.next().unwrap(),
                    landmarks: pose(),
                })
            })
            .unwrap();
        (landmarks, rois)
    }

    #[test]
    fn confident_pose_is_tracked_into_the_next_frame() {
        let mut tracker = tracker(RunningMode::Tracking);

        let (first, rois) = step(&mut tracker, FRAME, &[0.9]);
        assert_eq!(first, pose());
        assert_eq!(rois, vec![SquareRoi::full_frame(FRAME)]);

        let (second, rois) = step(&mut tracker, FRAME, &[0.85]);
        assert_eq!(second, pose());
        assert_eq!(rois, vec![SquareRoi::around(&pose(), FRAME).unwrap()]);
    }

    #[test]
    fn lost_track_retries_the_full_frame() {
        let mut tracker = tracker(RunningMode::Tracking);
        step(&mut tracker, FRAME, &[0.9]);

        let (landmarks, rois) = step(&mut tracker, FRAME, &[0.5, 0.9]);
        assert_eq!(landmarks, pose());
        assert_eq!(rois.len(), 2);
        assert_eq!(rois[1], SquareRoi::full_frame(FRAME));
    }

    #[test]
    fn weak_full_frame_pass_is_empty_and_forgets_the_track() {
        let mut tracker = tracker(RunningMode::Tracking);
        step(&mut tracker, FRAME, &[0.9]);

        let (landmarks, _) = step(&mut tracker, FRAME, &[0.5, 0.3]);
        assert!(landmarks.is_empty());

        let (_, rois) = step(&mut tracker, FRAME, &[0.9]);
        assert_eq!(rois, vec![SquareRoi::full_frame(FRAME)]);
    }

    #[test]
    fn static_mode_always_uses_the_full_frame() {
        let mut tracker = tracker(RunningMode::StaticImage);
        step(&mut tracker, FRAME, &[0.9]);

        let (landmarks, rois) = step(&mut tracker, FRAME, &[0.9]);
        assert_eq!(landmarks, pose());
        assert_eq!(rois, vec![SquareRoi::full_frame(FRAME)]);
    }

    #[test]
    fn tracked_region_follows_the_new_image_size() {
        let mut tracker = tracker(RunningMode::Tracking);
        let large = ImageSize {
            width: 1920,
            height: 1080,
        };
        step(&mut tracker, large, &[0.9]);

        let (_, rois) = step(&mut tracker, FRAME, &[0.9]);
        assert_eq!(rois.len(), 1);
        assert_eq!(rois[0].center_x, 320.0);
        assert_eq!(rois[0].side, 400.0);
    }
}
