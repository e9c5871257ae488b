use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use ndarray::Array4;

use crate::{error::PoseError, model::NormalizedLandmark};

/// Interleaved 8-bit image with three channels.
pub type RgbImage = Image<u8, 3, CpuAllocator>;

/// Order of the three color channels in a pixel buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Decodes an encoded image of any supported format into an RGB buffer.
///
/// Grayscale and alpha images are converted to three channels.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PoseError> {
    let rgb = image::load_from_memory(bytes)?.into_rgb8();
    let size = ImageSize {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
    };
    log::debug!("Image received: ({}, {}, 3)", size.height, size.width);

    Ok(Image::new(size, rgb.into_raw(), CpuAllocator)?)
}

/// Converts a decoded RGB buffer into the channel order a model expects.
pub fn to_channel_order(image: RgbImage, order: ChannelOrder) -> Result<RgbImage, PoseError> {
    match order {
        ChannelOrder::Rgb => Ok(image),
        ChannelOrder::Bgr => {
            let mut data = image.as_slice().to_vec();
            data.chunks_exact_mut(3).for_each(|px| px.swap(0, 2));
            Ok(Image::new(image.size(), data, CpuAllocator)?)
        }
    }
}

/// Square region of an image, in pixels. It may extend past the image borders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareRoi {
    pub center_x: f32,
    pub center_y: f32,
    pub side: f32,
}

impl SquareRoi {
    /// Scale applied to the landmark bounding box when following a pose.
    pub const TRACKING_SCALE: f32 = 1.25;

    /// The whole image, letterboxed into a square.
    pub fn full_frame(size: ImageSize) -> Self {
        Self {
            center_x: size.width as f32 / 2.0,
            center_y: size.height as f32 / 2.0,
            side: size.width.max(size.height) as f32,
        }
    }

    /// Region around the given landmarks, used to seed the next frame.
    ///
    /// Returns `None` when there are no landmarks.
    pub fn around(landmarks: &[NormalizedLandmark], size: ImageSize) -> Option<Self> {
        let first = landmarks.first()?;
        let (w, h) = (size.width as f32, size.height as f32);

        let (mut min_x, mut max_x) = (first.x * w, first.x * w);
        let (mut min_y, mut max_y) = (first.y * h, first.y * h);
        for lm in &landmarks[1..] {
            min_x = min_x.min(lm.x * w);
            max_x = max_x.max(lm.x * w);
            min_y = min_y.min(lm.y * h);
            max_y = max_y.max(lm.y * h);
        }

        let side = (max_x - min_x).max(max_y - min_y) * Self::TRACKING_SCALE;
        Some(Self {
            center_x: (min_x + max_x) / 2.0,
            center_y: (min_y + max_y) / 2.0,
            side: side.max(1.0),
        })
    }

    pub fn left(&self) -> f32 {
        self.center_x - self.side / 2.0
    }

    pub fn top(&self) -> f32 {
        self.center_y - self.side / 2.0
    }
}

/// Samples `roi` into a `[1, size, size, 3]` tensor with values in `[0, 1]`.
///
/// Nearest-neighbour sampling; pixels outside the image stay zero.
pub fn roi_to_tensor(image: &RgbImage, roi: &SquareRoi, size: usize) -> Array4<f32> {
    let (width, height) = (image.width(), image.height());
    let data = image.as_slice();
    let step = roi.side / size as f32;

    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for v in 0..size {
        let sy = roi.top() + (v as f32 + 0.5) * step;
        if sy < 0.0 || sy >= height as f32 {
            continue;
        }
        let y = sy as usize;
        for u in 0..size {
            let sx = roi.left() + (u as f32 + 0.5) * step;
            if sx < 0.0 || sx >= width as f32 {
                continue;
            }
            let offset = (y * width + sx as usize) * 3;
            for c in 0..3 {
                tensor[[0, v, u, c]] = data[offset + c] as f32 / 255.0;
            }
        }
    }
    tensor
}
