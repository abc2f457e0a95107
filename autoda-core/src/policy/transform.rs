//! Per-sample image transforms driven by an augmentation policy.
//!
//! Rotation, shift, pad-and-crop and flips are folded into one inverse mapping that is
//! sampled with nearest-neighbour lookup; pixels mapped from outside the image are zero.

use crate::error::{AutodaError, Result};
use crate::policy::AugmentationPolicy;
use rand::Rng;

pub const ROTATION_RANGE: &str = "rotation_range";
pub const WIDTH_SHIFT_RANGE: &str = "width_shift_range";
pub const HEIGHT_SHIFT_RANGE: &str = "height_shift_range";
pub const HORIZONTAL_FLIP: &str = "horizontal_flip";
pub const VERTICAL_FLIP: &str = "vertical_flip";
pub const CROP_PADDING: &str = "crop_padding";
pub const AUGMENT_PROBABILITY: &str = "augment_probability";

/// Concrete transform parameters extracted from a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    /// Maximum absolute rotation, degrees.
    pub rotation_range: f64,
    /// Maximum shift as a fraction of width.
    pub width_shift_range: f64,
    /// Maximum shift as a fraction of height.
    pub height_shift_range: f64,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    /// Zero padding before a random crop back to the original size.
    pub crop_padding: usize,
    /// Chance that a sample is transformed at all.
    pub probability: f64,
}

impl TransformPlan {
    /// Identity plan: every sample passes through untouched.
    pub fn identity() -> Self {
        Self {
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            horizontal_flip: false,
            vertical_flip: false,
            crop_padding: 0,
            probability: 0.0,
        }
    }

    pub fn from_policy(policy: &AugmentationPolicy) -> Result<Self> {
        let float = |name: &str| policy.get(name).map_or(0.0, |v| v.as_f64());
        let flag = |name: &str| policy.get(name).is_some_and(|v| v.as_bool());

        let plan = Self {
            rotation_range: float(ROTATION_RANGE),
            width_shift_range: float(WIDTH_SHIFT_RANGE),
            height_shift_range: float(HEIGHT_SHIFT_RANGE),
            horizontal_flip: flag(HORIZONTAL_FLIP),
            vertical_flip: flag(VERTICAL_FLIP),
            crop_padding: float(CROP_PADDING).max(0.0) as usize,
            probability: policy.get(AUGMENT_PROBABILITY).map_or(1.0, |v| v.as_f64()),
        };
        if !(0.0..=1.0).contains(&plan.probability) {
            return Err(AutodaError::augmentation(format!(
                "augment_probability must be within [0, 1], got {}",
                plan.probability
            )));
        }
        if plan.rotation_range < 0.0 || plan.width_shift_range < 0.0 || plan.height_shift_range < 0.0 {
            return Err(AutodaError::augmentation("transform ranges must be non-negative"));
        }
        Ok(plan)
    }

    pub fn is_identity(&self) -> bool {
        self.probability == 0.0
            || (self.rotation_range == 0.0
                && self.width_shift_range == 0.0
                && self.height_shift_range == 0.0
                && !self.horizontal_flip
                && !self.vertical_flip
                && self.crop_padding == 0)
    }

    /// Transform one `[height, width, channels]` sample in place.
    pub fn apply<R: Rng>(&self, sample: &mut [f32], height: usize, width: usize, channels: usize, rng: &mut R) {
        if self.is_identity() || !rng.gen_bool(self.probability) {
            return;
        }

        let angle = if self.rotation_range > 0.0 {
            rng.gen_range(-self.rotation_range..=self.rotation_range).to_radians()
        } else {
            0.0
        };
        let mut dx = if self.width_shift_range > 0.0 {
            rng.gen_range(-self.width_shift_range..=self.width_shift_range) * width as f64
        } else {
            0.0
        };
        let mut dy = if self.height_shift_range > 0.0 {
            rng.gen_range(-self.height_shift_range..=self.height_shift_range) * height as f64
        } else {
            0.0
        };
        if self.crop_padding > 0 {
            let pad = self.crop_padding as i64;
            dx += rng.gen_range(-pad..=pad) as f64;
            dy += rng.gen_range(-pad..=pad) as f64;
        }
        let flip_h = self.horizontal_flip && rng.gen_bool(0.5);
        let flip_v = self.vertical_flip && rng.gen_bool(0.5);

        let source = sample.to_vec();
        let (cy, cx) = ((height as f64 - 1.0) / 2.0, (width as f64 - 1.0) / 2.0);
        let (sin, cos) = angle.sin_cos();

        for y in 0..height {
            for x in 0..width {
                let ox = if flip_h { width - 1 - x } else { x };
                let oy = if flip_v { height - 1 - y } else { y };
                // Undo shift, then undo rotation about the centre.
                let px = ox as f64 - dx - cx;
                let py = oy as f64 - dy - cy;
                let sx = (cos * px + sin * py + cx).round();
                let sy = (-sin * px + cos * py + cy).round();

                let out = (y * width + x) * channels;
                if sx >= 0.0 && sy >= 0.0 && (sx as usize) < width && (sy as usize) < height {
                    let src = (sy as usize * width + sx as usize) * channels;
                    sample[out..out + channels].copy_from_slice(&source[src..src + channels]);
                } else {
                    sample[out..out + channels].fill(0.0);
                }
            }
        }
    }
}
