use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::detection::domain::motion_model::{
    exceeds_threshold, Detection, DetectionError, MotionModel,
};
use crate::shared::frame::Frame;
use crate::shared::mask::ForegroundMask;

/// Variance a freshly created component starts with.
const INITIAL_VARIANCE: f32 = 225.0;
/// Variance floor; keeps a fully adapted component from collapsing to a
/// zero-width match window.
const MIN_VARIANCE: f32 = 4.0;
const MAX_VARIANCE: f32 = 5.0 * INITIAL_VARIANCE;
/// Squared Mahalanobis distance bound for matching: within 3 sigma.
const MATCH_THRESHOLD: f32 = 9.0;

/// Adaptive per-pixel Gaussian mixture background model.
///
/// Each pixel carries up to `mixtures` weighted Gaussians over its intensity.
/// Every `detect` call matches the pixel against its components, updates
/// weights/means/variances with learning rate `1 / history`, prunes
/// components whose weight decays to nothing, and classifies the pixel as
/// background when its matched component sits inside the weight prefix
/// covering `background_ratio` of the total. The resulting mask is cleaned
/// with a morphological opening before the movement decision.
///
/// The first frame after construction or [`apply_parameters`] seeds the
/// model and reports no foreground; expect a short re-adaptation period
/// after any reset.
pub struct MixtureModel {
    params: DetectionParameters,
    kernel: Vec<(i32, i32)>,
    shape: Option<(u32, u32)>,
    weights: Vec<f32>,
    means: Vec<f32>,
    variances: Vec<f32>,
    modes: Vec<u8>,
}

impl MixtureModel {
    pub fn new(params: DetectionParameters) -> Result<Self, DetectionError> {
        params.validate()?;
        let kernel = elliptical_kernel(params.open_kernel_size);
        Ok(Self {
            params,
            kernel,
            shape: None,
            weights: Vec::new(),
            means: Vec::new(),
            variances: Vec::new(),
            modes: Vec::new(),
        })
    }

    fn reset_state(&mut self, width: u32, height: u32) {
        let pixels = (width as usize) * (height as usize);
        let slots = pixels * self.params.mixtures;
        self.weights = vec![0.0; slots];
        self.means = vec![0.0; slots];
        self.variances = vec![0.0; slots];
        self.modes = vec![0; pixels];
        self.shape = Some((width, height));
        log::debug!("mixture model state reset to {width}x{height}");
    }

    /// Updates one pixel's mixture with observation `value` and returns
    /// whether the pixel is foreground.
    fn update_pixel(&mut self, pixel: usize, value: f32, alpha: f32, prune: f32) -> bool {
        let k_max = self.params.mixtures;
        let base = pixel * k_max;
        let mut n = self.modes[pixel] as usize;

        if n == 0 {
            // first observation seeds the background
            self.weights[base] = 1.0;
            self.means[base] = value;
            self.variances[base] = INITIAL_VARIANCE;
            self.modes[pixel] = 1;
            return false;
        }

        // components are kept sorted by weight, so the first match is the
        // most probable one
        let mut matched = None;
        for k in 0..n {
            let d = value - self.means[base + k];
            if d * d <= MATCH_THRESHOLD * self.variances[base + k] {
                matched = Some(k);
                break;
            }
        }

        // background prefix: components up to cumulative weight
        // background_ratio, judged on the state entering this frame
        let mut bg_count = n;
        let mut cumulative = 0.0;
        for k in 0..n {
            cumulative += self.weights[base + k];
            if cumulative > self.params.background_ratio as f32 {
                bg_count = k + 1;
                break;
            }
        }
        let foreground = match matched {
            Some(k) => k >= bg_count,
            None => true,
        };

        match matched {
            Some(m) => {
                for k in 0..n {
                    let ownership = if k == m { 1.0 } else { 0.0 };
                    self.weights[base + k] +=
                        alpha * (ownership - self.weights[base + k]) - prune;
                }
                let rho = alpha / self.weights[base + m].max(alpha);
                let d = value - self.means[base + m];
                self.means[base + m] += rho * d;
                self.variances[base + m] = (self.variances[base + m]
                    + rho * (d * d - self.variances[base + m]))
                    .clamp(MIN_VARIANCE, MAX_VARIANCE);
            }
            None => {
                for k in 0..n {
                    self.weights[base + k] -= alpha * self.weights[base + k] + prune;
                }
                let slot = if n < k_max {
                    n += 1;
                    n - 1
                } else {
                    // replace the weakest component
                    n - 1
                };
                self.weights[base + slot] = alpha;
                self.means[base + slot] = value;
                self.variances[base + slot] = INITIAL_VARIANCE;
            }
        }

        // drop components whose weight decayed to nothing
        let mut k = 0;
        while k < n {
            if self.weights[base + k] <= 0.0 {
                for j in k..n - 1 {
                    self.weights[base + j] = self.weights[base + j + 1];
                    self.means[base + j] = self.means[base + j + 1];
                    self.variances[base + j] = self.variances[base + j + 1];
                }
                n -= 1;
            } else {
                k += 1;
            }
        }

        // renormalize and restore weight order
        let total: f32 = self.weights[base..base + n].iter().sum();
        if total > 0.0 {
            for k in 0..n {
                self.weights[base + k] /= total;
            }
        }
        for a in 1..n {
            let mut b = a;
            while b > 0 && self.weights[base + b] > self.weights[base + b - 1] {
                self.weights.swap(base + b, base + b - 1);
                self.means.swap(base + b, base + b - 1);
                self.variances.swap(base + b, base + b - 1);
                b -= 1;
            }
        }

        self.modes[pixel] = n as u8;
        foreground
    }
}

impl MotionModel for MixtureModel {
    fn detect(&mut self, frame: &Frame) -> Result<Detection, DetectionError> {
        let width = frame.width();
        let height = frame.height();

        match self.shape {
            None => self.reset_state(width, height),
            Some((w, h)) if (w, h) != (width, height) => {
                return Err(DetectionError::DimensionMismatch {
                    got_width: width,
                    got_height: height,
                    want_width: w,
                    want_height: h,
                });
            }
            Some(_) => {}
        }

        let intensity = frame.to_intensity();
        let alpha = 1.0 / self.params.history as f32;
        let prune = alpha * self.params.complexity_reduction_threshold as f32;

        let mut raw = vec![0u8; intensity.len()];
        for (pixel, (&value, out)) in intensity.iter().zip(raw.iter_mut()).enumerate() {
            if self.update_pixel(pixel, f32::from(value), alpha, prune) {
                *out = 255;
            }
        }

        let opened = morphological_open(&raw, width as usize, height as usize, &self.kernel);
        let mask = ForegroundMask::new(opened, width, height);
        let moving = exceeds_threshold(mask.foreground_ratio(), self.params.movement_threshold);

        Ok(Detection { mask, moving })
    }

    fn apply_parameters(&mut self, params: &DetectionParameters) -> Result<(), DetectionError> {
        params.validate()?;
        self.params = params.clone();
        self.kernel = elliptical_kernel(params.open_kernel_size);
        // full reset of adaptive state; reallocated lazily on the next frame
        self.shape = None;
        self.weights.clear();
        self.means.clear();
        self.variances.clear();
        self.modes.clear();
        Ok(())
    }

    fn parameters(&self) -> DetectionParameters {
        self.params.clone()
    }
}

impl Default for MixtureModel {
    fn default() -> Self {
        Self::new(DetectionParameters::default()).expect("default parameters are valid")
    }
}

/// Offsets of an elliptical structuring element inscribed in `size`×`size`.
fn elliptical_kernel(size: usize) -> Vec<(i32, i32)> {
    let radius = (size as i32 - 1) / 2;
    if radius == 0 {
        return vec![(0, 0)];
    }
    let r = f64::from(radius);
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let norm = (f64::from(dx) / r).powi(2) + (f64::from(dy) / r).powi(2);
            if norm <= 1.0 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Morphological opening (erosion then dilation); suppresses blobs smaller
/// than the structuring element. Out-of-bounds counts as background.
fn morphological_open(mask: &[u8], width: usize, height: usize, kernel: &[(i32, i32)]) -> Vec<u8> {
    let eroded = erode(mask, width, height, kernel);
    dilate(&eroded, width, height, kernel)
}

fn erode(mask: &[u8], width: usize, height: usize, kernel: &[(i32, i32)]) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let all_set = kernel.iter().all(|&(dx, dy)| {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                nx >= 0
                    && ny >= 0
                    && nx < width as i32
                    && ny < height as i32
                    && mask[ny as usize * width + nx as usize] != 0
            });
            if all_set {
                out[y * width + x] = 255;
            }
        }
    }
    out
}

fn dilate(mask: &[u8], width: usize, height: usize, kernel: &[(i32, i32)]) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let any_set = kernel.iter().any(|&(dx, dy)| {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                nx >= 0
                    && ny >= 0
                    && nx < width as i32
                    && ny < height as i32
                    && mask[ny as usize * width + nx as usize] != 0
            });
            if any_set {
                out[y * width + x] = 255;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::interval_tracker::IntervalTracker;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const W: u32 = 64;
    const H: u32 = 48;

    fn uniform_frame(value: u8, index: usize) -> Frame {
        Frame::new(vec![value; (W * H * 3) as usize], W, H, 3, index)
    }

    /// Uniform frame with a bright square of side `side` at (x, y).
    fn square_frame(background: u8, square: u8, x: u32, y: u32, side: u32, index: usize) -> Frame {
        let mut data = vec![background; (W * H * 3) as usize];
        for row in y..y + side {
            for col in x..x + side {
                let offset = ((row * W + col) * 3) as usize;
                data[offset..offset + 3].copy_from_slice(&[square; 3]);
            }
        }
        Frame::new(data, W, H, 3, index)
    }

    fn params(threshold: f64, history: usize) -> DetectionParameters {
        DetectionParameters {
            movement_threshold: threshold,
            history,
            ..DetectionParameters::default()
        }
    }

    #[test]
    fn test_first_frame_seeds_without_movement() {
        let mut model = MixtureModel::default();
        let detection = model.detect(&uniform_frame(100, 0)).unwrap();
        assert!(!detection.moving);
        assert_eq!(detection.mask.foreground_pixels(), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(50)]
    fn test_identical_frames_settle_to_no_movement(#[case] history: usize) {
        let mut model = MixtureModel::new(params(0.001, history)).unwrap();
        let mut last = true;
        for i in 0..20 {
            last = model.detect(&uniform_frame(100, i)).unwrap().moving;
        }
        assert!(!last);
    }

    #[test]
    fn test_sudden_square_is_detected() {
        let mut model = MixtureModel::new(params(0.01, 50)).unwrap();
        for i in 0..30 {
            model.detect(&uniform_frame(100, i)).unwrap();
        }

        let detection = model
            .detect(&square_frame(100, 230, 8, 8, 16, 30))
            .unwrap();
        assert!(detection.moving);

        // the surviving foreground concentrates inside the square
        let boxes = detection.mask.blob_boxes();
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].x >= 7 && boxes[0].y >= 7);
        assert!(boxes[0].width <= 18 && boxes[0].height <= 18);
    }

    #[test]
    fn test_static_anomaly_is_absorbed_into_background() {
        let mut model = MixtureModel::new(params(0.01, 5)).unwrap();
        for i in 0..20 {
            model.detect(&uniform_frame(100, i)).unwrap();
        }

        let first = model.detect(&square_frame(100, 230, 8, 8, 16, 20)).unwrap();
        assert!(first.moving);

        let mut last = true;
        for i in 21..31 {
            last = model
                .detect(&square_frame(100, 230, 8, 8, 16, i))
                .unwrap()
                .moving;
        }
        assert!(!last, "a static object must stop reading as movement");
    }

    #[test]
    fn test_dimension_mismatch_fails_fast() {
        let mut model = MixtureModel::default();
        model.detect(&uniform_frame(100, 0)).unwrap();

        let other = Frame::new(vec![0u8; 32 * 32 * 3], 32, 32, 3, 1);
        assert!(matches!(
            model.detect(&other),
            Err(DetectionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_apply_parameters_resets_adaptation() {
        let mut model = MixtureModel::default();
        for i in 0..10 {
            model.detect(&uniform_frame(100, i)).unwrap();
        }

        let new_params = params(0.05, 10);
        model.apply_parameters(&new_params).unwrap();
        assert_eq!(model.parameters(), new_params);

        // a completely different scene seeds silently after the reset
        let detection = model.detect(&uniform_frame(220, 0)).unwrap();
        assert!(!detection.moving);
        assert_eq!(detection.mask.foreground_pixels(), 0);
    }

    #[test]
    fn test_apply_parameters_rejects_invalid() {
        let mut model = MixtureModel::default();
        let mut bad = DetectionParameters::default();
        bad.mixtures = 0;
        assert!(matches!(
            model.apply_parameters(&bad),
            Err(DetectionError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_opening_removes_single_pixel_noise() {
        let kernel = elliptical_kernel(3);
        let mut mask = vec![0u8; 10 * 10];
        mask[5 * 10 + 5] = 255;
        let opened = morphological_open(&mask, 10, 10, &kernel);
        assert!(opened.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_opening_keeps_large_blob() {
        let kernel = elliptical_kernel(3);
        let mut mask = vec![0u8; 10 * 10];
        for y in 2..7 {
            for x in 2..7 {
                mask[y * 10 + x] = 255;
            }
        }
        let opened = morphological_open(&mask, 10, 10, &kernel);
        assert!(opened.iter().any(|&v| v != 0));
        // blob center survives intact
        assert_eq!(opened[4 * 10 + 4], 255);
    }

    #[test]
    fn test_kernel_size_one_is_identity() {
        let kernel = elliptical_kernel(1);
        let mut mask = vec![0u8; 4 * 4];
        mask[5] = 255;
        assert_eq!(morphological_open(&mask, 4, 4, &kernel), mask);
    }

    /// 100 quiet frames, 20 frames with a bright square jumping between two
    /// positions, 100 quiet frames: exactly one interval bracketing the
    /// anomaly.
    #[test]
    fn test_anomaly_yields_single_interval() {
        let fps = 30.0;
        let mut model = MixtureModel::new(params(0.01, 50)).unwrap();
        let mut tracker = IntervalTracker::new();

        let feed = |model: &mut MixtureModel, tracker: &mut IntervalTracker, frame: Frame| {
            let time = (frame.index() + 1) as f64 / fps;
            let detection = model.detect(&frame).unwrap();
            tracker.update(detection.moving, time);
        };

        for i in 0..100 {
            feed(&mut model, &mut tracker, uniform_frame(100, i));
        }
        for i in 100..120 {
            // alternate between two disjoint positions so the square keeps
            // reading as movement instead of adapting into the background
            let x = if i % 2 == 0 { 8 } else { 32 };
            feed(
                &mut model,
                &mut tracker,
                square_frame(100, 230, x, 8, 16, i),
            );
        }
        for i in 120..220 {
            feed(&mut model, &mut tracker, uniform_frame(100, i));
        }

        let events = tracker.events();
        assert_eq!(events.len(), 1, "expected one interval, got {events:?}");
        assert_relative_eq!(events[0].start_secs, 101.0 / fps, epsilon = 1e-9);
        assert!(events[0].end_secs > 115.0 / fps);
        assert!(events[0].end_secs <= 122.0 / fps);
    }
}
