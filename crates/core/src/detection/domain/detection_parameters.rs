use crate::detection::domain::motion_model::DetectionError;

/// Tuning record for the motion model.
///
/// Owned by the caller; a model holds its own copy and must be told
/// explicitly via `apply_parameters` when values change — there is no
/// implicit reactivity between this struct and a live model.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionParameters {
    /// Foreground-pixel ratio above which a frame counts as movement.
    /// Strictly greater-than; a ratio equal to the threshold is "no
    /// movement". Range `(0, 1]`.
    pub movement_threshold: f64,
    /// Side length of the elliptical opening kernel that suppresses
    /// sub-kernel noise blobs. At least 1.
    pub open_kernel_size: usize,
    /// Number of past frames the background statistics span. At least 1.
    pub history: usize,
    /// Components per pixel in the background mixture. Range `[1, 10]`.
    pub mixtures: usize,
    /// Cumulative weight a component prefix needs to count as background.
    /// Range `(0, 1]`.
    pub background_ratio: f64,
    /// Scales the pruning of low-weight components. Range `(0, 1]`.
    pub complexity_reduction_threshold: f64,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            movement_threshold: 0.001,
            open_kernel_size: 3,
            history: 100,
            mixtures: 5,
            background_ratio: 0.8,
            complexity_reduction_threshold: 0.05,
        }
    }
}

impl DetectionParameters {
    pub fn validate(&self) -> Result<(), DetectionError> {
        fn fail(msg: String) -> Result<(), DetectionError> {
            Err(DetectionError::InvalidParameters(msg))
        }

        if !(self.movement_threshold > 0.0 && self.movement_threshold <= 1.0) {
            return fail(format!(
                "movement_threshold must be in (0, 1], got {}",
                self.movement_threshold
            ));
        }
        if self.open_kernel_size == 0 {
            return fail("open_kernel_size must be at least 1".into());
        }
        if self.history == 0 {
            return fail("history must be at least 1".into());
        }
        if !(1..=10).contains(&self.mixtures) {
            return fail(format!("mixtures must be in [1, 10], got {}", self.mixtures));
        }
        if !(self.background_ratio > 0.0 && self.background_ratio <= 1.0) {
            return fail(format!(
                "background_ratio must be in (0, 1], got {}",
                self.background_ratio
            ));
        }
        if !(self.complexity_reduction_threshold > 0.0
            && self.complexity_reduction_threshold <= 1.0)
        {
            return fail(format!(
                "complexity_reduction_threshold must be in (0, 1], got {}",
                self.complexity_reduction_threshold
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        assert!(DetectionParameters::default().validate().is_ok());
    }

    #[rstest]
    #[case::zero_threshold(|p: &mut DetectionParameters| p.movement_threshold = 0.0)]
    #[case::threshold_above_one(|p: &mut DetectionParameters| p.movement_threshold = 1.5)]
    #[case::zero_kernel(|p: &mut DetectionParameters| p.open_kernel_size = 0)]
    #[case::zero_history(|p: &mut DetectionParameters| p.history = 0)]
    #[case::zero_mixtures(|p: &mut DetectionParameters| p.mixtures = 0)]
    #[case::too_many_mixtures(|p: &mut DetectionParameters| p.mixtures = 11)]
    #[case::zero_background_ratio(|p: &mut DetectionParameters| p.background_ratio = 0.0)]
    #[case::zero_crt(|p: &mut DetectionParameters| p.complexity_reduction_threshold = 0.0)]
    fn test_out_of_range_rejected(#[case] mutate: fn(&mut DetectionParameters)) {
        let mut params = DetectionParameters::default();
        mutate(&mut params);
        assert!(matches!(
            params.validate(),
            Err(DetectionError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_boundary_values_accepted() {
        let params = DetectionParameters {
            movement_threshold: 1.0,
            open_kernel_size: 1,
            history: 1,
            mixtures: 10,
            background_ratio: 1.0,
            complexity_reduction_threshold: 1.0,
        };
        assert!(params.validate().is_ok());
    }
}
