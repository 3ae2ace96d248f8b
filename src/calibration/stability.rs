/// Result of feeding one velocity sample into the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StabilityOutcome {
    /// Both velocities below their cutoffs.
    Steady { count: usize, filled: bool },
    /// At least one cutoff exceeded; the window was reset.
    Exceeded {
        previous: usize,
        linear: Option<f64>,
        angular: Option<f64>,
    },
}

/// Counts consecutive low-velocity samples.
#[derive(Debug, Clone)]
pub struct StabilityWindow {
    linear_cutoff: f64,
    angular_cutoff: f64,
    required: usize,
    steady: usize,
}

impl StabilityWindow {
    pub fn new(linear_cutoff: f64, angular_cutoff: f64, required: usize) -> Self {
        Self {
            linear_cutoff,
            angular_cutoff,
            required,
            steady: 0,
        }
    }

    pub fn observe(&mut self, linear: f64, angular: f64) -> StabilityOutcome {
        // NaN は超過扱い
        let linear_ok = linear < self.linear_cutoff;
        let angular_ok = angular < self.angular_cutoff;
        if linear_ok && angular_ok {
            self.steady += 1;
            return StabilityOutcome::Steady {
                count: self.steady,
                filled: self.is_filled(),
            };
        }
        let previous = self.steady;
        self.steady = 0;
        StabilityOutcome::Exceeded {
            previous,
            linear: (!linear_ok).then_some(linear),
            angular: (!angular_ok).then_some(angular),
        }
    }

    pub fn count(&self) -> usize {
        self.steady
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn is_filled(&self) -> bool {
        self.steady >= self.required
    }
}
