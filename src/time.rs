use std::fmt;

/// センサーレポートのタイムスタンプ（秒）
///
/// Clocks of the video and IMU sources are independent; only differences
/// between timestamps of the same stream are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    /// Signed elapsed seconds since `earlier`. Negative if the clock went backwards.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_since_signed() {
        let a = Timestamp::from_secs_f64(2.0);
        let b = Timestamp::from_secs_f64(2.5);
        assert!((b.seconds_since(a) - 0.5).abs() < 1e-12);
        assert!((a.seconds_since(b) + 0.5).abs() < 1e-12);
        assert_eq!(a.seconds_since(a), 0.0);
    }
}
