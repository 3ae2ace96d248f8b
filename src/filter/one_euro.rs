use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use super::quat::flip_quat_sign_to_match;
use super::PoseFilter;
use crate::config::FilterConfig;

/// Low-pass filter component
struct LowPassFilter {
    prev: Option<Vector3<f64>>,
}

impl LowPassFilter {
    fn new() -> Self {
        Self { prev: None }
    }

    fn filter(&mut self, value: Vector3<f64>, alpha: f64) -> Vector3<f64> {
        let result = match self.prev {
            Some(prev) => value * alpha + prev * (1.0 - alpha),
            None => value,
        };
        self.prev = Some(result);
        result
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f64, cutoff: f64) -> f64 {
    let r = 2.0 * std::f64::consts::PI * cutoff * te;
    // inf/inf を避ける。極端に長いdtは最新値をそのまま採用
    if !r.is_finite() {
        return 1.0;
    }
    r / (r + 1.0)
}

/// One Euro Filter for a 3D vector. Tracks the filtered derivative so the
/// speed estimate is available after each sample.
struct VectorFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    prev_value: Option<Vector3<f64>>,
    value: Vector3<f64>,
    speed: f64,
}

impl VectorFilter {
    fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_filter: LowPassFilter::new(),
            dx_filter: LowPassFilter::new(),
            prev_value: None,
            value: Vector3::zeros(),
            speed: 0.0,
        }
    }

    fn filter(&mut self, value: Vector3<f64>, dt: f64) -> Vector3<f64> {
        let dx = match self.prev_value {
            Some(prev) if dt > 0.0 => (value - prev) / dt,
            _ => Vector3::zeros(),
        };
        self.prev_value = Some(value);

        let edx = self
            .dx_filter
            .filter(dx, smoothing_factor(dt, self.d_cutoff));
        self.speed = edx.norm();
        let cutoff = self.min_cutoff + self.beta * self.speed;
        self.value = self.x_filter.filter(value, smoothing_factor(dt, cutoff));
        self.value
    }
}

/// One Euro Filter for orientation.
///
/// 角速度ベクトル（前サンプルとの差分回転 / dt）を低域通過し、その大きさで
/// NLERP の係数を適応させる。
struct OrientationFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    rate_filter: LowPassFilter,
    prev_raw: Option<UnitQuaternion<f64>>,
    value: Option<UnitQuaternion<f64>>,
    speed: f64,
}

impl OrientationFilter {
    fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            rate_filter: LowPassFilter::new(),
            prev_raw: None,
            value: None,
            speed: 0.0,
        }
    }

    fn filter(&mut self, q: UnitQuaternion<f64>, dt: f64) -> UnitQuaternion<f64> {
        let rate = match self.prev_raw {
            Some(prev) if dt > 0.0 => (prev.inverse() * q).scaled_axis() / dt,
            _ => Vector3::zeros(),
        };
        self.prev_raw = Some(q);

        let filtered_rate = self
            .rate_filter
            .filter(rate, smoothing_factor(dt, self.d_cutoff));
        self.speed = filtered_rate.norm();

        let result = match self.value {
            None => q,
            Some(prev) => {
                let cutoff = self.min_cutoff + self.beta * self.speed;
                let alpha = smoothing_factor(dt, cutoff);
                // shortest path
                let target = flip_quat_sign_to_match(&prev, &q);
                UnitQuaternion::new_normalize(
                    prev.into_inner() * (1.0 - alpha) + target.into_inner() * alpha,
                )
            }
        };
        self.value = Some(result);
        result
    }

    fn current(&self) -> UnitQuaternion<f64> {
        self.value.unwrap_or_else(UnitQuaternion::identity)
    }

}

/// One Euro Filter for a rigid pose (translation + rotation).
///
/// The first sample passes through unchanged and reports zero velocity.
pub struct OneEuroPoseFilter {
    position: VectorFilter,
    rotation: OrientationFilter,
}

impl OneEuroPoseFilter {
    pub fn new(
        pos_min_cutoff: f64,
        pos_beta: f64,
        rot_min_cutoff: f64,
        rot_beta: f64,
        d_cutoff: f64,
    ) -> Self {
        Self {
            position: VectorFilter::new(pos_min_cutoff, pos_beta, d_cutoff),
            rotation: OrientationFilter::new(rot_min_cutoff, rot_beta, d_cutoff),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(
            config.position_min_cutoff,
            config.position_beta,
            config.rotation_min_cutoff,
            config.rotation_beta,
            config.derivative_cutoff,
        )
    }
}

impl Default for OneEuroPoseFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

impl PoseFilter for OneEuroPoseFilter {
    fn filter(&mut self, dt: f64, translation: &Vector3<f64>, orientation: &UnitQuaternion<f64>) {
        self.position.filter(*translation, dt);
        self.rotation.filter(*orientation, dt);
    }

    fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.position.value),
            self.rotation.current(),
        )
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        self.rotation.current()
    }

    fn linear_velocity_magnitude(&self) -> f64 {
        self.position.speed
    }

    fn angular_velocity_magnitude(&self) -> f64 {
        self.rotation.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 1.0 / 30.0;

    #[test]
    fn test_smoothing_factor_bounds() {
        // alpha should be between 0 and 1
        for &cutoff in &[0.1, 1.0, 10.0, 100.0] {
            for &te in &[0.001, 0.01, 0.033, 0.1] {
                let alpha = smoothing_factor(te, cutoff);
                assert!(
                    alpha > 0.0 && alpha < 1.0,
                    "alpha={} for te={}, cutoff={}",
                    alpha,
                    te,
                    cutoff
                );
            }
        }
    }

    #[test]
    fn test_vector_filter_passthrough_first() {
        let mut f = VectorFilter::new(1.0, 0.0, 1.0);
        let result = f.filter(Vector3::new(5.0, -1.0, 2.0), DT);
        assert_eq!(result, Vector3::new(5.0, -1.0, 2.0));
        assert_eq!(f.speed, 0.0);
    }

    #[test]
    fn test_vector_filter_smooths_and_reports_speed() {
        let mut f = VectorFilter::new(1.0, 0.0, 1.0);
        f.filter(Vector3::zeros(), DT);
        let result = f.filter(Vector3::new(10.0, 0.0, 0.0), DT);
        assert!(result.x < 10.0 && result.x > 0.0, "Expected smoothing, got {}", result.x);
        assert!(f.speed > 0.0);
    }

    #[test]
    fn test_vector_filter_zero_dt_keeps_value() {
        let mut f = VectorFilter::new(1.0, 0.0, 1.0);
        f.filter(Vector3::new(1.0, 1.0, 1.0), DT);
        let result = f.filter(Vector3::new(9.0, 9.0, 9.0), 0.0);
        assert_eq!(result, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(f.speed, 0.0);
    }

    #[test]
    fn test_pose_filter_first_frame_passthrough() {
        let mut pf = OneEuroPoseFilter::default();
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let t = Vector3::new(1.0, 2.0, 3.0);
        pf.filter(DT, &t, &q);
        let iso = pf.isometry();
        assert_eq!(iso.translation.vector, t);
        assert_relative_eq!(iso.rotation.angle_to(&q), 0.0, epsilon = 1e-12);
        assert_eq!(pf.linear_velocity_magnitude(), 0.0);
        assert_eq!(pf.angular_velocity_magnitude(), 0.0);
    }

    #[test]
    fn test_pose_filter_stationary_has_no_velocity() {
        let mut pf = OneEuroPoseFilter::default();
        let q = UnitQuaternion::from_euler_angles(0.0, 0.5, 0.0);
        let t = Vector3::new(0.0, 0.0, 0.3);
        for _ in 0..20 {
            pf.filter(DT, &t, &q);
        }
        assert!(pf.linear_velocity_magnitude() < 1e-9);
        assert!(pf.angular_velocity_magnitude() < 1e-6);
    }

    #[test]
    fn test_pose_filter_rotating_reports_angular_velocity() {
        let mut pf = OneEuroPoseFilter::default();
        let t = Vector3::zeros();
        for i in 0..10 {
            let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.05 * i as f64);
            pf.filter(DT, &t, &q);
        }
        assert!(pf.angular_velocity_magnitude() > 0.1);
        assert_eq!(pf.linear_velocity_magnitude(), 0.0);
    }

    #[test]
    fn test_pose_filter_sign_flip_is_not_motion() {
        let mut pf = OneEuroPoseFilter::default();
        let t = Vector3::zeros();
        let q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.4);
        pf.filter(DT, &t, &q);
        pf.filter(DT, &t, &super::super::quat::negate(&q));
        assert!(pf.angular_velocity_magnitude() < 1e-9);
        assert_relative_eq!(pf.orientation().angle_to(&q), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pose_filter_quaternion_normalized() {
        let mut pf = OneEuroPoseFilter::default();
        pf.filter(DT, &Vector3::zeros(), &UnitQuaternion::identity());
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::FRAC_PI_2);
        pf.filter(DT, &Vector3::new(1.0, 1.0, 1.0), &q);
        assert_relative_eq!(pf.orientation().coords.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_smoothing_factor_overflowing_dt() {
        assert_eq!(smoothing_factor(1e308, 1.0), 1.0);
        assert_eq!(smoothing_factor(f64::INFINITY, 1.0), 1.0);
    }

    #[test]
    fn test_pose_filter_survives_huge_dt() {
        let mut pf = OneEuroPoseFilter::default();
        let t = Vector3::new(0.0, 0.0, 0.3);
        let q = UnitQuaternion::from_euler_angles(0.0, 0.5, 0.0);
        pf.filter(DT, &t, &q);
        pf.filter(1e308, &t, &q);
        for _ in 0..20 {
            pf.filter(DT, &t, &q);
        }
        let iso = pf.isometry();
        assert!(iso.translation.vector.iter().all(|v| v.is_finite()));
        assert!(pf.linear_velocity_magnitude().is_finite());
        assert!(pf.angular_velocity_magnitude().is_finite());
        assert!(pf.linear_velocity_magnitude() < 1e-9);
    }
}
