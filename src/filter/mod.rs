pub mod one_euro;
pub mod quat;

use nalgebra::{Isometry3, UnitQuaternion, Vector3};

pub use one_euro::OneEuroPoseFilter;

/// Smoothing filter over a stream of timestamped rigid poses.
///
/// The calibration controller owns two independent instances: one over the
/// raw camera-reported target pose, one over the derived camera-in-room
/// candidate.
pub trait PoseFilter {
    /// Ingest one sample. `dt` is in seconds and always positive when called
    /// by the calibration controller.
    fn filter(&mut self, dt: f64, translation: &Vector3<f64>, orientation: &UnitQuaternion<f64>);

    fn isometry(&self) -> Isometry3<f64>;

    fn orientation(&self) -> UnitQuaternion<f64>;

    fn linear_velocity_magnitude(&self) -> f64;

    fn angular_velocity_magnitude(&self) -> f64;
}
