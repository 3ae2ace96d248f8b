use log::{debug, info, warn};
use nalgebra::{Isometry3, UnitQuaternion};

use crate::body::{BodyId, BodyTargetId};

/// Why an IMU report was dropped before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuRejection {
    NonFinite,
    InvalidBody,
    NoTargets,
}

/// Operator-facing notices emitted by the calibration controller.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    FirstImuReport { body: BodyId },
    ImuRejected { body: BodyId, reason: ImuRejection },
    FirstVideoReport { target: BodyTargetId },
    /// Stability window started (0 -> 1 steady samples).
    HoldStill,
    /// One steady sample accepted.
    Progress { steady: usize, required: usize },
    /// Stability window filled; finalize may now run.
    WindowFilled,
    /// Window reset because the motion exceeded a cutoff. Each field is
    /// `Some(velocity)` when that cutoff was exceeded.
    Restarting {
        linear: Option<f64>,
        angular: Option<f64>,
    },
    /// Too far from the camera: move closer, then rotate.
    MoveCloser { cutoff: f64 },
    /// Distance now acceptable: rotate until "hold still".
    DistanceGood,
    Complete {
        calibration_point: Isometry3<f64>,
        camera_pose: Isometry3<f64>,
        imu_yaw: f64,
    },
}

/// Receiver for calibration events.
pub trait EventSink {
    fn emit(&mut self, event: CalibrationEvent);
}

impl EventSink for Vec<CalibrationEvent> {
    fn emit(&mut self, event: CalibrationEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: CalibrationEvent) {
        (**self).emit(event);
    }
}

const PREFIX: &str = "[Room Calibration]";

/// Renders events as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

fn describe_rotation(q: &UnitQuaternion<f64>) -> String {
    match q.axis_angle() {
        Some((axis, angle)) => format!(
            "{:.4} radians about [{:.4}, {:.4}, {:.4}]",
            angle, axis.x, axis.y, axis.z
        ),
        None => "identity".to_string(),
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: CalibrationEvent) {
        match event {
            CalibrationEvent::FirstImuReport { body } => {
                info!("{} Got first IMU report from body {}", PREFIX, body);
            }
            CalibrationEvent::ImuRejected { body, reason } => match reason {
                ImuRejection::NonFinite => info!("{} Non-finite quat (body {})", PREFIX, body),
                ImuRejection::InvalidBody => info!("{} Invalid body ID {}", PREFIX, body),
                ImuRejection::NoTargets => {
                    debug!("{} Body {} has no video targets, ignoring its IMU", PREFIX, body)
                }
            },
            CalibrationEvent::FirstVideoReport { target } => {
                info!("{} Got first video report from target {}", PREFIX, target);
            }
            CalibrationEvent::HoldStill => {
                info!("{} Hold still, performing room calibration", PREFIX);
            }
            CalibrationEvent::Progress { steady, required } => {
                debug!("{} {}/{}", PREFIX, steady, required);
            }
            CalibrationEvent::WindowFilled => {
                info!("{} Held still long enough", PREFIX);
            }
            CalibrationEvent::Restarting { linear, angular } => {
                let mut reasons = String::new();
                if let Some(v) = linear {
                    reasons.push_str(&format!(" - Linear velocity too high ({})", v));
                }
                if let Some(v) = angular {
                    reasons.push_str(&format!(" - Angular velocity too high ({})", v));
                }
                info!("{} Restarting{}", PREFIX, reasons);
            }
            CalibrationEvent::MoveCloser { cutoff } => {
                warn!(
                    "{} NOTE: For best results, during tracker/server startup, hold your head/HMD \
                     still closer than {} meters from the tracking camera for a few seconds, \
                     then rotate slowly in all directions.",
                    PREFIX, cutoff
                );
            }
            CalibrationEvent::DistanceGood => {
                warn!(
                    "{} That distance looks good, rotate the device gently until you get a \
                     'Hold still' message.",
                    PREFIX
                );
            }
            CalibrationEvent::Complete {
                calibration_point,
                camera_pose,
                imu_yaw,
            } => {
                info!("{} Room calibration process complete.", PREFIX);
                let t = calibration_point.translation.vector;
                info!(
                    "{} Camera to calibration point: [{:.4}, {:.4}, {:.4}] rotation: {}",
                    PREFIX,
                    t.x,
                    t.y,
                    t.z,
                    describe_rotation(&calibration_point.rotation)
                );
                let t = camera_pose.translation.vector;
                info!(
                    "{} camera pose AKA rTc: translation: [{:.4}, {:.4}, {:.4}] rotation: {}",
                    PREFIX,
                    t.x,
                    t.y,
                    t.z,
                    describe_rotation(&camera_pose.rotation)
                );
                info!("{} IMU yaw: {:.3} degrees", PREFIX, imu_yaw.to_degrees());
            }
        }
    }
}
