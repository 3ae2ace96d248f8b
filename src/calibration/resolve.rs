//! Conversion of the filtered camera-to-IMU transform into room space.
//!
//! Coordinate systems: i = IMU, c = camera, r = room. Right-to-left
//! convention: `iTc` takes points from camera space to IMU space, so
//! `rTi * iTc = rTc`. The IMU frame is taken as room-aligned modulo yaw.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::Serialize;

use crate::body::BodyId;
use crate::filter::quat::{extract_yaw, yaw_rotation};

/// Frozen output of a completed room calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomAlignment {
    /// rTc
    pub camera_pose: Isometry3<f64>,
    /// rTi (pure rotation)
    pub imu_to_room: Isometry3<f64>,
    /// Yaw offset of the bound IMU, radians.
    pub imu_yaw: f64,
}

/// Resolve the room-space camera pose from `iTc`.
///
/// The translation of `iTc` is discarded: it depends on where the device
/// was held during calibration, not on the camera mount. The camera
/// position comes from configuration instead.
pub fn resolve_room_alignment(
    i_t_c: &Isometry3<f64>,
    camera_position: &Vector3<f64>,
    camera_is_forward: bool,
) -> RoomAlignment {
    let i_r_c = i_t_c.rotation;

    let (imu_yaw, r_r_i) = if camera_is_forward {
        // カメラが常にルームのz軸方向を向くようにヨーを打ち消す
        let yaw = extract_yaw(&i_r_c);
        (-yaw, yaw_rotation(-yaw))
    } else {
        (0.0, UnitQuaternion::identity())
    };

    RoomAlignment {
        camera_pose: Isometry3::from_parts(Translation3::from(*camera_position), r_r_i * i_r_c),
        imu_to_room: Isometry3::from_parts(Translation3::identity(), r_r_i),
        imu_yaw,
    }
}

/// Serializable summary of a calibration result.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub camera_position: [f64; 3],
    /// (x, y, z, w)
    pub camera_rotation: [f64; 4],
    pub imu_body: u32,
    pub imu_yaw_radians: f64,
    pub imu_yaw_degrees: f64,
}

impl CalibrationReport {
    pub fn new(imu_body: BodyId, alignment: &RoomAlignment) -> Self {
        let t = alignment.camera_pose.translation.vector;
        let q = alignment.camera_pose.rotation;
        Self {
            camera_position: [t.x, t.y, t.z],
            camera_rotation: [q.i, q.j, q.k, q.w],
            imu_body: imu_body.value(),
            imu_yaw_radians: alignment.imu_yaw,
            imu_yaw_degrees: alignment.imu_yaw.to_degrees(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cam_position() -> Vector3<f64> {
        Vector3::new(0.0, 1.2, -0.5)
    }

    #[test]
    fn test_forward_removes_yaw() {
        let i_t_c = Isometry3::from_parts(
            Translation3::new(0.1, -0.2, 0.35),
            yaw_rotation(30f64.to_radians()),
        );
        let a = resolve_room_alignment(&i_t_c, &cam_position(), true);
        assert_relative_eq!(a.imu_yaw, -30f64.to_radians(), epsilon = 1e-12);
        assert_relative_eq!(extract_yaw(&a.camera_pose.rotation), 0.0, epsilon = 1e-12);
        assert_relative_eq!(a.camera_pose.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_forward_keeps_pitch() {
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -0.3);
        let i_t_c = Isometry3::from_parts(
            Translation3::identity(),
            yaw_rotation(1.0) * pitch,
        );
        let a = resolve_room_alignment(&i_t_c, &cam_position(), true);
        assert_relative_eq!(a.imu_yaw, -1.0, epsilon = 1e-12);
        assert_relative_eq!(a.camera_pose.rotation.angle_to(&pitch), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_not_forward_keeps_rotation() {
        let rotation = UnitQuaternion::from_euler_angles(0.1, 0.7, -0.2);
        let i_t_c = Isometry3::from_parts(Translation3::new(1.0, 2.0, 3.0), rotation);
        let a = resolve_room_alignment(&i_t_c, &cam_position(), false);
        assert_eq!(a.imu_yaw, 0.0);
        assert_relative_eq!(a.camera_pose.rotation.angle_to(&rotation), 0.0, epsilon = 1e-12);
        assert_eq!(a.imu_to_room, Isometry3::identity());
    }

    #[test]
    fn test_translation_comes_from_config() {
        let i_t_c = Isometry3::from_parts(Translation3::new(5.0, 5.0, 5.0), yaw_rotation(0.2));
        let a = resolve_room_alignment(&i_t_c, &cam_position(), true);
        assert_eq!(a.camera_pose.translation.vector, cam_position());
        // rTi * iRc == rRc
        assert_relative_eq!(
            (a.imu_to_room.rotation * i_t_c.rotation).angle_to(&a.camera_pose.rotation),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_report_fields() {
        let i_t_c = Isometry3::from_parts(Translation3::identity(), yaw_rotation(0.5));
        let a = resolve_room_alignment(&i_t_c, &cam_position(), true);
        let report = CalibrationReport::new(BodyId(4), &a);
        assert_eq!(report.imu_body, 4);
        assert_eq!(report.camera_position, [0.0, 1.2, -0.5]);
        assert_relative_eq!(report.imu_yaw_degrees, -0.5f64.to_degrees(), epsilon = 1e-9);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"imu_body\":4"));
    }
}
