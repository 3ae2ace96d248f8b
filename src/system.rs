use std::collections::BTreeMap;

use nalgebra::Isometry3;

use crate::body::BodyId;

/// The owning tracking system, as seen by room calibration.
pub trait TrackingSystem {
    fn is_valid_body_id(&self, body: BodyId) -> bool;

    /// Number of video-trackable targets on `body` (0 for unknown bodies).
    fn num_targets(&self, body: BodyId) -> usize;

    /// Bodies that carry an IMU.
    fn imu_bodies(&self) -> Vec<BodyId>;

    fn have_camera_pose(&self) -> bool;

    fn set_camera_pose(&mut self, pose: Isometry3<f64>);

    fn calibration_yaw_known(&self, imu: BodyId) -> bool;

    /// Yaw offset in radians.
    fn set_calibration_yaw(&mut self, imu: BodyId, yaw: f64);
}

#[derive(Debug, Clone, Default)]
pub struct TrackedImu {
    pub calibration_yaw: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TrackedBody {
    pub num_targets: usize,
    pub imu: Option<TrackedImu>,
}

/// In-memory tracking system: bodies, their targets and IMUs, plus the
/// published camera pose.
#[derive(Debug, Clone, Default)]
pub struct RoomModel {
    bodies: BTreeMap<BodyId, TrackedBody>,
    camera_pose: Option<Isometry3<f64>>,
}

impl RoomModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 剛体を登録（既存なら上書き）
    pub fn add_body(&mut self, id: BodyId, num_targets: usize) -> &mut TrackedBody {
        let body = self.bodies.entry(id).or_default();
        body.num_targets = num_targets;
        body
    }

    /// 剛体にIMUを付ける。未登録ならターゲット0で登録される
    pub fn add_imu(&mut self, id: BodyId) {
        let body = self.bodies.entry(id).or_default();
        if body.imu.is_none() {
            body.imu = Some(TrackedImu::default());
        }
    }

    pub fn camera_pose(&self) -> Option<&Isometry3<f64>> {
        self.camera_pose.as_ref()
    }

    pub fn calibration_yaw(&self, id: BodyId) -> Option<f64> {
        self.bodies.get(&id)?.imu.as_ref()?.calibration_yaw
    }
}

impl TrackingSystem for RoomModel {
    fn is_valid_body_id(&self, body: BodyId) -> bool {
        self.bodies.contains_key(&body)
    }

    fn num_targets(&self, body: BodyId) -> usize {
        self.bodies.get(&body).map(|b| b.num_targets).unwrap_or(0)
    }

    fn imu_bodies(&self) -> Vec<BodyId> {
        self.bodies
            .iter()
            .filter(|(_, b)| b.imu.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    fn have_camera_pose(&self) -> bool {
        self.camera_pose.is_some()
    }

    fn set_camera_pose(&mut self, pose: Isometry3<f64>) {
        self.camera_pose = Some(pose);
    }

    fn calibration_yaw_known(&self, imu: BodyId) -> bool {
        self.calibration_yaw(imu).is_some()
    }

    fn set_calibration_yaw(&mut self, imu: BodyId, yaw: f64) {
        if let Some(tracked) = self.bodies.get_mut(&imu).and_then(|b| b.imu.as_mut()) {
            tracked.calibration_yaw = Some(yaw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_body() {
        let room = RoomModel::new();
        assert!(!room.is_valid_body_id(BodyId(0)));
        assert_eq!(room.num_targets(BodyId(0)), 0);
        assert!(room.imu_bodies().is_empty());
    }

    #[test]
    fn test_imu_bodies_only_lists_imus() {
        let mut room = RoomModel::new();
        room.add_body(BodyId(1), 1);
        room.add_body(BodyId(2), 2);
        room.add_imu(BodyId(2));
        assert_eq!(room.imu_bodies(), vec![BodyId(2)]);
        assert_eq!(room.num_targets(BodyId(2)), 2);
    }

    #[test]
    fn test_set_yaw_requires_imu() {
        let mut room = RoomModel::new();
        room.add_body(BodyId(1), 1);
        room.set_calibration_yaw(BodyId(1), 0.5);
        assert!(!room.calibration_yaw_known(BodyId(1)));

        room.add_imu(BodyId(1));
        room.set_calibration_yaw(BodyId(1), 0.5);
        assert_eq!(room.calibration_yaw(BodyId(1)), Some(0.5));
    }

    #[test]
    fn test_camera_pose() {
        let mut room = RoomModel::new();
        assert!(!room.have_camera_pose());
        room.set_camera_pose(Isometry3::identity());
        assert!(room.have_camera_pose());
    }
}
