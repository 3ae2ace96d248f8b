//! Room calibration: infer the camera pose in room space and the yaw
//! offset of the IMU from simultaneous video and IMU reports.
//!
//! The controller is driven synchronously by the tracking system's report
//! dispatch. Callers must serialize `process_imu_data` and
//! `process_video_data`.

pub mod events;
pub mod guidance;
pub mod resolve;
pub mod stability;

use log::debug;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::body::{BodyId, BodyTargetId};
use crate::config::{CalibrationConfig, FilterConfig};
use crate::error::{CalibrationError, CalibrationResult};
use crate::filter::quat::{
    flip_quat_sign_to_match, is_finite_quat, is_finite_vector, with_nonnegative_w,
};
use crate::filter::{OneEuroPoseFilter, PoseFilter};
use crate::system::TrackingSystem;
use crate::time::Timestamp;

pub use events::{CalibrationEvent, EventSink, ImuRejection, LogSink};
pub use guidance::{Guidance, Instruction, InstructionState};
pub use resolve::{resolve_room_alignment, CalibrationReport, RoomAlignment};
pub use stability::{StabilityOutcome, StabilityWindow};

pub struct RoomCalibration<S: EventSink = LogSink, F: PoseFilter = OneEuroPoseFilter> {
    config: CalibrationConfig,
    sink: S,
    /// cTd: 追跡対象のカメラ座標系での姿勢
    pose_filter: F,
    /// iTc: カメラ→IMU（ルーム座標系、ヨー未定）
    camera_filter: F,
    imu_body: Option<BodyId>,
    imu_orientation: UnitQuaternion<f64>,
    video_target: Option<BodyTargetId>,
    last_video: Option<Timestamp>,
    stability: StabilityWindow,
    guidance: Guidance,
    alignment: Option<RoomAlignment>,
}

impl RoomCalibration<LogSink, OneEuroPoseFilter> {
    pub fn new(config: CalibrationConfig, filter: &FilterConfig) -> Self {
        Self::with_sink(config, filter, LogSink)
    }
}

impl<S: EventSink> RoomCalibration<S, OneEuroPoseFilter> {
    pub fn with_sink(config: CalibrationConfig, filter: &FilterConfig, sink: S) -> Self {
        Self::with_filters(
            config,
            sink,
            OneEuroPoseFilter::from_config(filter),
            OneEuroPoseFilter::from_config(filter),
        )
    }
}

impl<S: EventSink, F: PoseFilter> RoomCalibration<S, F> {
    pub fn with_filters(
        config: CalibrationConfig,
        sink: S,
        pose_filter: F,
        camera_filter: F,
    ) -> Self {
        let stability = StabilityWindow::new(
            config.linear_velocity_cutoff,
            config.angular_velocity_cutoff,
            config.required_samples,
        );
        let guidance = Guidance::new(config.near_message_cutoff);
        Self {
            config,
            sink,
            pose_filter,
            camera_filter,
            imu_body: None,
            imu_orientation: UnitQuaternion::identity(),
            video_target: None,
            last_video: None,
            stability,
            guidance,
            alignment: None,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn have_imu_data(&self) -> bool {
        self.imu_body.is_some()
    }

    pub fn have_video_data(&self) -> bool {
        self.video_target.is_some()
    }

    pub fn imu_body(&self) -> Option<BodyId> {
        self.imu_body
    }

    pub fn video_target(&self) -> Option<BodyTargetId> {
        self.video_target
    }

    pub fn imu_orientation(&self) -> UnitQuaternion<f64> {
        self.imu_orientation
    }

    pub fn steady_video_reports(&self) -> usize {
        self.stability.count()
    }

    pub fn instruction_state(&self) -> InstructionState {
        self.guidance.state()
    }

    /// Enough consecutive steady samples have been seen.
    pub fn finished(&self) -> bool {
        self.stability.is_filled()
    }

    /// `post_calibration_update` has run and the result is frozen.
    pub fn calibration_complete(&self) -> bool {
        self.alignment.is_some()
    }

    /// Current, unfinalized iTc.
    pub fn camera_to_imu_calibration_point(&self) -> Isometry3<f64> {
        self.camera_filter.isometry()
    }

    /// 既に窓が埋まった後はサンプルを受け付けない
    fn frozen(&self) -> bool {
        self.finished() || self.calibration_complete()
    }

    pub fn process_imu_data<T: TrackingSystem + ?Sized>(
        &mut self,
        sys: &T,
        body: BodyId,
        timestamp: Timestamp,
        orientation: &UnitQuaternion<f64>,
    ) -> CalibrationResult<()> {
        if let Some(bound) = self.imu_body {
            if bound != body {
                if self.config.assume_single_imu {
                    return Err(CalibrationError::SecondImu {
                        bound,
                        received: body,
                    });
                }
                debug!("Ignoring IMU report from body {} (bound to {})", body, bound);
                return Ok(());
            }
        }
        if self.frozen() {
            return Ok(());
        }

        if !is_finite_quat(orientation.quaternion()) {
            self.sink.emit(CalibrationEvent::ImuRejected {
                body,
                reason: ImuRejection::NonFinite,
            });
            return Ok(());
        }

        if self.imu_body.is_none() {
            if !sys.is_valid_body_id(body) {
                self.sink.emit(CalibrationEvent::ImuRejected {
                    body,
                    reason: ImuRejection::InvalidBody,
                });
                return Ok(());
            }
            // 映像ターゲットのない剛体のIMUではキャリブレーションできない
            if sys.num_targets(body) == 0 {
                self.sink.emit(CalibrationEvent::ImuRejected {
                    body,
                    reason: ImuRejection::NoTargets,
                });
                return Ok(());
            }
            self.sink.emit(CalibrationEvent::FirstImuReport { body });
            self.imu_body = Some(body);
            self.imu_orientation = if self.config.flip_quats {
                with_nonnegative_w(orientation)
            } else {
                *orientation
            };
            return Ok(());
        }

        debug!("IMU report from body {} at {}", body, timestamp);
        self.imu_orientation = if self.config.flip_quats {
            flip_quat_sign_to_match(&self.imu_orientation, orientation)
        } else {
            *orientation
        };
        Ok(())
    }

    pub fn want_video_data(&self, target: &BodyTargetId) -> bool {
        // IMUデータが来るまで映像は不要
        let Some(imu_body) = self.imu_body else {
            return false;
        };
        match self.video_target {
            // 初回はIMUと同じ剛体であること
            None => target.body == imu_body,
            // 以降は最初のターゲットのみ
            Some(bound) => bound == *target,
        }
    }

    pub fn process_video_data(
        &mut self,
        target: BodyTargetId,
        timestamp: Timestamp,
        translation: &Vector3<f64>,
        orientation: &UnitQuaternion<f64>,
    ) {
        if !self.want_video_data(&target) || self.frozen() {
            return;
        }
        if !is_finite_vector(translation) || !is_finite_quat(orientation.quaternion()) {
            debug!("Dropping non-finite video report from {}", target);
            return;
        }
        if self.video_target.is_none() {
            self.sink.emit(CalibrationEvent::FirstVideoReport { target });
            self.video_target = Some(target);
        }

        let dt = match self.last_video.replace(timestamp) {
            Some(prev) => timestamp.seconds_since(prev),
            None => self.config.fallback_dt,
        };
        // 時刻の異常時はゼロ除算を避ける
        let dt = if dt > 0.0 && dt.is_finite() {
            dt
        } else {
            self.config.fallback_dt
        };

        // RANSAC由来でノイズが多いので先にフィルタする
        let orientation = if self.config.flip_quats {
            flip_quat_sign_to_match(&self.pose_filter.orientation(), orientation)
        } else {
            *orientation
        };
        self.pose_filter.filter(dt, translation, &orientation);

        // rTc = rRd * (cTd)^-1, rRd はIMUの姿勢（ヨーを除いてルームと一致）
        let imu = Isometry3::from_parts(Translation3::identity(), self.imu_orientation);
        let r_t_c = imu * self.pose_filter.isometry().inverse();
        self.camera_filter
            .filter(dt, &r_t_c.translation.vector, &r_t_c.rotation);

        let linear = self.camera_filter.linear_velocity_magnitude();
        let angular = self.camera_filter.angular_velocity_magnitude();
        match self.stability.observe(linear, angular) {
            StabilityOutcome::Steady { count, filled } => {
                if count == 1 {
                    self.sink.emit(CalibrationEvent::HoldStill);
                }
                self.sink.emit(CalibrationEvent::Progress {
                    steady: count,
                    required: self.stability.required(),
                });
                if filled {
                    self.sink.emit(CalibrationEvent::WindowFilled);
                }
            }
            exceeded @ StabilityOutcome::Exceeded { .. } => {
                self.handle_excess_velocity(translation.z, exceeded);
            }
        }
    }

    fn handle_excess_velocity(&mut self, z_translation: f64, outcome: StabilityOutcome) {
        if let StabilityOutcome::Exceeded {
            previous,
            linear,
            angular,
        } = outcome
        {
            if previous > 0 {
                self.sink.emit(CalibrationEvent::Restarting { linear, angular });
            }
        }
        match self.guidance.observe_distance(z_translation) {
            Some(Instruction::MoveCloser { cutoff }) => {
                self.sink.emit(CalibrationEvent::MoveCloser { cutoff });
            }
            Some(Instruction::DistanceGood) => {
                self.sink.emit(CalibrationEvent::DistanceGood);
            }
            None => {}
        }
    }

    /// Finalize once the window has filled, then publish to `sys`.
    ///
    /// Returns `Ok(true)` on the call that finalizes, `Ok(false)` if not yet
    /// finished or already complete.
    pub fn post_calibration_update<T: TrackingSystem + ?Sized>(
        &mut self,
        sys: &mut T,
    ) -> CalibrationResult<bool> {
        if !self.finished() || self.calibration_complete() {
            return Ok(false);
        }
        let Some(imu_body) = self.imu_body else {
            return Ok(false);
        };

        let calibration_point = self.camera_to_imu_calibration_point();
        let alignment = resolve_room_alignment(
            &calibration_point,
            &self.config.camera_position(),
            self.config.camera_is_forward,
        );
        self.sink.emit(CalibrationEvent::Complete {
            calibration_point,
            camera_pose: alignment.camera_pose,
            imu_yaw: alignment.imu_yaw,
        });
        self.alignment = Some(alignment);

        sys.set_camera_pose(self.camera_pose()?);
        for imu in sys.imu_bodies() {
            if let Some(yaw) = self.calibration_yaw(imu)? {
                sys.set_calibration_yaw(imu, yaw);
            }
        }
        debug!("Published room calibration for IMU {}", imu_body);
        Ok(true)
    }

    fn alignment(&self) -> CalibrationResult<&RoomAlignment> {
        self.alignment.as_ref().ok_or(CalibrationError::NotComplete)
    }

    /// rTc
    pub fn camera_pose(&self) -> CalibrationResult<Isometry3<f64>> {
        Ok(self.alignment()?.camera_pose)
    }

    /// rTi
    pub fn imu_to_room(&self) -> CalibrationResult<Isometry3<f64>> {
        Ok(self.alignment()?.imu_to_room)
    }

    /// Yaw for `body`, `None` if it is not the calibrated IMU.
    pub fn calibration_yaw(&self, body: BodyId) -> CalibrationResult<Option<f64>> {
        let alignment = self.alignment()?;
        Ok((self.imu_body == Some(body)).then_some(alignment.imu_yaw))
    }

    pub fn report(&self) -> CalibrationResult<CalibrationReport> {
        let alignment = self.alignment()?;
        let body = self.imu_body.ok_or(CalibrationError::NotComplete)?;
        Ok(CalibrationReport::new(body, alignment))
    }
}

/// True iff the system has a camera pose and every IMU knows its yaw.
pub fn is_room_calibration_complete<T: TrackingSystem + ?Sized>(
    sys: &T,
    assume_single_imu: bool,
) -> CalibrationResult<bool> {
    if !sys.have_camera_pose() {
        return Ok(false);
    }
    let imus = sys.imu_bodies();
    if assume_single_imu && imus.len() > 1 {
        return Err(CalibrationError::MultipleImus { count: imus.len() });
    }
    Ok(imus.iter().all(|&imu| sys.calibration_yaw_known(imu)))
}
