use anyhow::{bail, Context, Result};
use log::{info, warn};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::io::{self, BufRead, Write};

use room_calibration::calibration::RoomCalibration;
use room_calibration::config::Config;
use room_calibration::system::{RoomModel, TrackingSystem};
use room_calibration::time::Timestamp;
use room_calibration::{
    is_room_calibration_complete, BodyId, BodyTargetId, CalibrationError, TargetId,
};

const CONFIG_PATH: &str = "config.toml";

struct Session {
    room: RoomModel,
    calibration: RoomCalibration,
    assume_single_imu: bool,
}

fn parse_f64(s: &str) -> Result<f64> {
    s.parse().with_context(|| format!("not a number: {}", s))
}

fn parse_body(s: &str) -> Result<BodyId> {
    Ok(BodyId(s.parse().with_context(|| format!("not a body id: {}", s))?))
}

/// w x y z
fn parse_quat(parts: &[&str]) -> Result<UnitQuaternion<f64>> {
    let q = Quaternion::new(
        parse_f64(parts[0])?,
        parse_f64(parts[1])?,
        parse_f64(parts[2])?,
        parse_f64(parts[3])?,
    );
    let norm = q.norm();
    if norm == 0.0 {
        bail!("zero quaternion");
    }
    // 非有限値はそのまま渡してキャリブレーション側で捨てさせる
    Ok(UnitQuaternion::new_unchecked(q / norm))
}

impl Session {
    fn handle(&mut self, parts: &[&str]) -> Result<bool> {
        match parts[0] {
            "body" if parts.len() == 3 || parts.len() == 4 => {
                let id = parse_body(parts[1])?;
                let targets: usize = parts[2].parse().context("not a target count")?;
                let imu = parts.get(3) == Some(&"imu");
                self.room.add_body(id, targets);
                if imu {
                    self.room.add_imu(id);
                }
                println!("body {}: {} targets{}", id, targets, if imu { " + IMU" } else { "" });
            }
            "imu" if parts.len() == 7 => {
                let body = parse_body(parts[1])?;
                let t = Timestamp::from_secs_f64(parse_f64(parts[2])?);
                let q = parse_quat(&parts[3..7])?;
                self.calibration.process_imu_data(&self.room, body, t, &q)?;
            }
            "video" if parts.len() == 11 => {
                let body = parse_body(parts[1])?;
                let target: u8 = parts[2].parse().context("not a target index")?;
                let t = Timestamp::from_secs_f64(parse_f64(parts[3])?);
                let translation = Vector3::new(
                    parse_f64(parts[4])?,
                    parse_f64(parts[5])?,
                    parse_f64(parts[6])?,
                );
                let q = parse_quat(&parts[7..11])?;
                self.calibration.process_video_data(
                    BodyTargetId::new(body, TargetId(target)),
                    t,
                    &translation,
                    &q,
                );
                if self.calibration.post_calibration_update(&mut self.room)? {
                    let complete =
                        is_room_calibration_complete(&self.room, self.assume_single_imu)?;
                    info!("Room calibration complete system wide: {}", complete);
                }
            }
            "status" => {
                println!("IMU: {:?}", self.calibration.imu_body());
                println!("video target: {:?}", self.calibration.video_target());
                println!(
                    "steady: {}/{}",
                    self.calibration.steady_video_reports(),
                    self.calibration.config().required_samples
                );
                println!("instructions: {:?}", self.calibration.instruction_state());
                println!("camera pose published: {}", self.room.have_camera_pose());
            }
            "result" => {
                let report = self.calibration.report()?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            "q" => return Ok(false),
            _ => bail!("unknown command: {}", parts.join(" ")),
        }
        Ok(true)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&path);

    println!("=== Room Calibration ===");
    println!("camera position: {:?}", config.calibration.camera_position);
    println!();
    println!("commands:");
    println!("  body <id> <targets> [imu]                        - register a body");
    println!("  imu <body> <t> <qw> <qx> <qy> <qz>               - IMU report");
    println!("  video <body> <target> <t> <x> <y> <z> <qw> <qx> <qy> <qz> - video report");
    println!("  status | result | q");
    println!();

    let mut session = Session {
        room: RoomModel::new(),
        assume_single_imu: config.calibration.assume_single_imu,
        calibration: RoomCalibration::new(config.calibration, &config.filter),
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() || parts[0].starts_with('#') {
            continue;
        }

        match session.handle(&parts) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                let fatal = e
                    .downcast_ref::<CalibrationError>()
                    .is_some_and(CalibrationError::is_configuration_violation);
                if fatal {
                    return Err(e);
                }
                warn!("{:#}", e);
            }
        }
    }

    Ok(())
}
