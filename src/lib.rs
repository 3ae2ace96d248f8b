pub mod body;
pub mod calibration;
pub mod config;
pub mod error;
pub mod filter;
pub mod system;
pub mod time;

pub use body::{BodyId, BodyTargetId, TargetId};
pub use calibration::{is_room_calibration_complete, RoomCalibration};
pub use error::CalibrationError;
