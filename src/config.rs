use anyhow::Result;
use log::warn;
use nalgebra::Vector3;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::CalibrationError;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    /// ルーム座標系でのカメラ位置（メートル）
    #[serde(default = "default_camera_position")]
    pub camera_position: [f64; 3],
    /// true: カメラがルームの前方を向いているとみなしてヨーを除去する
    #[serde(default = "default_camera_is_forward")]
    pub camera_is_forward: bool,
    /// 静止判定の並進速度上限
    #[serde(default = "default_linear_velocity_cutoff")]
    pub linear_velocity_cutoff: f64,
    /// 静止判定の角速度上限
    #[serde(default = "default_angular_velocity_cutoff")]
    pub angular_velocity_cutoff: f64,
    /// 連続静止サンプル数
    #[serde(default = "default_required_samples")]
    pub required_samples: usize,
    /// これより遠い（z, メートル）と近づくよう案内する
    #[serde(default = "default_near_message_cutoff")]
    pub near_message_cutoff: f64,
    /// dt <= 0 のときに代わりに使う値（秒）
    #[serde(default = "default_fallback_dt")]
    pub fallback_dt: f64,
    /// クォータニオン符号の連続性補正
    #[serde(default = "default_flip_quats")]
    pub flip_quats: bool,
    /// IMUは1台のみという前提。2台目のデータは設定エラーとして扱う
    #[serde(default = "default_assume_single_imu")]
    pub assume_single_imu: bool,
}

fn default_camera_position() -> [f64; 3] { [0.0, 1.2, -0.5] }
fn default_camera_is_forward() -> bool { true }
fn default_linear_velocity_cutoff() -> f64 { 0.2 }
fn default_angular_velocity_cutoff() -> f64 { 1.0e-4 }
fn default_required_samples() -> usize { 10 }
fn default_near_message_cutoff() -> f64 { 0.4 }
fn default_fallback_dt() -> f64 { 1.0 }
fn default_flip_quats() -> bool { true }
fn default_assume_single_imu() -> bool { true }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            camera_position: default_camera_position(),
            camera_is_forward: default_camera_is_forward(),
            linear_velocity_cutoff: default_linear_velocity_cutoff(),
            angular_velocity_cutoff: default_angular_velocity_cutoff(),
            required_samples: default_required_samples(),
            near_message_cutoff: default_near_message_cutoff(),
            fallback_dt: default_fallback_dt(),
            flip_quats: default_flip_quats(),
            assume_single_imu: default_assume_single_imu(),
        }
    }
}

impl CalibrationConfig {
    pub fn camera_position(&self) -> Vector3<f64> {
        Vector3::from(self.camera_position)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !self.camera_position.iter().all(|v| v.is_finite()) {
            return Err(CalibrationError::InvalidConfig(
                "camera_position must be finite".to_string(),
            ));
        }
        if !(self.linear_velocity_cutoff > 0.0) || !(self.angular_velocity_cutoff > 0.0) {
            return Err(CalibrationError::InvalidConfig(format!(
                "velocity cutoffs must be positive (linear {}, angular {})",
                self.linear_velocity_cutoff, self.angular_velocity_cutoff
            )));
        }
        if self.required_samples == 0 {
            return Err(CalibrationError::InvalidConfig(
                "required_samples must be at least 1".to_string(),
            ));
        }
        if !(self.fallback_dt > 0.0) || !self.fallback_dt.is_finite() {
            return Err(CalibrationError::InvalidConfig(format!(
                "fallback_dt must be positive, got {}",
                self.fallback_dt
            )));
        }
        if !self.near_message_cutoff.is_finite() {
            return Err(CalibrationError::InvalidConfig(
                "near_message_cutoff must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// One Euro Filter parameters (shared by both pose filters)
#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_min_cutoff")]
    pub position_min_cutoff: f64,
    #[serde(default = "default_beta")]
    pub position_beta: f64,
    #[serde(default = "default_min_cutoff")]
    pub rotation_min_cutoff: f64,
    #[serde(default = "default_beta")]
    pub rotation_beta: f64,
    #[serde(default = "default_derivative_cutoff")]
    pub derivative_cutoff: f64,
}

fn default_min_cutoff() -> f64 { 1.0 }
fn default_beta() -> f64 { 0.5 }
fn default_derivative_cutoff() -> f64 { 1.0 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            position_min_cutoff: default_min_cutoff(),
            position_beta: default_beta(),
            rotation_min_cutoff: default_min_cutoff(),
            rotation_beta: default_beta(),
            derivative_cutoff: default_derivative_cutoff(),
        }
    }
}

impl FilterConfig {
    /// alpha が (0, 1] に収まるパラメータのみ許可
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let cutoffs = [
            ("position_min_cutoff", self.position_min_cutoff),
            ("rotation_min_cutoff", self.rotation_min_cutoff),
            ("derivative_cutoff", self.derivative_cutoff),
        ];
        for (name, value) in cutoffs {
            if !(value > 0.0) || !value.is_finite() {
                return Err(CalibrationError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        let betas = [
            ("position_beta", self.position_beta),
            ("rotation_beta", self.rotation_beta),
        ];
        for (name, value) in betas {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(CalibrationError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.calibration.validate()?;
        self.filter.validate()
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default config ({}: {})", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_constants() {
        let c = CalibrationConfig::default();
        assert_eq!(c.linear_velocity_cutoff, 0.2);
        assert_eq!(c.angular_velocity_cutoff, 1.0e-4);
        assert_eq!(c.required_samples, 10);
        assert_eq!(c.near_message_cutoff, 0.4);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [calibration]
            camera_position = [0.5, 1.0, 0.0]
            required_samples = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.calibration.camera_position, [0.5, 1.0, 0.0]);
        assert_eq!(config.calibration.required_samples, 5);
        assert!(config.calibration.camera_is_forward);
        assert_eq!(config.filter.derivative_cutoff, 1.0);
    }

    #[test]
    fn test_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.calibration.required_samples, 10);
    }

    #[test]
    fn test_validate_rejects_zero_samples() {
        let c = CalibrationConfig {
            required_samples: 0,
            ..CalibrationConfig::default()
        };
        assert!(matches!(c.validate(), Err(CalibrationError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_fallback_dt() {
        let c = CalibrationConfig {
            fallback_dt: 0.0,
            ..CalibrationConfig::default()
        };
        assert!(c.validate().is_err());
        let c = CalibrationConfig {
            fallback_dt: f64::NAN,
            ..CalibrationConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_filter_cutoffs() {
        assert!(FilterConfig::default().validate().is_ok());
        let f = FilterConfig {
            position_min_cutoff: 0.0,
            position_beta: 0.0,
            ..FilterConfig::default()
        };
        assert!(matches!(f.validate(), Err(CalibrationError::InvalidConfig(_))));
        let f = FilterConfig {
            rotation_min_cutoff: -1.0,
            ..FilterConfig::default()
        };
        assert!(f.validate().is_err());
        let f = FilterConfig {
            derivative_cutoff: f64::NAN,
            ..FilterConfig::default()
        };
        assert!(f.validate().is_err());
        let f = FilterConfig {
            rotation_beta: -0.5,
            ..FilterConfig::default()
        };
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_config_validate_checks_filter() {
        let config: Config = toml::from_str(
            r#"
            [filter]
            derivative_cutoff = 0.0
            "#,
        )
        .unwrap();
        assert!(config.calibration.validate().is_ok());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/room_calibration.toml");
        assert_eq!(config.calibration.required_samples, 10);
    }
}
