use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::CamlinkError;
use crate::types::{Frame, Resolution};

/// Env var naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "CAMLINK_CONFIG";
/// Number = limit fetches to that rate; `0` / `off` = unlimited.
pub const FPS_LIMIT_ENV: &str = "CAMLINK_FPS_LIMIT";
pub const DEVICE_INDEX_ENV: &str = "CAMLINK_DEVICE_INDEX";
/// `identity` or `content`.
pub const DEDUP_ENV: &str = "CAMLINK_DEDUP";

// MARK: - PacingConfig

/// How often frames are requested from the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// `false` = fetch as fast as the device serves frames.
    pub limited: bool,
    /// Frames per second, only used when `limited`.
    #[serde(alias = "targetRate")]
    pub target_rate: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self { limited: false, target_rate: 5.0 }
    }
}

impl PacingConfig {
    pub fn unlimited() -> Self {
        Self { limited: false, ..Default::default() }
    }

    pub fn limited(target_rate: f64) -> Self {
        Self { limited: true, target_rate }
    }

    /// Period between fixed-rate fetches, `1s / target_rate` at nanosecond
    /// precision (no rounding to whole milliseconds).
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_rate)
    }

    pub fn validate(&self) -> Result<(), CamlinkError> {
        if self.limited && !(self.target_rate.is_finite() && self.target_rate > 0.0) {
            return Err(CamlinkError::ConfigurationInvalid {
                reason: format!("target rate must be > 0 when limited, got {}", self.target_rate),
            });
        }
        Ok(())
    }
}

// MARK: - DedupStrategy

/// How the pump decides that a fetched frame is the one already shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Same produced frame (the source handed back the same object).
    #[default]
    Identity,
    /// Same dimensions, format and pixel bytes.
    ContentHash,
}

impl DedupStrategy {
    /// Comparison key; two frames are duplicates when their keys match.
    pub fn key(&self, frame: &Frame) -> u64 {
        match self {
            Self::Identity => frame.id().as_u64(),
            Self::ContentHash => frame.content_hash(),
        }
    }
}

impl std::str::FromStr for DedupStrategy {
    type Err = CamlinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::Identity),
            "content" | "content_hash" | "hash" => Ok(Self::ContentHash),
            other => Err(CamlinkError::ConfigurationInvalid {
                reason: format!("unknown dedup strategy '{other}'"),
            }),
        }
    }
}

// MARK: - SourceKind

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Synthetic moving test pattern, no hardware needed.
    #[default]
    TestPattern,
    /// V4L2 camera through GStreamer (`v4l2` feature).
    V4l2,
}

// MARK: - ViewerConfig

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Preferred device; falls back to the default (first) device when absent.
    #[serde(alias = "deviceIndex")]
    pub device_index: Option<usize>,
    /// Capture size requested from the device.
    #[serde(alias = "viewSize")]
    pub view_size: Resolution,
    #[serde(alias = "windowSize")]
    pub window_size: Resolution,
    #[serde(alias = "windowTitle")]
    pub window_title: String,
    pub pacing: PacingConfig,
    pub dedup: DedupStrategy,
    pub source: SourceKind,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            device_index: Some(1),
            view_size: Resolution::QVGA,
            window_size: Resolution::VGA,
            window_title: "Camlink Viewer".into(),
            pacing: PacingConfig::default(),
            dedup: DedupStrategy::default(),
            source: SourceKind::default(),
        }
    }
}

impl ViewerConfig {
    /// Defaults, then the JSON file named by `CAMLINK_CONFIG`, then env overrides.
    pub fn load() -> Result<Self, CamlinkError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                info!("Loading config from {}", path);
                let text = std::fs::read_to_string(&path)?;
                serde_json::from_str(&text)?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CAMLINK_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), CamlinkError> {
        if let Some(raw) = lookup(FPS_LIMIT_ENV) {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("off") || raw == "0" {
                self.pacing.limited = false;
            } else {
                let rate: f64 = raw.parse().map_err(|_| CamlinkError::ConfigurationInvalid {
                    reason: format!("{FPS_LIMIT_ENV}='{raw}' is not a number"),
                })?;
                self.pacing = PacingConfig::limited(rate);
            }
            debug!("{} override → {:?}", FPS_LIMIT_ENV, self.pacing);
        }
        if let Some(raw) = lookup(DEVICE_INDEX_ENV) {
            let index = raw.trim().parse().map_err(|_| CamlinkError::ConfigurationInvalid {
                reason: format!("{DEVICE_INDEX_ENV}='{raw}' is not an index"),
            })?;
            self.device_index = Some(index);
        }
        if let Some(raw) = lookup(DEDUP_ENV) {
            self.dedup = raw.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CamlinkError> {
        self.pacing.validate()?;
        if self.view_size.total_pixels() == 0 {
            return Err(CamlinkError::ConfigurationInvalid {
                reason: format!("view size {} is empty", self.view_size),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "deviceIndex": 0,
            "viewSize": {"width": 640, "height": 480},
            "pacing": {"limited": true, "targetRate": 12.5},
            "dedup": "content_hash"
        }"#;

        let cfg: ViewerConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.device_index, Some(0));
        assert_eq!(cfg.view_size, Resolution::VGA);
        assert!(cfg.pacing.limited);
        assert_eq!(cfg.pacing.target_rate, 12.5);
        assert_eq!(cfg.dedup, DedupStrategy::ContentHash);
        assert_eq!(cfg.window_size, Resolution::VGA);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let env: HashMap<&str, &str> = [
            (FPS_LIMIT_ENV, "10"),
            (DEVICE_INDEX_ENV, "3"),
            (DEDUP_ENV, "content"),
        ]
        .into_iter()
        .collect();

        let mut cfg = ViewerConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.pacing, PacingConfig::limited(10.0));
        assert_eq!(cfg.device_index, Some(3));
        assert_eq!(cfg.dedup, DedupStrategy::ContentHash);

        cfg.apply_overrides(|k| (k == FPS_LIMIT_ENV).then(|| "off".to_string()))
            .unwrap();
        assert!(!cfg.pacing.limited);
    }

    #[test]
    fn rejects_non_positive_limited_rate() {
        assert!(PacingConfig::limited(0.0).validate().is_err());
        assert!(PacingConfig::limited(f64::NAN).validate().is_err());
        assert!(PacingConfig { limited: false, target_rate: 0.0 }.validate().is_ok());

        let mut cfg = ViewerConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == FPS_LIMIT_ENV).then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, CamlinkError::ConfigurationInvalid { .. }));
    }

    #[test]
    fn frame_interval_is_not_rounded() {
        assert_eq!(PacingConfig::limited(10.0).frame_interval(), Duration::from_millis(100));
        assert_eq!(
            PacingConfig::limited(3.0).frame_interval(),
            Duration::from_nanos(333_333_333)
        );
    }
}
