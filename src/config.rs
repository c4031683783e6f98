//! Configuration for the proctoring session monitor.

use crate::core::types::{ViolationClass, ViolationKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Escalation policy
    pub policy: PolicyConfig,

    /// Which detectors run and how they sample
    pub detectors: DetectorConfig,

    /// Device acquisition strictness
    pub devices: DeviceConfig,

    /// IANA timezone used for local times in session reports
    pub report_timezone: String,

    /// Path for exporting session reports
    pub export_path: PathBuf,

    /// Path for storing the audit log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proctor-sentinel");

        Self {
            policy: PolicyConfig::default(),
            detectors: DetectorConfig::default(),
            devices: DeviceConfig::default(),
            report_timezone: "UTC".to_string(),
            export_path: data_dir.join("reports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, or defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proctor-sentinel")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject limits that would make escalation impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.policy;
        if p.violation_limit == 0 || p.popup_limit == 0 || p.fullscreen_exit_limit == 0 {
            return Err(ConfigError::Invalid(
                "violation, popup and fullscreen limits must be at least 1".into(),
            ));
        }
        if self.detectors.display.max_check_attempts == 0 {
            return Err(ConfigError::Invalid(
                "display.max_check_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Scored violations before a warning popup opens
    pub violation_limit: u32,
    /// Popups after which the next acknowledgment terminates
    pub popup_limit: u32,
    /// Fullscreen exits allowed before termination
    pub fullscreen_exit_limit: u32,
    /// Class for visibility-hidden tab switches
    pub tab_switch: ViolationClass,
    /// Class for window blur
    pub window_blur: ViolationClass,
    /// Class for devtools detection
    pub devtools: ViolationClass,
    /// Class for external displays seen while active
    pub external_display: ViolationClass,
    /// Class for ambient noise
    pub noise: ViolationClass,
    /// Class for a refused camera or microphone
    pub device_denied: ViolationClass,
    /// Default minimum interval between two recorded violations of a kind
    pub debounce_ms: u64,
    /// Minimum interval between two recorded noise violations
    pub noise_debounce_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            violation_limit: 5,
            popup_limit: 3,
            fullscreen_exit_limit: 3,
            tab_switch: ViolationClass::Immediate,
            window_blur: ViolationClass::Immediate,
            devtools: ViolationClass::Immediate,
            external_display: ViolationClass::Immediate,
            noise: ViolationClass::Counted,
            device_denied: ViolationClass::Scored,
            debounce_ms: 1000,
            noise_debounce_ms: 5000,
        }
    }
}

impl PolicyConfig {
    /// Escalation class for a kind.
    pub fn class_of(&self, kind: ViolationKind) -> ViolationClass {
        match kind {
            ViolationKind::FullscreenExit => ViolationClass::Limited {
                limit: self.fullscreen_exit_limit,
            },
            ViolationKind::TabSwitch => self.tab_switch,
            ViolationKind::WindowBlur => self.window_blur,
            ViolationKind::DevToolsOpened => self.devtools,
            ViolationKind::ExternalDisplay => self.external_display,
            ViolationKind::ExcessiveNoise => self.noise,
            ViolationKind::DevicePermissionDenied => self.device_denied,
            ViolationKind::NoFace | ViolationKind::MultipleFaces | ViolationKind::HeadTurned => {
                ViolationClass::Scored
            }
            ViolationKind::BlockedKeyAttempt | ViolationKind::ContextMenuAttempt => {
                ViolationClass::Advisory
            }
        }
    }

    /// Debounce window for a kind, in milliseconds.
    pub fn debounce_ms_for(&self, kind: ViolationKind) -> u64 {
        match kind {
            ViolationKind::ExcessiveNoise => self.noise_debounce_ms,
            // Camera and microphone refusals arrive together.
            ViolationKind::DevicePermissionDenied => 0,
            _ => self.debounce_ms,
        }
    }
}

/// Detector selection and sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub fullscreen: bool,
    pub tab_switch: bool,
    pub keys: bool,
    pub devtools: DevToolsConfig,
    pub display: DisplayConfig,
    pub face: FaceConfig,
    pub noise: NoiseConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fullscreen: true,
            tab_switch: true,
            keys: true,
            devtools: DevToolsConfig::default(),
            display: DisplayConfig::default(),
            face: FaceConfig::default(),
            noise: NoiseConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Enable only the detectors named in a comma-separated list.
    ///
    /// Accepts `fullscreen`, `tabs`, `keys`, `devtools`, `display`, `face`,
    /// `noise`, or `all`.
    pub fn from_csv(s: &str) -> Self {
        let names: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |name: &str| names.iter().any(|n| n == name || n == "all");

        let mut config = Self::default();
        config.fullscreen = has("fullscreen");
        config.tab_switch = has("tabs");
        config.keys = has("keys");
        config.devtools.enabled = has("devtools");
        config.display.enabled = has("display");
        config.face.enabled = has("face");
        config.noise.enabled = has("noise");
        config
    }

    /// Check if at least one detector is enabled.
    pub fn any_enabled(&self) -> bool {
        self.fullscreen
            || self.tab_switch
            || self.keys
            || self.devtools.enabled
            || self.display.enabled
            || self.face.enabled
            || self.noise.enabled
    }
}

/// Devtools heuristic tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevToolsConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// Outer-minus-inner window delta treated as docked devtools
    pub size_threshold_px: f64,
    /// Whether the console/debugger trap probe counts as detection
    pub trap_enabled: bool,
    /// Report detections as critical (terminate regardless of class)
    pub strict: bool,
}

impl Default for DevToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            size_threshold_px: 160.0,
            trap_enabled: true,
            strict: true,
        }
    }
}

/// External display heuristic tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    /// Block session entry until the check clears
    pub check_on_entry: bool,
    pub poll_interval_ms: u64,
    /// Screen-to-window ratio above which a second display is assumed
    pub ratio_threshold: f64,
    /// Screen-minus-available difference above which a second display is assumed
    pub avail_diff_px: f64,
    pub min_pixel_ratio: f64,
    pub max_pixel_ratio: f64,
    /// Ambiguous checks tolerated before failing open
    pub max_check_attempts: u32,
    pub retry_delay_ms: u64,
    /// Whether the candidate may continue past a positive entry check
    pub allow_override: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_on_entry: true,
            poll_interval_ms: 5000,
            ratio_threshold: 1.5,
            avail_diff_px: 200.0,
            min_pixel_ratio: 0.95,
            max_pixel_ratio: 1.05,
            max_check_attempts: 3,
            retry_delay_ms: 500,
            allow_override: true,
        }
    }
}

/// Face presence and head orientation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// Track head orientation from face keypoints
    pub head_tracking: bool,
    /// Normalized nose offset beyond which the head counts as turned
    pub head_turn_threshold: f64,
    /// How long no face must persist before it is reported
    pub no_face_grace_ms: u64,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            head_tracking: true,
            head_turn_threshold: 0.1,
            no_face_grace_ms: 0,
        }
    }
}

/// Ambient noise tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub enabled: bool,
    pub sample_interval_ms: u64,
    pub measure: NoiseMeasure,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_ms: 50,
            measure: NoiseMeasure::AverageAmplitude { threshold: 50.0 },
        }
    }
}

/// How loudness is computed from an analyser frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "measure", rename_all = "snake_case")]
pub enum NoiseMeasure {
    /// Mean of byte frequency bins (0-255)
    AverageAmplitude { threshold: f64 },
    /// RMS of the time-domain buffer in dBFS
    RmsDecibels { threshold_db: f64 },
}

/// Device acquisition strictness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Refuse to start when camera/microphone access is denied
    pub require_devices: bool,
    /// Refuse to start when fullscreen cannot be entered
    pub require_fullscreen: bool,
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_list_parsing() {
        let config = DetectorConfig::from_csv("face,noise");
        assert!(config.face.enabled);
        assert!(config.noise.enabled);
        assert!(!config.devtools.enabled);
        assert!(!config.fullscreen);

        let config = DetectorConfig::from_csv("all");
        assert!(config.fullscreen && config.keys && config.display.enabled);

        let config = DetectorConfig::from_csv("nothing");
        assert!(!config.any_enabled());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.policy.violation_limit, 5);
        assert_eq!(config.policy.popup_limit, 3);
        assert_eq!(config.detectors.devtools.size_threshold_px, 160.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_classes() {
        let policy = PolicyConfig::default();
        assert_eq!(
            policy.class_of(ViolationKind::FullscreenExit),
            ViolationClass::Limited { limit: 3 }
        );
        assert_eq!(
            policy.class_of(ViolationKind::WindowBlur),
            ViolationClass::Immediate
        );
        assert_eq!(policy.class_of(ViolationKind::NoFace), ViolationClass::Scored);
        assert_eq!(policy.debounce_ms_for(ViolationKind::ExcessiveNoise), 5000);
        assert_eq!(
            policy.class_of(ViolationKind::ExcessiveNoise),
            ViolationClass::Counted
        );
        assert_eq!(
            policy.class_of(ViolationKind::DevicePermissionDenied),
            ViolationClass::Scored
        );
        assert_eq!(policy.debounce_ms_for(ViolationKind::HeadTurned), 1000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"policy":{"tab_switch":{"class":"scored"}}}"#).unwrap();
        assert_eq!(config.policy.tab_switch, ViolationClass::Scored);
        assert_eq!(config.policy.violation_limit, 5);
        assert!(config.detectors.face.enabled);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = Config::default();
        config.policy.popup_limit = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
