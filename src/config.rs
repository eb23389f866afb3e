//! Configuration types.
//!
//! Loads settings from config.json at startup. Provides the capture window,
//! offsets and border thresholds, key mapping, hotkeys, and polling settings.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::capture::region::OffsetSpec;
use crate::controller::hotkey::HotkeyTable;
use crate::controller::keys::parse_key;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Target size of the captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

/// Screen capture settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Game window title (exact match after trimming whitespace)
    pub window_title: String,
    /// Insets from the window's outer rectangle
    pub offsets: OffsetSpec,
    /// Resize frames to this size; `None` keeps the captured size
    pub output_size: Option<OutputSize>,
    /// Convert frames to single-channel luminance
    pub grayscale: bool,
    /// Pixels with luminance below this are dark
    pub black_threshold: u8,
    /// Rows with at least this fraction of dark pixels are border (0.0-1.0)
    pub black_percentage: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_title: String::new(),
            offsets: OffsetSpec::default(),
            output_size: None,
            grayscale: false,
            black_threshold: 30,
            black_percentage: 0.9,
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        if self.window_title.trim().is_empty() {
            return Err(anyhow!("screen_capture.window_title must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.black_percentage) {
            return Err(anyhow!(
                "screen_capture.black_percentage must be within 0.0-1.0, got {}",
                self.black_percentage
            ));
        }
        if let Some(size) = self.output_size {
            if size.width == 0 || size.height == 0 {
                return Err(anyhow!(
                    "screen_capture.output_size must be non-zero, got {}x{}",
                    size.width,
                    size.height
                ));
            }
        }
        Ok(())
    }
}

/// Action dispatch settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Minimum time between two accepted actions (milliseconds)
    pub action_cooldown_ms: u64,
    /// Actions whose key is released immediately after pressing
    pub tap_actions: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            action_cooldown_ms: 100,
            tap_actions: vec!["dodge".to_string()],
        }
    }
}

impl ControllerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.action_cooldown_ms)
    }
}

/// Background polling loop settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Start the polling loop with `run` even without `--poll`
    pub enabled: bool,
    /// Delay between iterations (milliseconds)
    pub interval_ms: u64,
    /// How long shutdown waits for the worker (milliseconds)
    pub shutdown_grace_ms: u64,
    /// Action dispatched after every successful capture
    pub action: String,
    /// Save every polled frame to the screenshots directory
    pub save_frames: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 200,
            shutdown_grace_ms: 1000,
            action: "dodge".to_string(),
            save_frames: false,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Saved frame naming.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File name prefix: `<prefix>_<YYYYMMDD-HHMMSS>.<format>`
    pub prefix: String,
    /// Image format extension (png, jpg, bmp)
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: "game_screenshot".to_string(),
            format: "png".to_string(),
        }
    }
}

fn default_key_mapping() -> BTreeMap<String, String> {
    BTreeMap::from([("dodge".to_string(), "space".to_string())])
}

fn default_hotkeys() -> BTreeMap<String, String> {
    [
        ("ctrl+shift+s", "capture"),
        ("ctrl+shift+f9", "start"),
        ("ctrl+shift+f10", "stop"),
        ("ctrl+shift+d", "dodge"),
        ("ctrl+shift+q", "quit"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Complete application configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub screen_capture: CaptureConfig,
    /// Action name → key name
    pub key_mapping: BTreeMap<String, String>,
    pub controller: ControllerConfig,
    /// Hotkey string → action tag
    pub hotkeys: BTreeMap<String, String>,
    pub polling: PollingConfig,
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            screen_capture: CaptureConfig::default(),
            key_mapping: default_key_mapping(),
            controller: ControllerConfig::default(),
            hotkeys: default_hotkeys(),
            polling: PollingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks value ranges, key names, and hotkey syntax.
    pub fn validate(&self) -> Result<()> {
        self.screen_capture.validate()?;

        for (action, key) in &self.key_mapping {
            if parse_key(key).is_none() {
                return Err(anyhow!("key_mapping.{}: unknown key '{}'", action, key));
            }
        }

        HotkeyTable::from_config(&self.hotkeys).context("Invalid hotkeys")?;
        Ok(())
    }
}

/// Reads, parses, and validates a config file.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: AppConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config.screen_capture.window_title = config.screen_capture.window_title.trim().to_string();
    config.validate()?;
    Ok(config)
}

/// Loads configuration from `path` or returns defaults.
fn load_config(path: &Path) -> AppConfig {
    crate::log(&format!("Looking for config at: {}", path.display()));

    if !path.exists() {
        crate::log("config.json not found. Using default config.");
        return AppConfig::default();
    }

    match load_config_from(path) {
        Ok(config) => {
            crate::log("Config loaded from config.json");
            config
        }
        Err(e) => {
            crate::log(&format!("{:#}. Using defaults.", e));
            AppConfig::default()
        }
    }
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config(path: &Path) {
    let _ = CONFIG.set(load_config(path));
}

/// Loads `path` strictly and installs it as the global configuration.
/// Fails instead of falling back to defaults.
pub fn init_config_from(path: &Path) -> Result<()> {
    let config = load_config_from(path)?;
    crate::log(&format!("Config loaded from {}", path.display()));
    let _ = CONFIG.set(config);
    Ok(())
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}
