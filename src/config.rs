//! Read-only gamepad configuration
//!
//! Loaded from TOML; every field has a default so a partial file (or no file
//! at all) yields a working overlay. The crate never writes configuration back.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Identifiers of the document-wide scroll lock
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScrollLockConfig {
    /// `id` of the injected style rule; injection is skipped when it exists
    pub style_id: String,
    /// Class toggled on `html` and `body`
    pub class_name: String,
}

impl Default for ScrollLockConfig {
    fn default() -> Self {
        Self {
            style_id: "mobile-gamepad-scroll-lock-style".to_string(),
            class_name: "mobile-gamepad-noscroll".to_string(),
        }
    }
}

impl ScrollLockConfig {
    /// CSS rule injected once per document
    pub fn rule(&self) -> String {
        format!(
            "html.{0}, body.{0} {{ overflow: hidden !important; }}",
            self.class_name
        )
    }
}

/// Colours used by the default renderer
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ThemeConfig {
    pub overlay_color: String,
    pub idle_color: String,
    pub pressed_color: String,
    pub close_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            overlay_color: "rgba(0, 0, 0, 0.7)".to_string(),
            idle_color: "rgba(200, 200, 200, 0.7)".to_string(),
            pressed_color: "rgba(150, 150, 150, 0.9)".to_string(),
            close_color: "rgba(255, 255, 255, 0.8)".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GamepadConfig {
    /// Interval between repeated key-down events while a control is held
    pub repeat_interval_ms: u64,
    pub scroll_lock: ScrollLockConfig,
    pub theme: ThemeConfig,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            repeat_interval_ms: 50,
            scroll_lock: ScrollLockConfig::default(),
            theme: ThemeConfig::default(),
        }
    }
}

impl GamepadConfig {
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "repeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.scroll_lock.style_id.is_empty() || self.scroll_lock.class_name.is_empty() {
            return Err(ConfigError::Invalid(
                "scroll lock identifiers must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: GamepadConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading gamepad configuration from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// `<config_dir>/virtual-gamepad/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("virtual-gamepad").join("config.toml"))
    }

    /// Loads the file at [`default_path`](Self::default_path), falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No configuration directory available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring configuration at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}
