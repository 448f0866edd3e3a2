//! Configuration system for rootless-wm
//!
//! Loads configuration from TOML file at `~/.config/rootless-wm/config.toml`
//! Auto-generates default config file on first run if missing. Every section
//! falls back to its defaults, so partial files are fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub focus: FocusConfig,
    pub windows: WindowsConfig,
    pub decorations: DecorationConfig,
    pub dock: DockConfig,
    pub selection: SelectionConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load an explicit configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("rootless-wm");

        Ok(config_dir.join("config.toml"))
    }

    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Focus policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Entering a frame focuses it
    pub follows_mouse: bool,
    /// A click that focuses a window is also delivered to it
    pub click_through: bool,
    pub focus_on_new_window: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            follows_mouse: false,
            click_through: false,
            focus_on_new_window: true,
        }
    }
}

/// Window behavior and size policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowsConfig {
    /// Double-clicking a titlebar shades instead of collapsing
    pub shading: bool,
    /// Clamp user-driven resizes to the window's head
    pub limit_size: bool,
    pub default_min_width: i32,
    pub default_min_height: i32,
    pub default_max_width: i32,
    pub default_max_height: i32,
    pub double_click_ms: u32,
    /// Pixels the pointer must travel before a titlebar press becomes a move
    pub drag_threshold: i32,
    /// Titlebar width that must stay on some head
    pub min_visible_titlebar: i32,
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            shading: true,
            limit_size: true,
            default_min_width: 1,
            default_min_height: 1,
            default_max_width: 32767,
            default_max_height: 32767,
            double_click_ms: 400,
            drag_threshold: 3,
            min_visible_titlebar: 40,
        }
    }
}

/// Metrics for one decoration class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorMetrics {
    pub titlebar_height: i32,
    pub button_size: i32,
    pub button_spacing: i32,
    pub button_inset: i32,
}

/// Window decoration geometry and colors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorationConfig {
    pub large: DecorMetrics,
    pub small: DecorMetrics,
    pub growbox_size: i32,
    /// Titlebar color of the active window (hex: 0xRRGGBB)
    pub active_color: u32,
    pub inactive_color: u32,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            large: DecorMetrics {
                titlebar_height: 22,
                button_size: 14,
                button_spacing: 7,
                button_inset: 8,
            },
            small: DecorMetrics {
                titlebar_height: 16,
                button_size: 10,
                button_spacing: 5,
                button_inset: 6,
            },
            growbox_size: 15,
            active_color: 0xe8e8e8,
            inactive_color: 0xf6f6f6,
        }
    }
}

/// Host dock connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockConfig {
    pub enabled: bool,
    /// Defaults to the runtime directory socket
    pub socket_path: Option<PathBuf>,
}

impl Default for DockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: None,
        }
    }
}

/// Clipboard proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub enabled: bool,
    /// An unanswered conversion older than this (server time) is abandoned
    pub stale_after_ms: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_ms: 2000,
        }
    }
}

/// Session lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Exit once no managed windows remain
    pub auto_quit: bool,
    pub auto_quit_timeout_secs: u64,
}

impl SessionConfig {
    pub fn auto_quit_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_quit_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_quit: false,
            auto_quit_timeout_secs: 3,
        }
    }
}
