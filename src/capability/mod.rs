//! Host automation behind a narrow, fallible interface.
//!
//! The server never talks to the operating system directly. Every action that
//! touches the desktop (pointer and keyboard injection, screen capture,
//! application discovery, power actions) goes through [`Capabilities`], so the
//! protocol core can be exercised against [`SyntheticCapabilities`] and the
//! real host backend stays an interchangeable collaborator.

mod apps;
mod capture;
mod commands;
mod host_info;
mod input;
mod keys;
mod synthetic;
mod system;

use std::fmt;
use std::path::Path;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::commands::{Invocation, run_first_available};
pub use self::synthetic::{SyntheticCall, SyntheticCapabilities};
pub use self::system::SystemCapabilities;

/// Upper bound on the number of applications reported by `get_apps`.
pub const MAX_APPS: usize = 100;

/// Errors raised by a capability provider.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The action has no implementation on this platform.
    #[error("{action} is not supported on {platform}")]
    Unsupported {
        action: &'static str,
        platform: &'static str,
    },
    /// An external program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// An external program ran but reported failure.
    #[error("{program} exited with {status}")]
    Failed { program: String, status: String },
    /// Every program in an ordered fallback list failed or was missing.
    #[error("none of the candidate commands for {action} could be run")]
    Exhausted { action: String },
    /// A native input backend refused or failed to inject an event.
    #[error("input injection failed: {0}")]
    Input(String),
    /// Screen capture produced no usable image.
    #[error("screen capture failed: {0}")]
    Capture(String),
    /// Invalid input for the requested action.
    #[error("{0}")]
    InvalidInput(String),
}

/// Mouse buttons accepted by click commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// X11 button number used by `xdotool`.
    pub fn x11_index(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Middle => 2,
            Self::Right => 3,
        }
    }
}

/// Power and session actions exposed through `system_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Shutdown,
    Restart,
    Lock,
    Sleep,
    TaskManager,
}

impl PowerAction {
    /// Parses a wire action name. Unknown names yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "shutdown" => Some(Self::Shutdown),
            "restart" => Some(Self::Restart),
            "lock" => Some(Self::Lock),
            "sleep" => Some(Self::Sleep),
            "taskmanager" => Some(Self::TaskManager),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Restart => "restart",
            Self::Lock => "lock",
            Self::Sleep => "sleep",
            Self::TaskManager => "taskmanager",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One launchable application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: AppKind,
}

/// Where an [`AppEntry`] was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    Installed,
    System,
    Application,
}

/// Battery charge, or `"N/A"` when the host has no battery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Battery {
    Percent(f32),
    Unavailable(&'static str),
}

impl Battery {
    pub const UNAVAILABLE: Self = Self::Unavailable("N/A");
}

/// Point-in-time host description returned by `system_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub platform: String,
    pub platform_release: String,
    pub platform_version: String,
    pub architecture: String,
    pub processor: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub battery: Battery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// OS-level actions consumed by the dispatcher.
///
/// Implementations must be safe to call from several connections at once and
/// may block; callers run them on the blocking thread pool.
pub trait Capabilities: Send + Sync + 'static {
    /// Moves the pointer to absolute screen coordinates.
    fn move_cursor(&self, x: i32, y: i32) -> Result<(), CapabilityError>;

    /// Clicks `clicks` times, first moving to `position` when given.
    fn click(
        &self,
        button: MouseButton,
        clicks: u32,
        position: Option<(i32, i32)>,
    ) -> Result<(), CapabilityError>;

    /// Scrolls the wheel; positive values scroll up.
    fn scroll(&self, clicks: i32) -> Result<(), CapabilityError>;

    fn type_text(&self, text: &str) -> Result<(), CapabilityError>;

    /// Presses and releases one named key (`enter`, `volumeup`, `a`, ...).
    fn press_key(&self, key: &str) -> Result<(), CapabilityError>;

    /// Presses the keys in order and releases them in reverse.
    fn hotkey(&self, keys: &[String]) -> Result<(), CapabilityError>;

    /// Known applications, at most [`MAX_APPS`].
    fn list_apps(&self) -> Result<Vec<AppEntry>, CapabilityError>;

    fn launch(&self, path: &str) -> Result<(), CapabilityError>;

    /// Opens a file with the desktop's default handler.
    fn open_path(&self, path: &Path) -> Result<(), CapabilityError>;

    fn power_action(&self, action: PowerAction) -> Result<(), CapabilityError>;

    /// Captures the full primary screen.
    fn capture_screen(&self) -> Result<RgbaImage, CapabilityError>;

    /// Never fails; collection problems are reported in [`SystemInfo::error`].
    fn system_info(&self) -> SystemInfo;
}
