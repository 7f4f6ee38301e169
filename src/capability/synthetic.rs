//! Deterministic capability provider for tests and dry runs.

use std::path::Path;
use std::sync::Mutex;

use image::{Rgba, RgbaImage};

use super::{
    AppEntry, AppKind, Battery, CapabilityError, Capabilities, MouseButton, PowerAction,
    SystemInfo,
};

/// One action observed by [`SyntheticCapabilities`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticCall {
    MoveCursor { x: i32, y: i32 },
    Click {
        button: MouseButton,
        clicks: u32,
        position: Option<(i32, i32)>,
    },
    Scroll { clicks: i32 },
    TypeText(String),
    PressKey(String),
    Hotkey(Vec<String>),
    Launch(String),
    OpenPath(String),
    Power(PowerAction),
    Capture,
}

/// Records every call and renders a gradient instead of the real screen.
///
/// Power actions can be configured to behave as if no platform utility were
/// installed, which mirrors a desktop without any lock program.
#[derive(Debug)]
pub struct SyntheticCapabilities {
    width: u32,
    height: u32,
    calls: Mutex<Vec<SyntheticCall>>,
    power_exhausted: bool,
}

impl SyntheticCapabilities {
    /// Creates a provider with a 320x200 virtual screen.
    pub fn new() -> Self {
        Self::with_screen(320, 200)
    }

    pub fn with_screen(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            calls: Mutex::new(Vec::new()),
            power_exhausted: false,
        }
    }

    /// Makes every power action fail as if all fallback programs were missing.
    pub fn with_power_exhausted(mut self) -> Self {
        self.power_exhausted = true;
        self
    }

    /// Returns the recorded calls in order.
    pub fn calls(&self) -> Vec<SyntheticCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: SyntheticCall) -> Result<(), CapabilityError> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| CapabilityError::InvalidInput("synthetic call log poisoned".into()))?;
        calls.push(call);
        Ok(())
    }
}

impl Default for SyntheticCapabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl Capabilities for SyntheticCapabilities {
    fn move_cursor(&self, x: i32, y: i32) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::MoveCursor { x, y })
    }

    fn click(
        &self,
        button: MouseButton,
        clicks: u32,
        position: Option<(i32, i32)>,
    ) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::Click {
            button,
            clicks,
            position,
        })
    }

    fn scroll(&self, clicks: i32) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::Scroll { clicks })
    }

    fn type_text(&self, text: &str) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::TypeText(text.to_string()))
    }

    fn press_key(&self, key: &str) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::PressKey(key.to_string()))
    }

    fn hotkey(&self, keys: &[String]) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::Hotkey(keys.to_vec()))
    }

    fn list_apps(&self) -> Result<Vec<AppEntry>, CapabilityError> {
        Ok(vec![AppEntry {
            name: "Synthetic Terminal".to_string(),
            path: "synthetic-terminal".to_string(),
            kind: AppKind::System,
        }])
    }

    fn launch(&self, path: &str) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::Launch(path.to_string()))
    }

    fn open_path(&self, path: &Path) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::OpenPath(path.display().to_string()))
    }

    fn power_action(&self, action: PowerAction) -> Result<(), CapabilityError> {
        self.record(SyntheticCall::Power(action))?;
        if self.power_exhausted {
            return Err(CapabilityError::Exhausted {
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn capture_screen(&self) -> Result<RgbaImage, CapabilityError> {
        self.record(SyntheticCall::Capture)?;
        let (width, height) = (self.width, self.height);
        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let red = (x * 255 / width) as u8;
            let green = (y * 255 / height) as u8;
            Rgba([red, green, 128, 255])
        }))
    }

    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            hostname: "synthetic-host".to_string(),
            platform: "Synthetic".to_string(),
            platform_release: "1.0".to_string(),
            platform_version: "1.0".to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            processor: "virtual".to_string(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            battery: Battery::UNAVAILABLE,
            error: None,
        }
    }
}
