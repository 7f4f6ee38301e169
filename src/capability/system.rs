//! Capability provider that drives the real host.
//!
//! Input and capture go through [`input`](super::input) and
//! [`capture`](super::capture), which pick a native backend on Windows and
//! macOS. Power, launch and open actions start the platform's own utilities.

use std::env;
use std::path::Path;

use image::RgbaImage;

use super::commands::{Invocation, run_first_available};
use super::{AppEntry, CapabilityError, Capabilities, MouseButton, PowerAction, SystemInfo};
use super::{apps, capture, host_info, input};

/// Host backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCapabilities;

impl SystemCapabilities {
    pub fn new() -> Self {
        Self
    }

    fn platform() -> &'static str {
        env::consts::OS
    }
}

fn power_candidates(platform: &str, action: PowerAction) -> Vec<Invocation> {
    let one = |program: &str, args: &[&str]| vec![Invocation::new(program, args.iter().copied())];
    match (platform, action) {
        ("windows", PowerAction::Shutdown) => one("shutdown", &["/s", "/t", "5"]),
        ("windows", PowerAction::Restart) => one("shutdown", &["/r", "/t", "5"]),
        ("windows", PowerAction::Lock) => one("rundll32.exe", &["user32.dll,LockWorkStation"]),
        ("windows", PowerAction::Sleep) => {
            one("rundll32.exe", &["powrprof.dll,SetSuspendState", "0,1,0"])
        }
        ("windows", PowerAction::TaskManager) => one("taskmgr.exe", &[]),
        ("macos", PowerAction::Shutdown) => one("sudo", &["shutdown", "-h", "+1"]),
        ("macos", PowerAction::Restart) => one("sudo", &["shutdown", "-r", "+1"]),
        ("macos", PowerAction::Lock) => one(
            "/System/Library/CoreServices/Menu Extras/User.menu/Contents/Resources/CGSession",
            &["-suspend"],
        ),
        ("macos", PowerAction::Sleep) => one("pmset", &["sleepnow"]),
        ("macos", PowerAction::TaskManager) => one("open", &["-a", "Activity Monitor"]),
        (_, PowerAction::Shutdown) => one("shutdown", &["-h", "+1"]),
        (_, PowerAction::Restart) => one("shutdown", &["-r", "+1"]),
        (_, PowerAction::Sleep) => one("systemctl", &["suspend"]),
        (_, PowerAction::Lock) => vec![
            Invocation::new("gnome-screensaver-command", ["--lock"]),
            Invocation::new("xdg-screensaver", ["lock"]),
            Invocation::new("loginctl", ["lock-session"]),
            Invocation::new("dm-tool", ["lock"]),
        ],
        (_, PowerAction::TaskManager) => [
            "gnome-system-monitor",
            "ksysguard",
            "mate-system-monitor",
            "xfce4-taskmanager",
            "htop",
        ]
        .into_iter()
        .map(|program| Invocation::new(program, Vec::<String>::new()))
        .collect(),
    }
}

impl Capabilities for SystemCapabilities {
    fn move_cursor(&self, x: i32, y: i32) -> Result<(), CapabilityError> {
        input::move_cursor(x, y)
    }

    fn click(
        &self,
        button: MouseButton,
        clicks: u32,
        position: Option<(i32, i32)>,
    ) -> Result<(), CapabilityError> {
        input::click(button, clicks, position)
    }

    fn scroll(&self, clicks: i32) -> Result<(), CapabilityError> {
        input::scroll(clicks)
    }

    fn type_text(&self, text: &str) -> Result<(), CapabilityError> {
        input::type_text(text)
    }

    fn press_key(&self, key: &str) -> Result<(), CapabilityError> {
        input::press_key(key)
    }

    fn hotkey(&self, keys: &[String]) -> Result<(), CapabilityError> {
        input::hotkey(keys)
    }

    fn list_apps(&self) -> Result<Vec<AppEntry>, CapabilityError> {
        Ok(apps::discover())
    }

    fn launch(&self, path: &str) -> Result<(), CapabilityError> {
        let invocation = match Self::platform() {
            "windows" => Invocation::new("cmd", ["/C", "start", "", path]),
            "macos" if path.ends_with(".app") => Invocation::new("open", [path]),
            "macos" => Invocation::new("open", ["-a", path]),
            _ => Invocation::new(path, Vec::<String>::new()),
        };
        invocation.spawn_detached()
    }

    fn open_path(&self, path: &Path) -> Result<(), CapabilityError> {
        let path = path.as_os_str().to_owned();
        let invocation = match Self::platform() {
            "windows" => Invocation::new("cmd", ["/C".into(), "start".into(), "".into(), path]),
            "macos" => Invocation::new("open", [path]),
            _ => Invocation::new("xdg-open", [path]),
        };
        invocation.spawn_detached()
    }

    fn power_action(&self, action: PowerAction) -> Result<(), CapabilityError> {
        let candidates = power_candidates(Self::platform(), action);
        run_first_available(action.as_str(), &candidates).map(|_| ())
    }

    fn capture_screen(&self) -> Result<RgbaImage, CapabilityError> {
        capture::capture_screen()
    }

    fn system_info(&self) -> SystemInfo {
        host_info::snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_lock_has_ordered_fallbacks() {
        let programs: Vec<String> = power_candidates("linux", PowerAction::Lock)
            .iter()
            .map(|invocation| invocation.program().to_string())
            .collect();
        assert_eq!(
            programs,
            [
                "gnome-screensaver-command",
                "xdg-screensaver",
                "loginctl",
                "dm-tool"
            ]
        );
    }

    #[test]
    fn windows_actions_have_single_command() {
        for action in [
            PowerAction::Shutdown,
            PowerAction::Restart,
            PowerAction::Lock,
            PowerAction::Sleep,
            PowerAction::TaskManager,
        ] {
            assert_eq!(power_candidates("windows", action).len(), 1, "{action}");
        }
    }
}
