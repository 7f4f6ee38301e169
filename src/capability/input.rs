//! Pointer and keyboard injection.
//!
//! Windows and macOS inject events natively through `enigo`. Other Unix
//! desktops drive `xdotool`, which works under X11 and XWayland without
//! linking any system library into the server.

use super::keys::NamedKey;

#[cfg(any(windows, target_os = "macos"))]
pub(super) use self::native::{click, hotkey, move_cursor, press_key, scroll, type_text};
#[cfg(not(any(windows, target_os = "macos")))]
pub(super) use self::xdotool::{click, hotkey, move_cursor, press_key, scroll, type_text};

fn parse_keys(keys: &[String]) -> Vec<NamedKey> {
    keys.iter().map(|key| NamedKey::parse(key)).collect()
}

#[cfg(any(windows, target_os = "macos"))]
mod native {
    use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

    use super::super::{CapabilityError, MouseButton};
    use super::{NamedKey, parse_keys};

    fn session() -> Result<Enigo, CapabilityError> {
        Enigo::new(&Settings::default())
            .map_err(|error| CapabilityError::Input(error.to_string()))
    }

    fn input_error(error: enigo::InputError) -> CapabilityError {
        CapabilityError::Input(error.to_string())
    }

    fn button(button: MouseButton) -> Button {
        match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }

    fn key_code(key: &NamedKey) -> Result<Key, CapabilityError> {
        let code = match key {
            NamedKey::Enter => Key::Return,
            NamedKey::Escape => Key::Escape,
            NamedKey::Backspace => Key::Backspace,
            NamedKey::Tab => Key::Tab,
            NamedKey::Space => Key::Space,
            NamedKey::Delete => Key::Delete,
            NamedKey::Up => Key::UpArrow,
            NamedKey::Down => Key::DownArrow,
            NamedKey::Left => Key::LeftArrow,
            NamedKey::Right => Key::RightArrow,
            NamedKey::Home => Key::Home,
            NamedKey::End => Key::End,
            NamedKey::PageUp => Key::PageUp,
            NamedKey::PageDown => Key::PageDown,
            NamedKey::Control => Key::Control,
            NamedKey::Alt => Key::Alt,
            NamedKey::Shift => Key::Shift,
            NamedKey::Super => Key::Meta,
            NamedKey::CapsLock => Key::CapsLock,
            NamedKey::Function(number) => function_key(*number)?,
            #[cfg(windows)]
            NamedKey::VolumeUp => Key::VolumeUp,
            #[cfg(windows)]
            NamedKey::VolumeDown => Key::VolumeDown,
            #[cfg(windows)]
            NamedKey::VolumeMute => Key::VolumeMute,
            #[cfg(windows)]
            NamedKey::PlayPause => Key::MediaPlayPause,
            #[cfg(windows)]
            NamedKey::NextTrack => Key::MediaNextTrack,
            #[cfg(windows)]
            NamedKey::PrevTrack => Key::MediaPrevTrack,
            #[cfg(not(windows))]
            NamedKey::VolumeUp
            | NamedKey::VolumeDown
            | NamedKey::VolumeMute
            | NamedKey::PlayPause
            | NamedKey::NextTrack
            | NamedKey::PrevTrack => {
                return Err(CapabilityError::Unsupported {
                    action: "media keys",
                    platform: std::env::consts::OS,
                });
            }
            NamedKey::Char(character) => Key::Unicode(*character),
            NamedKey::Other(name) => {
                return Err(CapabilityError::InvalidInput(format!("unknown key: {name}")));
            }
        };
        Ok(code)
    }

    fn function_key(number: u8) -> Result<Key, CapabilityError> {
        let key = match number {
            1 => Key::F1,
            2 => Key::F2,
            3 => Key::F3,
            4 => Key::F4,
            5 => Key::F5,
            6 => Key::F6,
            7 => Key::F7,
            8 => Key::F8,
            9 => Key::F9,
            10 => Key::F10,
            11 => Key::F11,
            12 => Key::F12,
            other => {
                return Err(CapabilityError::InvalidInput(format!("unknown key: F{other}")));
            }
        };
        Ok(key)
    }

    pub(crate) fn move_cursor(x: i32, y: i32) -> Result<(), CapabilityError> {
        session()?
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(input_error)
    }

    pub(crate) fn click(
        pressed: MouseButton,
        clicks: u32,
        position: Option<(i32, i32)>,
    ) -> Result<(), CapabilityError> {
        let mut enigo = session()?;
        if let Some((x, y)) = position {
            enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_error)?;
        }
        for _ in 0..clicks.max(1) {
            enigo
                .button(button(pressed), Direction::Click)
                .map_err(input_error)?;
        }
        Ok(())
    }

    pub(crate) fn scroll(clicks: i32) -> Result<(), CapabilityError> {
        if clicks == 0 {
            return Ok(());
        }
        // enigo scrolls down for positive lengths.
        session()?
            .scroll(clicks.saturating_neg(), Axis::Vertical)
            .map_err(input_error)
    }

    pub(crate) fn type_text(text: &str) -> Result<(), CapabilityError> {
        if text.is_empty() {
            return Ok(());
        }
        session()?.text(text).map_err(input_error)
    }

    pub(crate) fn press_key(key: &str) -> Result<(), CapabilityError> {
        let code = key_code(&NamedKey::parse(key))?;
        session()?.key(code, Direction::Click).map_err(input_error)
    }

    pub(crate) fn hotkey(keys: &[String]) -> Result<(), CapabilityError> {
        if keys.is_empty() {
            return Err(CapabilityError::InvalidInput("no keys given".to_string()));
        }
        let codes = parse_keys(keys)
            .iter()
            .map(key_code)
            .collect::<Result<Vec<_>, _>>()?;

        let mut enigo = session()?;
        let mut held = Vec::with_capacity(codes.len());
        let mut pressed = Ok(());
        for code in codes {
            pressed = enigo.key(code, Direction::Press).map_err(input_error);
            if pressed.is_err() {
                break;
            }
            held.push(code);
        }
        // Release whatever went down, even after a failed press.
        for code in held.into_iter().rev() {
            enigo.key(code, Direction::Release).map_err(input_error)?;
        }
        pressed
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
mod xdotool {
    use super::super::commands::Invocation;
    use super::super::{CapabilityError, MouseButton};
    use super::{NamedKey, parse_keys};

    const XDOTOOL: &str = "xdotool";

    fn click_invocation(
        button: MouseButton,
        clicks: u32,
        position: Option<(i32, i32)>,
    ) -> Invocation {
        let mut args = Vec::new();
        if let Some((x, y)) = position {
            args.extend(["mousemove".to_string(), x.to_string(), y.to_string()]);
        }
        args.extend([
            "click".to_string(),
            "--repeat".to_string(),
            clicks.max(1).to_string(),
            button.x11_index().to_string(),
        ]);
        Invocation::new(XDOTOOL, args)
    }

    fn scroll_invocation(clicks: i32) -> Invocation {
        // Buttons 4 and 5 are wheel up and wheel down.
        let button = if clicks > 0 { "4" } else { "5" };
        Invocation::new(
            XDOTOOL,
            [
                "click".to_string(),
                "--repeat".to_string(),
                clicks.unsigned_abs().to_string(),
                button.to_string(),
            ],
        )
    }

    fn hotkey_invocation(keys: &[String]) -> Invocation {
        let combo = parse_keys(keys)
            .iter()
            .map(NamedKey::x11_keysym)
            .collect::<Vec<_>>()
            .join("+");
        Invocation::new(XDOTOOL, ["key".to_string(), combo])
    }

    pub(crate) fn move_cursor(x: i32, y: i32) -> Result<(), CapabilityError> {
        Invocation::new(XDOTOOL, ["mousemove".to_string(), x.to_string(), y.to_string()]).run()
    }

    pub(crate) fn click(
        button: MouseButton,
        clicks: u32,
        position: Option<(i32, i32)>,
    ) -> Result<(), CapabilityError> {
        click_invocation(button, clicks, position).run()
    }

    pub(crate) fn scroll(clicks: i32) -> Result<(), CapabilityError> {
        if clicks == 0 {
            return Ok(());
        }
        scroll_invocation(clicks).run()
    }

    pub(crate) fn type_text(text: &str) -> Result<(), CapabilityError> {
        if text.is_empty() {
            return Ok(());
        }
        Invocation::new(XDOTOOL, ["type", "--", text]).run()
    }

    pub(crate) fn press_key(key: &str) -> Result<(), CapabilityError> {
        let keysym = NamedKey::parse(key).x11_keysym();
        Invocation::new(XDOTOOL, ["key".to_string(), keysym]).run()
    }

    pub(crate) fn hotkey(keys: &[String]) -> Result<(), CapabilityError> {
        if keys.is_empty() {
            return Err(CapabilityError::InvalidInput("no keys given".to_string()));
        }
        hotkey_invocation(keys).run()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn args(invocation: &Invocation) -> Vec<String> {
            invocation
                .args()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect()
        }

        #[test]
        fn click_at_position_moves_first() {
            let invocation = click_invocation(MouseButton::Right, 2, Some((5, -7)));
            assert_eq!(invocation.program(), "xdotool");
            assert_eq!(
                args(&invocation),
                ["mousemove", "5", "-7", "click", "--repeat", "2", "3"]
            );
        }

        #[test]
        fn scroll_direction_picks_wheel_button() {
            assert_eq!(args(&scroll_invocation(3)), ["click", "--repeat", "3", "4"]);
            assert_eq!(args(&scroll_invocation(-2)), ["click", "--repeat", "2", "5"]);
        }

        #[test]
        fn hotkey_joins_keysyms() {
            let keys = ["ctrl".to_string(), "Shift".to_string(), "esc".to_string()];
            assert_eq!(args(&hotkey_invocation(&keys)), ["key", "ctrl+shift+Escape"]);
        }

        #[test]
        fn empty_hotkey_is_rejected_before_spawning() {
            assert!(matches!(hotkey(&[]), Err(CapabilityError::InvalidInput(_))));
        }
    }
}
