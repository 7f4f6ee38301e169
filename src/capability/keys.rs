//! Key names as clients send them (`enter`, `ctrl`, `volumeup`, `a`).

/// A key understood by the input backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NamedKey {
    Enter,
    Escape,
    Backspace,
    Tab,
    Space,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Control,
    Alt,
    Shift,
    Super,
    CapsLock,
    Function(u8),
    VolumeUp,
    VolumeDown,
    VolumeMute,
    PlayPause,
    NextTrack,
    PrevTrack,
    Char(char),
    /// Passed through untouched; the backend decides whether it exists.
    Other(String),
}

impl NamedKey {
    /// Parses a key name case-insensitively. Single characters keep their
    /// case so `A` still types a capital letter.
    pub(crate) fn parse(name: &str) -> Self {
        let mut chars = name.chars();
        if let (Some(single), None) = (chars.next(), chars.next()) {
            return match single {
                ' ' => Self::Space,
                '\t' => Self::Tab,
                '\n' => Self::Enter,
                other => Self::Char(other),
            };
        }
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "enter" | "return" => Self::Enter,
            "esc" | "escape" => Self::Escape,
            "backspace" => Self::Backspace,
            "tab" => Self::Tab,
            "space" => Self::Space,
            "delete" | "del" => Self::Delete,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" | "pgup" => Self::PageUp,
            "pagedown" | "pgdn" => Self::PageDown,
            "ctrl" | "control" | "ctrlleft" | "ctrlright" => Self::Control,
            "alt" | "altleft" | "altright" | "option" => Self::Alt,
            "shift" | "shiftleft" | "shiftright" => Self::Shift,
            "win" | "winleft" | "winright" | "super" | "cmd" | "command" => Self::Super,
            "capslock" => Self::CapsLock,
            "volumeup" => Self::VolumeUp,
            "volumedown" => Self::VolumeDown,
            "volumemute" => Self::VolumeMute,
            "playpause" => Self::PlayPause,
            "nexttrack" => Self::NextTrack,
            "prevtrack" => Self::PrevTrack,
            _ => match lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                Some(number @ 1..=12) => Self::Function(number),
                _ => Self::Other(name.to_string()),
            },
        }
    }

    /// X11 keysym name for `xdotool key`.
    #[cfg_attr(any(windows, target_os = "macos"), allow(dead_code))]
    pub(crate) fn x11_keysym(&self) -> String {
        let keysym = match self {
            Self::Enter => "Return",
            Self::Escape => "Escape",
            Self::Backspace => "BackSpace",
            Self::Tab => "Tab",
            Self::Space => "space",
            Self::Delete => "Delete",
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Home => "Home",
            Self::End => "End",
            Self::PageUp => "Prior",
            Self::PageDown => "Next",
            Self::Control => "ctrl",
            Self::Alt => "alt",
            Self::Shift => "shift",
            Self::Super => "super",
            Self::CapsLock => "Caps_Lock",
            Self::Function(number) => return format!("F{number}"),
            Self::VolumeUp => "XF86AudioRaiseVolume",
            Self::VolumeDown => "XF86AudioLowerVolume",
            Self::VolumeMute => "XF86AudioMute",
            Self::PlayPause => "XF86AudioPlay",
            Self::NextTrack => "XF86AudioNext",
            Self::PrevTrack => "XF86AudioPrev",
            Self::Char(character) => return character.to_string(),
            Self::Other(name) => return name.clone(),
        };
        keysym.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Enter", NamedKey::Enter)]
    #[case("ESC", NamedKey::Escape)]
    #[case("cmd", NamedKey::Super)]
    #[case("f5", NamedKey::Function(5))]
    #[case("F13", NamedKey::Other("F13".into()))]
    #[case("A", NamedKey::Char('A'))]
    #[case(" ", NamedKey::Space)]
    #[case("printscreen", NamedKey::Other("printscreen".into()))]
    fn parses_client_key_names(#[case] name: &str, #[case] expected: NamedKey) {
        assert_eq!(NamedKey::parse(name), expected);
    }

    #[test]
    fn keysyms_cover_media_keys() {
        assert_eq!(NamedKey::parse("volumeup").x11_keysym(), "XF86AudioRaiseVolume");
        assert_eq!(NamedKey::parse("Enter").x11_keysym(), "Return");
        assert_eq!(NamedKey::parse("pagedown").x11_keysym(), "Next");
        assert_eq!(NamedKey::parse("f11").x11_keysym(), "F11");
        assert_eq!(NamedKey::parse("a").x11_keysym(), "a");
    }
}
