//! Application discovery for the host backend.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::commands::Invocation;
use super::{AppEntry, AppKind, MAX_APPS};

const APPS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::capability::apps");

const COMMON_LINUX_APPS: &[&str] = &[
    "firefox",
    "chrome",
    "chromium",
    "nautilus",
    "dolphin",
    "konsole",
    "gnome-terminal",
    "kate",
    "gedit",
    "libreoffice",
    "vlc",
    "gimp",
    "inkscape",
    "thunderbird",
];

const COMMON_MAC_APPS: &[&str] = &[
    "Safari",
    "Mail",
    "Calendar",
    "Notes",
    "Reminders",
    "Photos",
    "Music",
    "Finder",
    "System Preferences",
];

const COMMON_WINDOWS_APPS: &[&str] = &[
    "notepad.exe",
    "calc.exe",
    "mspaint.exe",
    "wordpad.exe",
    "chrome.exe",
    "firefox.exe",
    "msedge.exe",
    "explorer.exe",
];

const UNINSTALL_KEYS: &[&str] = &[
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
];

/// Discovers applications for the running platform.
pub(super) fn discover() -> Vec<AppEntry> {
    let mut apps = match env::consts::OS {
        "windows" => windows_apps(),
        "macos" => mac_apps(Path::new("/Applications")),
        _ => linux_apps(),
    };
    apps.truncate(MAX_APPS);
    apps
}

fn linux_apps() -> Vec<AppEntry> {
    let mut apps: Vec<AppEntry> = COMMON_LINUX_APPS
        .iter()
        .filter(|name| find_in_path(name).is_some())
        .map(|name| AppEntry {
            name: title_case(name),
            path: (*name).to_string(),
            kind: AppKind::Application,
        })
        .collect();

    let mut desktop_dirs = vec![PathBuf::from("/usr/share/applications")];
    if let Some(data) = dirs::data_local_dir() {
        desktop_dirs.push(data.join("applications"));
    }
    collect_desktop_entries(&desktop_dirs, &mut apps);
    apps
}

/// Appends entries from `*.desktop` files, skipping names already present.
pub(super) fn collect_desktop_entries(dirs: &[PathBuf], apps: &mut Vec<AppEntry>) {
    for dir in dirs {
        let pattern = dir.join("*.desktop");
        let Some(pattern) = pattern.to_str() else {
            continue;
        };
        let Ok(paths) = glob::glob(pattern) else {
            continue;
        };
        for path in paths.filter_map(Result::ok) {
            let Ok(content) = fs::read_to_string(&path) else {
                debug!(target: APPS_TARGET, path = %path.display(), "unreadable desktop entry");
                continue;
            };
            let Some((name, exec)) = parse_desktop_entry(&content) else {
                continue;
            };
            if apps.iter().any(|app| app.name == name) {
                continue;
            }
            apps.push(AppEntry {
                name,
                path: exec,
                kind: AppKind::Application,
            });
        }
    }
}

/// Extracts `Name=` and the program of `Exec=` from a desktop entry.
pub(super) fn parse_desktop_entry(content: &str) -> Option<(String, String)> {
    let name = content
        .lines()
        .find_map(|line| line.strip_prefix("Name="))?
        .trim();
    let exec = content
        .lines()
        .find_map(|line| line.strip_prefix("Exec="))?
        .split_whitespace()
        .next()?;
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), exec.to_string()))
}

fn mac_apps(applications: &Path) -> Vec<AppEntry> {
    let mut apps = Vec::new();
    let pattern = applications.join("*.app");
    let paths = pattern.to_str().and_then(|pattern| glob::glob(pattern).ok());
    if let Some(paths) = paths {
        for path in paths.filter_map(Result::ok) {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                apps.push(AppEntry {
                    name: stem.to_string(),
                    path: stem.to_string(),
                    kind: AppKind::Application,
                });
            }
        }
    }
    for name in COMMON_MAC_APPS {
        if !apps.iter().any(|app| app.name == *name) {
            apps.push(AppEntry {
                name: (*name).to_string(),
                path: (*name).to_string(),
                kind: AppKind::System,
            });
        }
    }
    apps
}

fn windows_apps() -> Vec<AppEntry> {
    let mut apps = Vec::new();
    for key in UNINSTALL_KEYS {
        let query = Invocation::new("reg", ["query", key, "/s"]);
        match query.output() {
            Ok(stdout) => apps.extend(parse_uninstall_listing(&String::from_utf8_lossy(&stdout))),
            Err(error) => {
                debug!(target: APPS_TARGET, key, error = %error, "registry query failed");
            }
        }
    }
    for exe in COMMON_WINDOWS_APPS {
        apps.push(AppEntry {
            name: title_case(exe.trim_end_matches(".exe")),
            path: (*exe).to_string(),
            kind: AppKind::System,
        });
    }
    apps
}

/// Parses `reg query ... /s` output into installed applications.
///
/// Each registry key block needs both `DisplayName` and `DisplayIcon`; the
/// icon path doubles as the launch target once its `,index` suffix and quotes
/// are removed.
pub(super) fn parse_uninstall_listing(listing: &str) -> Vec<AppEntry> {
    let mut apps = Vec::new();
    let mut name: Option<String> = None;
    let mut icon: Option<String> = None;

    let mut flush = |name: &mut Option<String>, icon: &mut Option<String>| {
        if let (Some(name), Some(icon)) = (name.take(), icon.take()) {
            let path = icon.split(',').next().unwrap_or_default().trim_matches('"');
            if !name.is_empty() && !path.is_empty() {
                apps.push(AppEntry {
                    name,
                    path: path.to_string(),
                    kind: AppKind::Installed,
                });
            }
        }
        *name = None;
        *icon = None;
    };

    for line in listing.lines() {
        if line.starts_with("HKEY_") {
            flush(&mut name, &mut icon);
            continue;
        }
        let mut parts = line.trim().splitn(3, "    ");
        let (Some(field), Some(_kind), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        match field {
            "DisplayName" => name = Some(value.trim().to_string()),
            "DisplayIcon" => icon = Some(value.trim().to_string()),
            _ => {}
        }
    }
    flush(&mut name, &mut icon);
    apps
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn title_case(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_entry_takes_program_from_exec() {
        let entry = "[Desktop Entry]\nName=Text Editor\nExec=gedit %U\nType=Application\n";
        assert_eq!(
            parse_desktop_entry(entry),
            Some(("Text Editor".to_string(), "gedit".to_string()))
        );
    }

    #[test]
    fn desktop_entry_without_exec_is_ignored() {
        assert_eq!(parse_desktop_entry("Name=Broken\n"), None);
    }

    #[test]
    fn desktop_directory_scan_skips_duplicates() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("a.desktop"), "Name=Files\nExec=nautilus\n").expect("write");
        fs::write(dir.path().join("b.desktop"), "Name=Files\nExec=dolphin\n").expect("write");
        fs::write(dir.path().join("notes.txt"), "Name=Nope\nExec=nope\n").expect("write");

        let mut apps = Vec::new();
        collect_desktop_entries(&[dir.path().to_path_buf()], &mut apps);

        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "Files");
    }

    #[test]
    fn uninstall_listing_requires_name_and_icon() {
        let listing = "\
HKEY_LOCAL_MACHINE\\SOFTWARE\\Uninstall\\Editor
    DisplayName    REG_SZ    Editor Pro
    DisplayIcon    REG_SZ    \"C:\\Editor\\editor.exe\",0

HKEY_LOCAL_MACHINE\\SOFTWARE\\Uninstall\\NoIcon
    DisplayName    REG_SZ    Nameless
";
        let apps = parse_uninstall_listing(listing);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "Editor Pro");
        assert_eq!(apps[0].path, "C:\\Editor\\editor.exe");
        assert_eq!(apps[0].kind, AppKind::Installed);
    }

    #[test]
    fn mac_scan_adds_common_apps_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join("Safari.app")).expect("mkdir");
        let apps = mac_apps(dir.path());
        assert_eq!(apps.iter().filter(|app| app.name == "Safari").count(), 1);
        assert!(apps.iter().any(|app| app.name == "Finder" && app.kind == AppKind::System));
    }

    #[test]
    fn title_case_capitalises_each_word() {
        assert_eq!(title_case("gnome-terminal"), "Gnome-Terminal");
        assert_eq!(title_case("vlc"), "Vlc");
    }
}
