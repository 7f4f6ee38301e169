//! Full-screen capture.
//!
//! Windows and macOS read the primary display through `screenshots`. Other
//! Unix desktops, and macOS when native capture is refused, fall back to
//! screenshot programs that write a PNG file: `screencapture` on macOS and
//! `grim`, `import` or `scrot` elsewhere.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use tracing::debug;

use super::CapabilityError;
use super::commands::Invocation;

const CAPTURE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::capture");

static CAPTURE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Captures the primary screen, trying the native backend first where one
/// exists.
pub(super) fn capture_screen() -> Result<RgbaImage, CapabilityError> {
    #[cfg(any(windows, target_os = "macos"))]
    {
        match native::capture_primary() {
            Ok(frame) => return Ok(frame),
            Err(error) if cfg!(windows) => return Err(error),
            Err(error) => {
                debug!(
                    target: CAPTURE_TARGET,
                    error = %error,
                    "native capture failed; trying screencapture"
                );
            }
        }
    }
    capture_with_programs(env::consts::OS)
}

#[cfg(any(windows, target_os = "macos"))]
mod native {
    use image::RgbaImage;
    use screenshots::Screen;

    use super::CapabilityError;

    pub(super) fn capture_primary() -> Result<RgbaImage, CapabilityError> {
        let screens = Screen::all().map_err(|error| {
            CapabilityError::Capture(format!("screen enumeration failed: {error}"))
        })?;
        let screen = screens
            .iter()
            .find(|screen| screen.display_info.is_primary)
            .or_else(|| screens.first())
            .ok_or_else(|| {
                CapabilityError::Capture("no displays were reported by the OS".to_string())
            })?;

        let captured = screen
            .capture()
            .map_err(|error| CapabilityError::Capture(error.to_string()))?;
        let (width, height) = (captured.width(), captured.height());
        RgbaImage::from_raw(width, height, captured.into_raw()).ok_or_else(|| {
            CapabilityError::Capture(format!("frame buffer does not match {width}x{height}"))
        })
    }
}

fn capture_path() -> PathBuf {
    let sequence = CAPTURE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!(
        "deskremote-capture-{}-{sequence}.png",
        std::process::id()
    ))
}

/// Screenshot programs for `platform`, in the order they are tried. Each one
/// writes a PNG to `path`.
fn capture_programs(platform: &str, path: &Path) -> Vec<Invocation> {
    let path: OsString = path.as_os_str().to_owned();
    match platform {
        "windows" => Vec::new(),
        "macos" => vec![Invocation::new(
            "screencapture",
            ["-x".into(), "-t".into(), "png".into(), path],
        )],
        _ => vec![
            Invocation::new("grim", ["-t".into(), "png".into(), path.clone()]),
            Invocation::new("import", ["-window".into(), "root".into(), path.clone()]),
            Invocation::new("scrot", ["--overwrite".into(), path]),
        ],
    }
}

fn capture_with_programs(platform: &'static str) -> Result<RgbaImage, CapabilityError> {
    let path = capture_path();
    let candidates = capture_programs(platform, &path);
    if candidates.is_empty() {
        return Err(CapabilityError::Unsupported {
            action: "screen capture",
            platform,
        });
    }

    let mut last_error = None;
    for invocation in &candidates {
        let result = invocation.run().and_then(|()| {
            fs::read(&path).map_err(|error| CapabilityError::Capture(error.to_string()))
        });
        let _ = fs::remove_file(&path);
        match result {
            Ok(bytes) => return decode_png(&bytes),
            Err(error) => {
                debug!(
                    target: CAPTURE_TARGET,
                    program = invocation.program(),
                    error = %error,
                    "capture program failed"
                );
                last_error = Some(error);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| CapabilityError::Exhausted {
        action: "screen capture".to_string(),
    }))
}

fn decode_png(bytes: &[u8]) -> Result<RgbaImage, CapabilityError> {
    image::load_from_memory(bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|error| CapabilityError::Capture(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn programs(platform: &str) -> Vec<String> {
        capture_programs(platform, Path::new("/tmp/shot.png"))
            .iter()
            .map(|invocation| invocation.program().to_string())
            .collect()
    }

    #[test]
    fn linux_tries_wayland_before_x11_tools() {
        assert_eq!(programs("linux"), ["grim", "import", "scrot"]);
        assert_eq!(programs("freebsd"), ["grim", "import", "scrot"]);
    }

    #[test]
    fn macos_falls_back_to_screencapture() {
        assert_eq!(programs("macos"), ["screencapture"]);
    }

    #[test]
    fn windows_has_no_program_fallback() {
        assert!(matches!(
            capture_with_programs("windows"),
            Err(CapabilityError::Unsupported {
                action: "screen capture",
                platform: "windows"
            })
        ));
    }

    #[test]
    fn capture_paths_are_unique() {
        assert_ne!(capture_path(), capture_path());
    }

    #[test]
    fn png_output_decodes_to_rgba() {
        let mut source = RgbaImage::new(3, 2);
        source.put_pixel(2, 1, Rgba([9, 8, 7, 255]));
        let mut png = Vec::new();
        source
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .expect("encode png");

        let decoded = decode_png(&png).expect("decode");
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1), &Rgba([9, 8, 7, 255]));
        assert!(matches!(decode_png(b"not a png"), Err(CapabilityError::Capture(_))));
    }
}
