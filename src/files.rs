//! Directory browsing and whole-file transfer.
//!
//! All operations are synchronous and expected to run on the blocking pool.
//! Entries that cannot be inspected are skipped rather than failing a whole
//! listing; only the requested path itself produces an error.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const FILES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::files");

/// Largest file `download` will read.
pub const MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;
/// Files at or above this size are left out of download listings.
pub const MAX_LISTED_FILE_BYTES: u64 = 100 * 1024 * 1024;
/// Maximum entries returned by `list_for_download`.
pub const MAX_LISTED_FILES: usize = 100;

/// File service failures. The display text is sent to clients verbatim.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Path does not exist")]
    PathNotFound,
    #[error("Path is not a directory")]
    NotADirectory,
    #[error("File not found")]
    FileNotFound,
    #[error("Path is not a file")]
    NotAFile,
    #[error("File too large (max 50MB)")]
    TooLarge { size: u64 },
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),
    #[error("Invalid base64 data: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl FileError {
    fn from_io(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied
        } else {
            Self::Io(error)
        }
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: String,
}

/// Listing of one directory, directories first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    pub path: String,
    pub parent: Option<String>,
    pub contents: Vec<DirectoryEntry>,
}

/// A file offered for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: String,
}

/// File contents ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedFile {
    pub filename: String,
    pub size: u64,
    pub data: String,
}

/// Where an upload landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub message: String,
    pub path: String,
    pub size: u64,
}

/// Filesystem operations rooted at configured directories.
#[derive(Debug, Clone)]
pub struct FileService {
    home: PathBuf,
    upload_dir: PathBuf,
    download_roots: Vec<PathBuf>,
}

impl FileService {
    pub fn new(home: PathBuf, upload_dir: PathBuf, download_roots: Vec<PathBuf>) -> Self {
        Self {
            home,
            upload_dir,
            download_roots,
        }
    }

    /// Lists `path`, or the home directory when no path is given.
    pub fn browse(&self, path: Option<&Path>) -> Result<DirectoryListing, FileError> {
        let path = path.unwrap_or(&self.home);
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(FileError::PathNotFound);
            }
            Err(error) => return Err(FileError::from_io(error)),
        };
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory);
        }

        let reader = fs::read_dir(path).map_err(FileError::from_io)?;
        let mut contents: Vec<DirectoryEntry> = reader
            .filter_map(Result::ok)
            .filter_map(|entry| {
                // Follows symlinks so a link to a directory browses like one.
                let entry_path = entry.path();
                let metadata = fs::metadata(&entry_path).ok()?;
                let is_dir = metadata.is_dir();
                Some(DirectoryEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry_path.display().to_string(),
                    is_dir,
                    size: if metadata.is_file() { metadata.len() } else { 0 },
                    modified: format_modified(&metadata),
                })
            })
            .collect();
        contents.sort_by_cached_key(|entry| (!entry.is_dir, entry.name.to_lowercase()));

        Ok(DirectoryListing {
            path: path.display().to_string(),
            parent: path.parent().map(|parent| parent.display().to_string()),
            contents,
        })
    }

    /// Files directly inside the download roots, in root order.
    pub fn list_for_download(&self) -> Vec<FileRecord> {
        let mut records = Vec::new();
        for root in &self.download_roots {
            if !root.is_dir() {
                continue;
            }
            let walker = WalkDir::new(root)
                .follow_links(true)
                .min_depth(1)
                .max_depth(1);
            for entry in walker.into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                if metadata.len() >= MAX_LISTED_FILE_BYTES {
                    continue;
                }
                records.push(FileRecord {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path().display().to_string(),
                    size: metadata.len(),
                    modified: format_modified(&metadata),
                });
                if records.len() == MAX_LISTED_FILES {
                    return records;
                }
            }
        }
        records
    }

    /// Reads a whole file, refusing anything over [`MAX_DOWNLOAD_BYTES`]
    /// before opening it.
    pub fn download(&self, path: &Path) -> Result<DownloadedFile, FileError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(FileError::FileNotFound);
            }
            Err(error) => return Err(FileError::from_io(error)),
        };
        if !metadata.is_file() {
            return Err(FileError::NotAFile);
        }
        let size = metadata.len();
        if size > MAX_DOWNLOAD_BYTES {
            return Err(FileError::TooLarge { size });
        }

        let bytes = fs::read(path).map_err(FileError::from_io)?;
        debug!(target: FILES_TARGET, path = %path.display(), size, "file read for download");
        Ok(DownloadedFile {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size,
            data: STANDARD.encode(&bytes),
        })
    }

    /// Stores an upload without ever replacing an existing file.
    ///
    /// `report.pdf` becomes `report_1.pdf`, `report_2.pdf`, ... when taken.
    pub fn upload(&self, filename: &str, data: &str) -> Result<UploadReceipt, FileError> {
        let name = sanitize_filename(filename)?;
        let bytes = STANDARD.decode(data.trim())?;
        fs::create_dir_all(&self.upload_dir).map_err(FileError::from_io)?;

        let (file, path) = create_unique(&self.upload_dir, &name)?;
        write_or_discard(file, &path, &bytes)?;

        let size = bytes.len() as u64;
        info!(target: FILES_TARGET, path = %path.display(), size, "upload stored");
        Ok(UploadReceipt {
            message: format!("File saved to {}", path.display()),
            path: path.display().to_string(),
            size,
        })
    }
}

/// Keeps only the final path component of a client-supplied name.
fn sanitize_filename(filename: &str) -> Result<String, FileError> {
    let normalized = filename.replace('\\', "/");
    let candidate = Path::new(&normalized)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .next_back()
        .map(|part| part.to_string_lossy().into_owned());
    match candidate {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(FileError::InvalidFilename(filename.to_string())),
    }
}

fn create_unique(dir: &Path, name: &str) -> Result<(File, PathBuf), FileError> {
    let original = Path::new(name);
    let stem = original
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let extension = original
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 0_u32;
    loop {
        let candidate = if counter == 0 {
            dir.join(name)
        } else {
            dir.join(format!("{stem}_{counter}{extension}"))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate)),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(error) => return Err(FileError::from_io(error)),
        }
    }
}

/// Writes the whole upload, removing `path` again if any write fails so no
/// truncated file is left behind.
fn write_or_discard(mut file: impl Write, path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    let written = file.write_all(bytes).and_then(|()| file.flush());
    drop(file);
    if let Err(error) = written {
        if let Err(cleanup) = fs::remove_file(path) {
            warn!(
                target: FILES_TARGET,
                path = %path.display(),
                error = %cleanup,
                "partial upload left behind"
            );
        }
        return Err(FileError::from_io(error));
    }
    Ok(())
}

fn format_modified(metadata: &Metadata) -> String {
    metadata
        .modified()
        .map(format_time)
        .unwrap_or_default()
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(root: &TempDir) -> FileService {
        FileService::new(
            root.path().to_path_buf(),
            root.path().join("Downloads"),
            vec![root.path().join("Downloads"), root.path().join("Documents")],
        )
    }

    #[test]
    fn browse_orders_directories_first_case_insensitively() {
        let root = tempfile::tempdir().expect("temp dir");
        fs::write(root.path().join("b.txt"), b"b").expect("write file");
        fs::write(root.path().join("C.txt"), b"c").expect("write file");
        fs::create_dir(root.path().join("z-dir")).expect("mkdir");
        fs::create_dir(root.path().join("A")).expect("mkdir");

        let listing = service(&root).browse(Some(root.path())).expect("listing");
        let names: Vec<&str> = listing.contents.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, ["A", "z-dir", "b.txt", "C.txt"]);
        assert!(listing.parent.is_some());
        assert_eq!(listing.contents[0].size, 0);
        assert_eq!(listing.contents[2].size, 1);
    }

    #[test]
    fn browse_defaults_to_home() {
        let root = tempfile::tempdir().expect("temp dir");
        fs::create_dir(root.path().join("A")).expect("mkdir");
        let listing = service(&root).browse(None).expect("listing");
        assert_eq!(listing.path, root.path().display().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn browse_root_has_no_parent() {
        let root = tempfile::tempdir().expect("temp dir");
        let listing = service(&root).browse(Some(Path::new("/"))).expect("listing");
        assert_eq!(listing.parent, None);
    }

    #[test]
    fn browse_reports_missing_and_non_directory_paths() {
        let root = tempfile::tempdir().expect("temp dir");
        let file = root.path().join("plain.txt");
        fs::write(&file, b"x").expect("write file");
        let files = service(&root);

        assert!(matches!(
            files.browse(Some(&root.path().join("missing"))),
            Err(FileError::PathNotFound)
        ));
        assert!(matches!(files.browse(Some(&file)), Err(FileError::NotADirectory)));
    }

    #[test]
    fn download_rejects_oversized_file_without_reading() {
        let root = tempfile::tempdir().expect("temp dir");
        let path = root.path().join("big.bin");
        let file = File::create(&path).expect("create file");
        file.set_len(MAX_DOWNLOAD_BYTES + 1).expect("extend sparse file");

        let error = service(&root).download(&path).expect_err("too large");
        assert!(matches!(error, FileError::TooLarge { .. }));
        assert_eq!(error.to_string(), "File too large (max 50MB)");
    }

    #[test]
    fn download_reports_missing_file_and_directory() {
        let root = tempfile::tempdir().expect("temp dir");
        let files = service(&root);
        assert!(matches!(
            files.download(&root.path().join("nope")),
            Err(FileError::FileNotFound)
        ));
        assert!(matches!(files.download(root.path()), Err(FileError::NotAFile)));
    }

    #[test]
    fn download_encodes_contents() {
        let root = tempfile::tempdir().expect("temp dir");
        let path = root.path().join("hello.txt");
        fs::write(&path, b"hello").expect("write file");

        let file = service(&root).download(&path).expect("download");
        assert_eq!(file.filename, "hello.txt");
        assert_eq!(file.size, 5);
        assert_eq!(file.data, "aGVsbG8=");
    }

    #[test]
    fn upload_never_overwrites() {
        let root = tempfile::tempdir().expect("temp dir");
        let files = service(&root);

        let first = files.upload("note.txt", "Zmlyc3Q=").expect("first upload");
        let second = files.upload("note.txt", "c2Vjb25k").expect("second upload");
        let third = files.upload("note.txt", "dGhpcmQ=").expect("third upload");

        let dir = root.path().join("Downloads");
        assert_eq!(first.path, dir.join("note.txt").display().to_string());
        assert_eq!(second.path, dir.join("note_1.txt").display().to_string());
        assert_eq!(third.path, dir.join("note_2.txt").display().to_string());
        assert_eq!(fs::read(dir.join("note.txt")).expect("read"), b"first");
        assert_eq!(fs::read(dir.join("note_1.txt")).expect("read"), b"second");
    }

    #[test]
    fn upload_strips_directory_components() {
        let root = tempfile::tempdir().expect("temp dir");
        let receipt = service(&root)
            .upload("../../escape.txt", "eA==")
            .expect("upload");
        assert_eq!(
            receipt.path,
            root.path().join("Downloads").join("escape.txt").display().to_string()
        );
    }

    #[test]
    fn upload_rejects_bad_input() {
        let root = tempfile::tempdir().expect("temp dir");
        let files = service(&root);
        assert!(matches!(files.upload("..", "eA=="), Err(FileError::InvalidFilename(_))));
        assert!(matches!(files.upload("a.txt", "%%%"), Err(FileError::Decode(_))));
    }

    #[test]
    fn listing_skips_large_files_and_subdirectories() {
        let root = tempfile::tempdir().expect("temp dir");
        let downloads = root.path().join("Downloads");
        fs::create_dir_all(downloads.join("nested")).expect("mkdir");
        fs::write(downloads.join("small.txt"), b"small").expect("write file");
        fs::write(downloads.join("nested").join("deep.txt"), b"deep").expect("write file");
        File::create(downloads.join("huge.iso"))
            .expect("create file")
            .set_len(MAX_LISTED_FILE_BYTES)
            .expect("extend sparse file");

        let records = service(&root).list_for_download();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["small.txt"]);
    }

    #[test]
    fn listing_caps_results() {
        let root = tempfile::tempdir().expect("temp dir");
        let documents = root.path().join("Documents");
        fs::create_dir_all(&documents).expect("mkdir");
        for index in 0..(MAX_LISTED_FILES + 20) {
            fs::write(documents.join(format!("f{index}.txt")), b"x").expect("write file");
        }
        assert_eq!(service(&root).list_for_download().len(), MAX_LISTED_FILES);
    }

    #[test]
    fn failed_upload_write_removes_the_partial_file() {
        struct FullDisk;

        impl Write for FullDisk {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("no space left on device"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let root = tempfile::tempdir().expect("temp dir");
        let path = root.path().join("partial.bin");
        fs::write(&path, b"half").expect("write file");

        let error = write_or_discard(FullDisk, &path, b"payload").expect_err("write fails");
        assert!(matches!(error, FileError::Io(_)));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn browse_reports_unreadable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().expect("temp dir");
        let locked = root.path().join("locked");
        fs::create_dir(&locked).expect("mkdir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        // Root ignores directory permissions; nothing to assert there.
        let readable = fs::read_dir(&locked).is_ok();
        let result = service(&root).browse(Some(&locked));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");
        if readable {
            return;
        }

        let error = result.expect_err("listing must fail");
        assert!(matches!(error, FileError::PermissionDenied));
        assert_eq!(error.to_string(), "Permission denied");
    }

    #[cfg(unix)]
    #[test]
    fn browse_skips_dangling_symlinks() {
        let root = tempfile::tempdir().expect("temp dir");
        fs::write(root.path().join("real.txt"), b"x").expect("write file");
        std::os::unix::fs::symlink(root.path().join("gone.txt"), root.path().join("dangling"))
            .expect("symlink");
        std::os::unix::fs::symlink(root.path().join("real.txt"), root.path().join("alias"))
            .expect("symlink");

        let listing = service(&root).browse(Some(root.path())).expect("listing");
        let names: Vec<&str> = listing.contents.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["alias", "real.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn listing_follows_symlinked_files() {
        let root = tempfile::tempdir().expect("temp dir");
        let downloads = root.path().join("Downloads");
        fs::create_dir_all(&downloads).expect("mkdir");
        let target = root.path().join("elsewhere.pdf");
        fs::write(&target, b"pdf").expect("write file");
        std::os::unix::fs::symlink(&target, downloads.join("linked.pdf")).expect("symlink");
        std::os::unix::fs::symlink(root.path().join("gone"), downloads.join("dangling"))
            .expect("symlink");

        let records = service(&root).list_for_download();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["linked.pdf"]);
        assert_eq!(records[0].size, 3);
    }
}
