//! Local file helpers: MIME guessing and safe output paths.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Guess a MIME type from the file extension
#[must_use]
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("txt" | "md" | "log") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Reduce a peer-supplied name to a bare file name
///
/// Directory components are dropped so a sender cannot write outside the
/// output directory.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "received.bin".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Output paths to try for `name`, in order
///
/// `report.pdf`, then `report (1).pdf`, `report (2).pdf`, ...
pub fn output_candidates<'a>(dir: &'a Path, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());

    std::iter::once(dir.join(name)).chain((1u32..).map(move |n| match ext {
        Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
        None => dir.join(format!("{stem} ({n})")),
    }))
}

/// Write a received file into `dir`, never overwriting
///
/// Each candidate is created with `create_new`, so a file that appears
/// concurrently under the same name is skipped rather than replaced.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
pub fn save_received(dir: &Path, name: &str, data: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let name = sanitize_file_name(name);

    for path in output_candidates(dir, &name) {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(data)?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free output name for {name}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("a.TXT")), "text/plain");
        assert_eq!(mime_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("archive")), "application/octet-stream");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name(".."), "received.bin");
        assert_eq!(sanitize_file_name(""), "received.bin");
        assert_eq!(sanitize_file_name("dir/"), "received.bin");
        assert_eq!(sanitize_file_name("bad\u{0}name"), "badname");
    }

    #[test]
    fn test_output_candidates() {
        let dir = Path::new("out");
        let names: Vec<PathBuf> = output_candidates(dir, "a.txt").take(3).collect();
        assert_eq!(
            names,
            vec![dir.join("a.txt"), dir.join("a (1).txt"), dir.join("a (2).txt")]
        );

        let names: Vec<PathBuf> = output_candidates(dir, "noext").take(2).collect();
        assert_eq!(names, vec![dir.join("noext"), dir.join("noext (1)")]);
    }

    #[test]
    fn test_save_received_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let first = save_received(dir.path(), "../report.pdf", b"one").unwrap();
        let second = save_received(dir.path(), "report.pdf", b"two").unwrap();

        assert_eq!(first, dir.path().join("report.pdf"));
        assert_eq!(second, dir.path().join("report (1).pdf"));
        assert_eq!(fs::read(first).unwrap(), b"one");
        assert_eq!(fs::read(second).unwrap(), b"two");
    }

    #[test]
    fn test_save_received_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"mine").unwrap();
        fs::write(dir.path().join("notes (1).txt"), b"also mine").unwrap();

        let saved = save_received(dir.path(), "notes.txt", b"theirs").unwrap();
        assert_eq!(saved, dir.path().join("notes (2).txt"));
        assert_eq!(fs::read(dir.path().join("notes.txt")).unwrap(), b"mine");
        assert_eq!(fs::read(dir.path().join("notes (1).txt")).unwrap(), b"also mine");
        assert_eq!(fs::read(saved).unwrap(), b"theirs");
    }

    #[test]
    fn test_concurrent_saves_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();

        let mut saved: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u8)
                .map(|i| {
                    let dir = dir.path();
                    scope.spawn(move || (save_received(dir, "same.bin", &[i]).unwrap(), i))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    let (path, i) = h.join().unwrap();
                    assert_eq!(fs::read(&path).unwrap(), vec![i]);
                    path
                })
                .collect()
        });

        saved.sort();
        saved.dedup();
        assert_eq!(saved.len(), 8);
    }
}
