// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File gate — decides whether a name in the watched directory is a scanned
// page (and where it sits in its document), a foreign file, or something
// that cannot be matched at all.  Classification never fails.

use std::path::Path;

use regex::Regex;
use smartscan_core::error::Result;
use smartscan_core::{CandidateFile, FileClass};
use tracing::{debug, warn};

/// Accepted page naming conventions.  Case-sensitive, single digit only.
const PAGE_PATTERNS: &[&str] = &[r"^image_[0-9]\.(jpg|jpeg)$", r"^screen_[0-9]\.png$"];

/// Compiled page patterns.
pub struct FileGate {
    patterns: Vec<Regex>,
}

impl Default for FileGate {
    fn default() -> Self {
        Self::new()
    }
}

impl FileGate {
    pub fn new() -> Self {
        let patterns = PAGE_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = p, error = %e, "skipping invalid page pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Whether `name` matches any page pattern (first match wins).
    pub fn is_page_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }

    /// Classify a bare file name.
    pub fn classify_name(&self, name: &str) -> FileClass {
        if name.is_empty() {
            return FileClass::Unrecognized;
        }
        if !self.is_page_name(name) {
            return FileClass::Foreign;
        }
        match sequence_index(name) {
            Some(index) => FileClass::Page(index),
            // Every page pattern carries a digit; keep the gate total anyway.
            None => FileClass::Foreign,
        }
    }

    /// Classify a path inside the watched directory.
    pub fn inspect(&self, path: &Path) -> CandidateFile {
        let os_name = path.file_name();
        let (name, class) = match os_name.and_then(|n| n.to_str()) {
            Some(name) => (name.to_owned(), self.classify_name(name)),
            None => (
                os_name
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                FileClass::Unrecognized,
            ),
        };

        CandidateFile {
            sequence_index: sequence_index(&name),
            path: path.to_path_buf(),
            name,
            class,
        }
    }

    /// List the regular files in `dir` and classify each one.
    ///
    /// Files come back in file-name order so a scan pass is reproducible on
    /// every filesystem.  The order is never by sequence index.
    pub fn scan_directory(&self, dir: &Path) -> Result<Vec<CandidateFile>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "unreadable directory entry");
                    continue;
                }
            };
            match entry.file_type() {
                Ok(ft) if ft.is_file() => paths.push(entry.path()),
                _ => continue,
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let candidates: Vec<CandidateFile> = paths.iter().map(|p| self.inspect(p)).collect();
        debug!(dir = %dir.display(), files = candidates.len(), "directory scanned");
        Ok(candidates)
    }
}

/// First decimal digit in `name`, if there is one.
pub fn sequence_index(name: &str) -> Option<u8> {
    name.bytes()
        .find(u8::is_ascii_digit)
        .map(|digit| digit - b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_and_png_pages_are_recognised() {
        let gate = FileGate::new();
        assert_eq!(gate.classify_name("image_0.jpg"), FileClass::Page(0));
        assert_eq!(gate.classify_name("image_7.jpeg"), FileClass::Page(7));
        assert_eq!(gate.classify_name("screen_4.png"), FileClass::Page(4));
    }

    #[test]
    fn near_misses_are_foreign() {
        let gate = FileGate::new();
        for name in [
            "report.txt",
            "image_10.jpg",
            "IMAGE_1.jpg",
            "image_1.JPG",
            "screen_1.jpg",
            "image_a.jpg",
            "image_1.jpg.part",
            "xscreen_1.png",
        ] {
            assert_eq!(gate.classify_name(name), FileClass::Foreign, "{name}");
        }
    }

    #[test]
    fn empty_name_is_unrecognized() {
        assert_eq!(FileGate::new().classify_name(""), FileClass::Unrecognized);
    }

    #[test]
    fn index_is_first_digit_or_none() {
        assert_eq!(sequence_index("image_3.jpg"), Some(3));
        assert_eq!(sequence_index("scan42.tif"), Some(4));
        assert_eq!(sequence_index("report.txt"), None);
    }

    #[test]
    fn inspect_carries_index_for_foreign_files() {
        let gate = FileGate::new();
        let c = gate.inspect(Path::new("/watch/invoice_2024.pdf"));
        assert_eq!(c.class, FileClass::Foreign);
        assert_eq!(c.sequence_index, Some(2));
        assert_eq!(c.name, "invoice_2024.pdf");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_name_is_unrecognized() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let gate = FileGate::new();
        let name = OsStr::from_bytes(b"image_\xff.jpg");
        let c = gate.inspect(&Path::new("/watch").join(name));
        assert_eq!(c.class, FileClass::Unrecognized);
    }

    #[test]
    fn scan_lists_files_in_name_order_and_skips_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for name in ["screen_2.png", "image_1.jpg", "notes.txt"] {
            std::fs::write(tmp.path().join(name), b"x").expect("write");
        }
        std::fs::create_dir(tmp.path().join("image_5.jpg")).expect("mkdir");

        let names: Vec<String> = FileGate::new()
            .scan_directory(tmp.path())
            .expect("scan")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["image_1.jpg", "notes.txt", "screen_2.png"]);
    }
}
