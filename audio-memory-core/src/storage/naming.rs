//! File names for recordings and snapshots.
//!
//! Names are derived from the (reconstructed) start time of the audio unless
//! the caller supplies one. Bad characters and collisions are fixed up by
//! substitution; naming never fails.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

const EXTENSION: &str = "wav";
const REPLACEMENT: char = '.';

/// `"<prefix> - Sun, Oct 18 2026 14.03.22.wav"`
pub fn default_file_name(prefix: &str, started_at: &DateTime<Local>) -> String {
    let stamp = started_at.format("%a, %b %-d %Y %H:%M:%S");
    sanitize_file_name(&format!("{} - {}.{}", prefix, stamp, EXTENSION))
}

/// File name for a caller-supplied name, or the default name when it is
/// blank.
pub fn file_name_for(requested: &str, prefix: &str, started_at: &DateTime<Local>) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        return default_file_name(prefix, started_at);
    }

    let has_extension = Path::new(requested)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION));
    if has_extension {
        sanitize_file_name(requested)
    } else {
        sanitize_file_name(&format!("{}.{}", requested, EXTENSION))
    }
}

/// Replace characters that are not allowed in file names on common
/// filesystems.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => REPLACEMENT,
            c if c.is_control() => REPLACEMENT,
            c => c,
        })
        .collect();

    // "." and ".." are not usable names.
    if cleaned.chars().all(|c| c == REPLACEMENT) {
        return format!("recording.{}", EXTENSION);
    }
    cleaned
}

/// `directory/file_name`, or `directory/stem (n).ext` with the first free `n`
/// when that file already exists.
pub fn unique_path(directory: &Path, file_name: &str) -> PathBuf {
    let candidate = directory.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (2u32..)
        .map(|n| directory.join(format!("{} ({}){}", stem, n, extension)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 18, 14, 3, 22).unwrap()
    }

    #[test]
    fn default_name_has_no_colons() {
        let name = default_file_name("Echo", &at());
        assert_eq!(name, "Echo - Sun, Oct 18 2026 14.03.22.wav");
    }

    #[test]
    fn explicit_name_gets_extension_once() {
        assert_eq!(file_name_for("meeting", "Echo", &at()), "meeting.wav");
        assert_eq!(file_name_for("meeting.WAV", "Echo", &at()), "meeting.WAV");
        assert_eq!(file_name_for("  ", "Echo", &at()), default_file_name("Echo", &at()));
    }

    #[test]
    fn invalid_characters_are_substituted() {
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j"), "a.b.c.d.e.f.g.h.i.j");
        assert_eq!(sanitize_file_name("tab\there"), "tab.here");
        assert_eq!(sanitize_file_name(".."), "recording.wav");
        assert_eq!(file_name_for("../../etc/passwd", "Echo", &at()), "......etc.passwd.wav");
    }

    #[test]
    fn collisions_get_a_counter() {
        let dir = std::env::temp_dir().join(format!("audio_memory_naming_{}", std::process::id()));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();

        let first = unique_path(&dir, "take.wav");
        assert_eq!(first, dir.join("take.wav"));
        fs::write(&first, b"").unwrap();

        let second = unique_path(&dir, "take.wav");
        assert_eq!(second, dir.join("take (2).wav"));
        fs::write(&second, b"").unwrap();

        assert_eq!(unique_path(&dir, "take.wav"), dir.join("take (3).wav"));

        fs::remove_dir_all(&dir).ok();
    }
}
