use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// `dir/<prefix><timestamp>.<ext>`, with a counter appended if that name is taken.
pub fn timestamped_path(dir: &Path, prefix: &str, ext: &str, at: DateTime<Utc>) -> PathBuf {
    let stamp = at.format("%Y%m%dT%H%M%S%.3fZ");
    let mut path = dir.join(format!("{}{}.{}", prefix, stamp, ext));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}{}-{}.{}", prefix, stamp, n, ext));
        n += 1;
    }
    path
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_taken_name_gets_counter() {
        let dir = tempdir().unwrap();
        let at = Utc::now();
        let first = timestamped_path(dir.path(), "report-", "json", at);
        std::fs::write(&first, "{}").unwrap();
        let second = timestamped_path(dir.path(), "report-", "json", at);
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-1.json"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
