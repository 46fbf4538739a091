//! Input expansion and size formatting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use zendyn::ContainerFormat;

/// Expand input patterns into a deduplicated list of image files.
///
/// Handles:
/// - Glob patterns (containing `*`, `?`, `[`)
/// - Plain file paths
/// - Directories (recursive discovery by extension)
///
/// Order follows the patterns; directory contents are sorted by path.
pub fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            for entry in glob::glob(pattern)? {
                let path = entry?;
                if path.is_file() && is_image(&path) {
                    push_unique(path, &mut seen, &mut files);
                }
            }
        } else {
            let path = PathBuf::from(pattern);
            if path.is_dir() {
                let mut found = Vec::new();
                for_each_image_in_dir(&path, &mut found);
                found.sort();
                for path in found {
                    push_unique(path, &mut seen, &mut files);
                }
            } else if path.is_file() {
                push_unique(path, &mut seen, &mut files);
            } else {
                anyhow::bail!("not a file or directory: {}", path.display());
            }
        }
    }

    Ok(files)
}

fn push_unique(path: PathBuf, seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
    if let Ok(canonical) = path.canonicalize() {
        if seen.insert(canonical) {
            files.push(path);
        }
    }
}

/// Check if a file path has an AVIF or HEIC extension.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ContainerFormat::from_extension)
        .is_some()
}

/// Recursively find image files in a directory.
fn for_each_image_in_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            for_each_image_in_dir(&path, files);
        } else if path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
}

/// Format a byte size into a human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
