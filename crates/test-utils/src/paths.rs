//! Path utilities for locating test data and creating scratch directories.

use std::path::PathBuf;

/// Returns the workspace root directory (two levels above this crate).
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Searches for a real GRIB2 sample in, in order: `TEST_DATA_DIR`,
/// `crates/grib2-parser/testdata/`, `crates/forecast-pipeline/testdata/`
/// and the workspace-level `testdata/`.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(test_data_dir) = std::env::var("TEST_DATA_DIR") {
        candidates.push(PathBuf::from(test_data_dir).join(name));
    }

    let root = workspace_root();
    candidates.extend([
        root.join("crates/grib2-parser/testdata").join(name),
        root.join("crates/forecast-pipeline/testdata").join(name),
        root.join("testdata").join(name),
    ]);

    candidates.into_iter().find(|path| path.exists())
}

/// Temporary directory usable as a cache root; removed on drop.
pub fn temp_cache_root() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("gfs_cache_")
        .tempdir()
        .expect("Failed to create temporary cache directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_is_valid() {
        let root = workspace_root();
        assert!(
            root.join("Cargo.toml").exists(),
            "Workspace root should contain Cargo.toml: {:?}",
            root
        );
    }

    #[test]
    fn test_temp_cache_root() {
        let dir = temp_cache_root();
        assert!(dir.path().exists());
        assert!(dir.path().to_string_lossy().contains("gfs_cache_"));
    }
}
