//! On-disk layout of the raw file cache.
//!
//! ```text
//! <root>/<YYYYMMDD>/<HH>z/gfs.pgrb2.0p25.f<FFF>
//! ```
//!
//! A file is only ever written through a `.partial` sibling and renamed into
//! place, so anything at a final path was completely transferred. Size is
//! still checked on every read because an undersized file is what the
//! archive returns for horizons that are not published yet.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::Result;
use crate::types::{ForecastHorizon, ForecastRun};

/// State of one cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Missing,
    Valid { bytes: u64 },
    Undersized { bytes: u64 },
}

impl CacheState {
    pub fn is_valid(&self) -> bool {
        matches!(self, CacheState::Valid { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
    min_valid_bytes: u64,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>, min_valid_bytes: u64) -> Self {
        Self {
            root: root.into(),
            min_valid_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn min_valid_bytes(&self) -> u64 {
        self.min_valid_bytes
    }

    pub fn run_dir(&self, run: &ForecastRun) -> PathBuf {
        self.root
            .join(run.date_compact())
            .join(format!("{}z", run.hour))
    }

    pub fn file_name(horizon: ForecastHorizon) -> String {
        format!("gfs.pgrb2.0p25.f{}", horizon.padded())
    }

    pub fn path_for(&self, run: &ForecastRun, horizon: ForecastHorizon) -> PathBuf {
        self.run_dir(run).join(Self::file_name(horizon))
    }

    pub fn partial_path_for(&self, run: &ForecastRun, horizon: ForecastHorizon) -> PathBuf {
        self.run_dir(run)
            .join(format!("{}.partial", Self::file_name(horizon)))
    }

    /// Validity rule: at least `min_valid_bytes` long.
    pub fn classify(&self, bytes: u64) -> CacheState {
        if bytes >= self.min_valid_bytes {
            CacheState::Valid { bytes }
        } else {
            CacheState::Undersized { bytes }
        }
    }

    pub async fn inspect_path(&self, path: &Path) -> Result<CacheState> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(self.classify(meta.len())),
            Ok(_) => Ok(CacheState::Missing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheState::Missing),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn inspect(&self, run: &ForecastRun, horizon: ForecastHorizon) -> Result<CacheState> {
        self.inspect_path(&self.path_for(run, horizon)).await
    }

    /// Horizons of `run` that have a valid cached file, ascending.
    pub async fn cached_horizons(&self, run: &ForecastRun) -> Result<Vec<(ForecastHorizon, u64)>> {
        let dir = self.run_dir(run);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(horizon) = name
                .to_str()
                .and_then(|n| n.strip_prefix("gfs.pgrb2.0p25."))
                .and_then(|suffix| suffix.parse::<ForecastHorizon>().ok())
            else {
                continue;
            };

            if let CacheState::Valid { bytes } = self.inspect_path(&entry.path()).await? {
                found.push((horizon, bytes));
            } else {
                debug!(path = %entry.path().display(), "Ignoring undersized cache file");
            }
        }

        found.sort_by_key(|(h, _)| *h);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> ForecastRun {
        ForecastRun::parse("20240301", 6).unwrap()
    }

    #[test]
    fn test_paths() {
        let layout = CacheLayout::new("/data/gfs", 65_536);
        let h = ForecastHorizon::new(3).unwrap();
        assert_eq!(
            layout.path_for(&run(), h),
            PathBuf::from("/data/gfs/20240301/06z/gfs.pgrb2.0p25.f003")
        );
        assert_eq!(
            layout.partial_path_for(&run(), h),
            PathBuf::from("/data/gfs/20240301/06z/gfs.pgrb2.0p25.f003.partial")
        );
    }

    #[test]
    fn test_classify_boundary() {
        let layout = CacheLayout::new("/tmp", 100);
        assert_eq!(layout.classify(100), CacheState::Valid { bytes: 100 });
        assert_eq!(layout.classify(99), CacheState::Undersized { bytes: 99 });
    }

    #[tokio::test]
    async fn test_cached_horizons_skips_partial_and_small() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path(), 10);
        let run_dir = layout.run_dir(&run());
        fs::create_dir_all(&run_dir).await.unwrap();

        fs::write(run_dir.join("gfs.pgrb2.0p25.f006"), vec![0u8; 20]).await.unwrap();
        fs::write(run_dir.join("gfs.pgrb2.0p25.f000"), vec![0u8; 10]).await.unwrap();
        fs::write(run_dir.join("gfs.pgrb2.0p25.f003"), vec![0u8; 5]).await.unwrap();
        fs::write(run_dir.join("gfs.pgrb2.0p25.f009.partial"), vec![0u8; 50]).await.unwrap();

        let cached = layout.cached_horizons(&run()).await.unwrap();
        let hours: Vec<u32> = cached.iter().map(|(h, _)| h.hours()).collect();
        assert_eq!(hours, vec![0, 6]);
    }

    #[tokio::test]
    async fn test_missing_run_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path(), 10);
        assert!(layout.cached_horizons(&run()).await.unwrap().is_empty());
        assert_eq!(
            layout.inspect(&run(), ForecastHorizon::ANALYSIS).await.unwrap(),
            CacheState::Missing
        );
    }
}
