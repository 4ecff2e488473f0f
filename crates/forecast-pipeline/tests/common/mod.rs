//! In-memory archive for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use forecast_pipeline::{ArchiveClient, ArchiveError};

/// Serves listings by exact URL and files by the horizon in the `file=`
/// parameter. Unpublished horizons answer with a small HTML page, like the
/// real filter does.
#[derive(Default)]
pub struct FakeArchive {
    pages: Mutex<HashMap<String, String>>,
    files: Mutex<HashMap<u32, Vec<u8>>>,
    unreachable: Mutex<bool>,
    requests: Mutex<Vec<String>>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), body.to_string());
        self
    }

    pub fn publish(&self, horizon: u32, body: Vec<u8>) {
        self.files.lock().unwrap().insert(horizon, body);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, url: &str) -> Result<(), ArchiveError> {
        self.requests.lock().unwrap().push(url.to_string());
        if *self.unreachable.lock().unwrap() {
            return Err(ArchiveError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Horizon from `file=gfs.tHHz.pgrb2.0p25.fFFF`
fn horizon_in(url: &str) -> Option<u32> {
    let start = url.find(".pgrb2.0p25.f")? + ".pgrb2.0p25.f".len();
    url.get(start..start + 3)?.parse().ok()
}

#[async_trait]
impl ArchiveClient for FakeArchive {
    async fn get_text(&self, url: &str) -> Result<String, ArchiveError> {
        self.record(url)?;
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(ArchiveError::Status(404))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, ArchiveError> {
        self.record(url)?;
        let body = horizon_in(url)
            .and_then(|h| self.files.lock().unwrap().get(&h).cloned())
            .unwrap_or_else(test_utils::not_published_page);
        tokio::fs::write(dest, &body).await?;
        Ok(body.len() as u64)
    }
}
