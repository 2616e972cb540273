//! Test support for loader behaviour tests.
//!
//! Provides an in-memory repository standing in for remote Maven
//! repositories, so scenarios run without network access and can count the
//! requests a load makes.

use camino::Utf8PathBuf;
use loadstone_loader::fetch::download::{ArtifactDownloader, DownloadError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    unreachable: Vec<String>,
    requests: Vec<String>,
}

/// Serves registered files by URL; everything else is 404.
#[derive(Clone, Default)]
pub struct StubRepository {
    state: Arc<Mutex<State>>,
}

impl StubRepository {
    /// Serve `bytes` at `url`.
    pub fn serve(&self, url: &str, bytes: &[u8]) {
        self.state
            .lock()
            .expect("stub lock")
            .files
            .insert(url.to_owned(), bytes.to_vec());
    }

    /// Fail every request under `base` as a connection error.
    pub fn refuse(&self, base: &str) {
        self.state
            .lock()
            .expect("stub lock")
            .unreachable
            .push(base.to_owned());
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().expect("stub lock").requests.clone()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.state.lock().expect("stub lock").requests.clear();
    }
}

impl ArtifactDownloader for StubRepository {
    fn fetch_bytes(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, DownloadError> {
        let mut state = self.state.lock().expect("stub lock");
        state.requests.push(url.to_owned());
        if state.unreachable.iter().any(|base| url.starts_with(base)) {
            return Err(DownloadError::HttpError {
                url: url.to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        state
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::NotFound {
                url: url.to_owned(),
            })
    }

    fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, DownloadError> {
        let bytes = self.fetch_bytes(url, timeout)?;
        String::from_utf8(bytes).map_err(|err| DownloadError::HttpError {
            url: url.to_owned(),
            reason: err.to_string(),
        })
    }
}

/// A temporary cache root that lives as long as the returned guard.
pub fn temp_cache() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).expect("utf-8 path");
    (temp, root)
}
