// src/fetch.rs

//! Archive downloading
//!
//! Downloads are keyed by URI in a `DirMap`, so a file is fetched at most
//! once across transactions and a crash mid-download leaves nothing behind.
//! Network failures are retried with a linear backoff before they surface.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::cache::DirMap;
use crate::error::{Error, Result};

/// HTTP request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Base delay between retries, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Batch source fetcher used by the prepare step
///
/// Requests are `(uri, filename)` pairs; the result maps each URI to the
/// local file holding its content.
pub trait Downloader {
    fn fetch(&self, requests: &BTreeSet<(String, String)>) -> Result<BTreeMap<String, PathBuf>>;
}

/// Downloader over HTTP with a persistent on-disk cache
pub struct HttpDownloader {
    client: Client,
    cache: Mutex<DirMap>,
    max_retries: u32,
}

impl HttpDownloader {
    pub fn new(cache: DirMap) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("failed to create HTTP client: {}", e)))?;

        Ok(HttpDownloader {
            client,
            cache: Mutex::new(cache),
            max_retries: MAX_RETRIES,
        })
    }

    fn download(&self, uri: &str, dest: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(uri).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            uri
                        )));
                    }
                    let mut file = File::create(dest)?;
                    io::copy(&mut response, &mut file)?;
                    info!("downloaded {} to {}", uri, dest.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "failed to download {} after {} attempts: {}",
                            uri, attempt, e
                        )));
                    }
                    warn!("download attempt {} for {} failed: {}, retrying", attempt, uri, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, requests: &BTreeSet<(String, String)>) -> Result<BTreeMap<String, PathBuf>> {
        let mut cache = self.cache.lock().expect("download cache mutex poisoned");
        let mut fetched = BTreeMap::new();

        for (uri, filename) in requests {
            if fetched.contains_key(uri) {
                continue;
            }
            let dir = if cache.contains(uri) {
                info!("cache hit for {}", uri);
                cache.get(uri)?
            } else {
                cache.atomic_add(uri, |staging| self.download(uri, &staging.join(filename)))?
            };
            fetched.insert(uri.clone(), cached_file(&dir, filename)?);
        }
        Ok(fetched)
    }
}

/// Locate the payload inside a cache entry. The filename hint from the
/// manifest is preferred; an entry cached under an older hint still resolves
/// to its single file.
fn cached_file(dir: &Path, filename: &str) -> Result<PathBuf> {
    let hinted = dir.join(filename);
    if hinted.is_file() {
        return Ok(hinted);
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();
    entries
        .into_iter()
        .next()
        .ok_or_else(|| Error::Download(format!("cache entry for {} is empty", filename)))
}
