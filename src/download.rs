use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::error::IngestError;
use crate::retry::{AttemptError, RetryPolicy, is_retryable_error, is_retryable_status};

/// Turns named URLs into named local files.
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        urls: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Utf8PathBuf>, IngestError>;

    /// Like [`Downloader::download`], but `.gz` payloads come back decompressed.
    fn download_and_extract(
        &self,
        urls: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Utf8PathBuf>, IngestError> {
        self.download(urls)?
            .into_iter()
            .map(|(name, path)| Ok((name, extract(&path)?)))
            .collect()
    }
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
    download_dir: Utf8PathBuf,
    retry: RetryPolicy,
}

impl HttpDownloader {
    pub fn new(download_dir: Utf8PathBuf, retry: RetryPolicy) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::DownloadHttp(err.to_string()))?,
        );
        // Large archives; only the connect phase gets a deadline.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| IngestError::DownloadHttp(err.to_string()))?;
        Ok(Self {
            client,
            download_dir,
            retry,
        })
    }

    pub fn download_dir(&self) -> &Utf8Path {
        &self.download_dir
    }

    fn fetch_one(&self, url: &str) -> Result<Utf8PathBuf, IngestError> {
        let destination = self.download_dir.join(file_name_for(url)?);
        if destination.as_std_path().exists() {
            debug!(path = %destination, "reusing downloaded file");
            return Ok(destination);
        }
        fs::create_dir_all(self.download_dir.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;

        info!(url, "downloading");
        let temp = self.retry.run("download", |_| {
            let mut response = self.client.get(url).send().map_err(|err| {
                let retryable = is_retryable_error(&err);
                let err = IngestError::DownloadHttp(err.to_string());
                if retryable {
                    AttemptError::Transient(err)
                } else {
                    AttemptError::Permanent(err)
                }
            })?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .unwrap_or_else(|_| "download failed".to_string());
                let err = IngestError::DownloadStatus { status, message };
                return Err(if is_retryable_status(status) {
                    AttemptError::Transient(err)
                } else {
                    AttemptError::Permanent(err)
                });
            }
            let mut temp = tempfile::Builder::new()
                .prefix("kira-ingest-download")
                .tempfile_in(self.download_dir.as_std_path())
                .map_err(|err| AttemptError::Permanent(IngestError::Filesystem(err.to_string())))?;
            io::copy(&mut response, temp.as_file_mut()).map_err(|err| {
                AttemptError::Transient(IngestError::DownloadHttp(err.to_string()))
            })?;
            Ok(temp)
        })?;
        temp.persist(destination.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        info!(path = %destination, "download complete");
        Ok(destination)
    }
}

impl Downloader for HttpDownloader {
    fn download(
        &self,
        urls: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Utf8PathBuf>, IngestError> {
        urls.iter()
            .map(|(name, url)| Ok((name.clone(), self.fetch_one(url)?)))
            .collect()
    }
}

/// Local file name for a URL: its last path segment, without query string.
pub fn file_name_for(url: &str) -> Result<String, IngestError> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IngestError::DownloadHttp(format!("cannot derive file name from {url}")))
}

/// Gunzips `path` next to itself (dropping the `.gz` suffix) unless that was
/// already done. Files without a `.gz` suffix are returned unchanged.
pub fn extract(path: &Utf8Path) -> Result<Utf8PathBuf, IngestError> {
    if path.extension() != Some("gz") {
        return Ok(path.to_path_buf());
    }
    let target = path.with_extension("");
    if target.as_std_path().exists() {
        return Ok(target);
    }
    let parent = target
        .parent()
        .ok_or_else(|| IngestError::Filesystem("invalid extraction path".to_string()))?;

    info!(path = %path, "decompressing");
    let source =
        File::open(path.as_std_path()).map_err(|err| IngestError::Filesystem(err.to_string()))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(source));
    let mut temp = tempfile::Builder::new()
        .prefix("kira-ingest-extract")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, temp.as_file_mut())
        .map_err(|err| IngestError::Filesystem(format!("gunzip {path}: {err}")))?;
    temp.persist(target.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    Ok(target)
}
