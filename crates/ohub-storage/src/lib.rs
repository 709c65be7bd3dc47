//! Bookmark persistence + HTTP fetch utilities for Opportunity Hub.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ohub-storage";

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("persisting bookmarks to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Bookmarked opportunity ids, kept in insertion order and mirrored to a JSON
/// array on disk.
#[derive(Debug)]
pub struct BookmarkStore {
    path: PathBuf,
    ids: Mutex<Vec<String>>,
}

impl BookmarkStore {
    /// Load bookmarks from `path`. A missing or unreadable file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<Vec<String>>(&text) {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring malformed bookmarks file");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable bookmarks file");
                Vec::new()
            }
        };
        Self {
            path,
            ids: Mutex::new(ids),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_bookmarked(&self, id: &str) -> bool {
        self.ids.lock().await.iter().any(|existing| existing == id)
    }

    pub async fn ids(&self) -> Vec<String> {
        self.ids.lock().await.clone()
    }

    /// Flip the bookmark for `id` and persist. Returns the new state. The
    /// in-memory set only changes once the file has been written.
    pub async fn toggle(&self, id: &str) -> Result<bool, BookmarkError> {
        let mut ids = self.ids.lock().await;
        let mut next = ids.clone();
        let bookmarked = if let Some(pos) = next.iter().position(|existing| existing == id) {
            next.remove(pos);
            false
        } else {
            next.push(id.to_string());
            true
        };

        write_json_atomically(&self.path, next.as_slice())
            .await
            .map_err(|source| BookmarkError::Persist {
                path: self.path.display().to_string(),
                source,
            })?;
        *ids = next;
        debug!(id, bookmarked, "bookmark toggled");
        Ok(bookmarked)
    }
}

/// Serialize `value` next to `path` and rename it into place.
pub async fn write_json_atomically<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serializing json document")?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(&bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            concurrency: 8,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} from {label}")]
    HttpStatus { status: u16, label: String },
    #[error("decoding response from {label}: {source}")]
    Decode {
        label: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Shared HTTP client with a concurrency cap and retry/backoff.
///
/// Requests are identified in logs by a caller-supplied label rather than the
/// URL, since third-party URLs may carry API keys.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limit: Arc<Semaphore>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            limit: Arc::new(Semaphore::new(config.concurrency.max(1))),
            backoff: config.backoff,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, label: &str, url: &str) -> Result<T, FetchError> {
        let response = self.send_with_retry(label, || self.client.get(url)).await?;
        decode(label, &response.body)
    }

    pub async fn post_json<B, T>(&self, label: &str, url: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send_with_retry(label, || self.client.post(url).json(body))
            .await?;
        decode(label, &response.body)
    }

    async fn send_with_retry<F>(&self, label: &str, build: F) -> Result<FetchedResponse, FetchError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let span = info_span!("http_fetch", label);
        async {
            let _permit = self.limit.acquire().await.ok();
            let mut attempt = 0;
            loop {
                match build().send().await {
                    Ok(resp) => {
                        let status = resp.status();
                        if status.is_success() {
                            let body = resp.bytes().await?.to_vec();
                            return Ok(FetchedResponse { status, body });
                        }

                        if classify_status(status) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            debug!(%status, attempt, "retrying after http status");
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }

                        return Err(FetchError::HttpStatus {
                            status: status.as_u16(),
                            label: label.to_string(),
                        });
                    }
                    Err(err) => {
                        if classify_reqwest_error(&err) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            debug!(error = %err, attempt, "retrying after request error");
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(FetchError::Request(err));
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn decode<T: DeserializeOwned>(label: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|source| FetchError::Decode {
        label: label.to_string(),
        source,
    })
}
