//! Single-URL download engine: streams a GET into a pending
//! file while hashing it, retries transient failures with a linearly
//! growing backoff capped at 60s, and resumes via HTTP range requests when
//! the server supports it.

use std::time::Duration;

use futures_util::StreamExt as _;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use snafu::ResultExt as _;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt as _;
use tokio_util::sync::CancellationToken;

use crate::error::{AbortedSnafu, DownloadResult, HttpSnafu, IoSnafu2, PermanentStatusSnafu};

pub(crate) const LOG_TARGET: &str = "archiver::files::download";

const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct DownloadOutcome {
    pub hash: blake3::Hash,
    pub bytes_written: u64,
}

/// Whether the server told us it supports byte-range resume for this
/// response (`Accept-Ranges: bytes` plus a usable `Content-Length`).
fn supports_resume(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("bytes"))
        .unwrap_or(false)
        && headers.get(CONTENT_LENGTH).is_some()
}

pub async fn download(
    client: &reqwest::Client,
    url: &str,
    pending_path: &std::path::Path,
    abort: &CancellationToken,
) -> DownloadResult<DownloadOutcome> {
    let mut downloaded: u64 = 0;
    let mut hasher = blake3::Hasher::new();
    let mut resumable = false;
    let mut attempt: u64 = 0;

    loop {
        if abort.is_cancelled() {
            return AbortedSnafu.fail();
        }

        let mut request = client.get(url);
        if downloaded > 0 && resumable {
            request = request.header(RANGE, format!("bytes={downloaded}-"));
        }

        let response = tokio::select! {
            biased;
            _ = abort.cancelled() => return AbortedSnafu.fail(),
            result = request.send() => result.context(HttpSnafu)?,
        };

        let status = response.status();

        if status.is_success() || status == StatusCode::PARTIAL_CONTENT {
            let is_range_response = status == StatusCode::PARTIAL_CONTENT;
            if downloaded > 0 && resumable {
                if !is_range_response || !content_range_matches(response.headers(), downloaded) {
                    tracing::warn!(target: LOG_TARGET, url, "range resume rejected by server, restarting from scratch");
                    downloaded = 0;
                    hasher = blake3::Hasher::new();
                } else {
                    tracing::debug!(target: LOG_TARGET, url, downloaded, "resuming download");
                }
            }

            resumable = supports_resume(response.headers());

            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(downloaded == 0)
                .open(pending_path)
                .await
                .context(IoSnafu2)?;
            if downloaded > 0 {
                use tokio::io::AsyncSeekExt as _;
                file.seek(std::io::SeekFrom::Start(downloaded)).await.context(IoSnafu2)?;
            }

            let mut stream = response.bytes_stream();
            let write_result: DownloadResult<()> = async {
                loop {
                    let chunk = tokio::select! {
                        biased;
                        _ = abort.cancelled() => return AbortedSnafu.fail(),
                        next = stream.next() => next,
                    };
                    match chunk {
                        None => return Ok(()),
                        Some(Ok(bytes)) => {
                            hasher.update(&bytes);
                            file.write_all(&bytes).await.context(IoSnafu2)?;
                            downloaded += bytes.len() as u64;
                        }
                        Some(Err(e)) => return Err(e).context(HttpSnafu),
                    }
                }
            }
            .await;

            match write_result {
                Ok(()) => {
                    file.flush().await.context(IoSnafu2)?;
                    return Ok(DownloadOutcome {
                        hash: hasher.finalize(),
                        bytes_written: downloaded,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let _ = response.bytes().await;
            attempt += 1;
            let delay = Duration::from_secs(attempt.min(MAX_BACKOFF.as_secs()));
            tracing::warn!(target: LOG_TARGET, url, %status, delay_secs = delay.as_secs(), "retrying download after backoff");
            tokio::select! {
                biased;
                _ = abort.cancelled() => return AbortedSnafu.fail(),
                _ = tokio::time::sleep(delay) => {}
            }
            continue;
        }

        return PermanentStatusSnafu { status: status.as_u16() }.fail();
    }
}

fn content_range_matches(headers: &reqwest::header::HeaderMap, expected_start: u64) -> bool {
    let Some(value) = headers.get(CONTENT_RANGE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    // Expected shape: "bytes <start>-<end>/<total>".
    value
        .strip_prefix("bytes ")
        .and_then(|rest| rest.split('-').next())
        .and_then(|start| start.parse::<u64>().ok())
        .map(|start| start == expected_start)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_matches_expected_start() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_RANGE, "bytes 100-999/1000".parse().unwrap());
        assert!(content_range_matches(&headers, 100));
        assert!(!content_range_matches(&headers, 50));
    }

    #[test]
    fn missing_content_range_never_matches() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(!content_range_matches(&headers, 0));
    }
}
