use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use reqwest::Client;
use reqwest::redirect::Policy;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::util::{format_speed, progress_percent, transfer_bar};

pub const CHUNK_SIZE: usize = 1024;
const USER_AGENT: &str = concat!("bepinex-patcher/", env!("CARGO_PKG_VERSION"));

/// Asked after a failed attempt; `true` restarts the download from byte zero.
pub type RetryPrompt<'a> = &'a mut dyn FnMut(&str) -> bool;

/// One in-flight transfer.
#[derive(Clone, Debug)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub chunk_size: usize,
    pub total: u64,
    pub written: u64,
}

impl DownloadTask {
    /// Number of chunks the progress display counts towards.
    pub fn expected_chunks(&self) -> u64 {
        self.total / self.chunk_size as u64
    }

    pub fn percent(&self) -> f32 {
        progress_percent(self.written, Some(self.total))
    }
}

#[derive(Clone, Debug)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    pub attempts: u32,
}

#[derive(Clone, Debug)]
pub enum FetchOutcome {
    Completed(DownloadReport),
    Abandoned { attempts: u32, last_error: String },
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .redirect(Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    /// Download `url` to `dest`, retrying from scratch for as long as `retry` says so.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        label: &str,
        retry: RetryPrompt<'_>,
    ) -> FetchOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            info!("fetch: downloading {label} (attempt {attempts}) from {url}");
            let bar = transfer_bar(0, label);
            let result = self
                .download_to_path(url, dest, |task, speed| {
                    bar.set_length(task.total);
                    bar.set_position(task.written);
                    bar.set_message(speed.to_owned());
                })
                .await;

            match result {
                Ok(mut report) => {
                    bar.finish();
                    report.attempts = attempts;
                    info!(
                        "fetch: completed {label}: {} bytes to {} (sha256 {})",
                        report.bytes,
                        report.path.display(),
                        report.sha256
                    );
                    return FetchOutcome::Completed(report);
                }
                Err(err) => {
                    bar.abandon();
                    error!("fetch: attempt {attempts} for {url} failed: {err}");
                    if !retry(err.as_str()) {
                        warn!("fetch: {label} download abandoned after {attempts} attempt(s)");
                        if fs::metadata(dest).await.is_ok()
                            && let Err(err) = fs::remove_file(dest).await
                        {
                            warn!("fetch: failed to remove partial {}: {err}", dest.display());
                        }
                        return FetchOutcome::Abandoned {
                            attempts,
                            last_error: err,
                        };
                    }
                    info!("fetch: retrying {label} from byte zero");
                }
            }
        }
    }

    /// Stream a response body into `dest` in fixed-size chunks.
    ///
    /// The destination is truncated before the first byte is written, so a
    /// retried call never mixes data from two attempts. `progress` receives the
    /// task state and a speed string roughly five times a second.
    pub async fn download_to_path<F>(
        &self,
        url: &str,
        dest: &Path,
        mut progress: F,
    ) -> Result<DownloadReport, String>
    where
        F: FnMut(&DownloadTask, &str),
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("download request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("download status error: {e}"))?;

        let total = response
            .content_length()
            .ok_or("response is missing a Content-Length header")?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create download dir: {e}"))?;
        }
        let mut file = File::create(dest)
            .await
            .map_err(|e| format!("failed to create file: {e}"))?;

        let mut task = DownloadTask {
            url: url.to_owned(),
            dest: dest.to_path_buf(),
            chunk_size: CHUNK_SIZE,
            total,
            written: 0,
        };
        debug!(
            "fetch: {} bytes expected from {} in ~{} chunks",
            task.total,
            task.url,
            task.expected_chunks()
        );

        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut last_tick = Instant::now();
        let mut last_bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("stream error: {e}"))?;
            for piece in chunk.chunks(task.chunk_size) {
                file.write_all(piece)
                    .await
                    .map_err(|e| format!("write error: {e}"))?;
                hasher.update(piece);
                task.written += piece.len() as u64;
            }

            let since = last_tick.elapsed().as_secs_f32();
            if since > 0.2 {
                let speed = (task.written - last_bytes) as f32 / since;
                progress(&task, &format_speed(speed));
                last_tick = Instant::now();
                last_bytes = task.written;
            }
        }

        // Final callback.
        progress(&task, "0 B/s");

        file.flush()
            .await
            .map_err(|e| format!("flush error: {e}"))?;

        if task.written < task.total {
            return Err(format!(
                "download incomplete: received {} of {} bytes ({:.0}%)",
                task.written,
                task.total,
                task.percent()
            ));
        }

        Ok(DownloadReport {
            path: task.dest,
            bytes: task.written,
            sha256: format!("{:x}", hasher.finalize()),
            attempts: 1,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{http_response, serve, spawn};
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn counts_expected_chunks() {
        let task = DownloadTask {
            url: "http://x/a.zip".into(),
            dest: PathBuf::from("a.zip"),
            chunk_size: CHUNK_SIZE,
            total: 10_240 + 10,
            written: 5_125,
        };
        assert_eq!(task.expected_chunks(), 10);
        assert_eq!(task.percent(), 50.0);
    }

    #[tokio::test]
    async fn retry_after_truncated_body_leaves_only_the_second_attempt() {
        let full = vec![b'y'; 3_000];
        let url = spawn(vec![
            http_response(&[b'x'; 100], Some(4_096)),
            http_response(&full, Some(full.len())),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("patch.zip");

        let mut prompts = Vec::new();
        let outcome = NetworkClient::new()
            .fetch(&url, &dest, "stable release", &mut |err: &str| {
                prompts.push(err.to_owned());
                true
            })
            .await;

        let FetchOutcome::Completed(report) = outcome else {
            panic!("expected completed download, got {outcome:?}");
        };
        assert_eq!(report.attempts, 2);
        assert_eq!(report.bytes, 3_000);
        assert_eq!(prompts.len(), 1);
        assert_eq!(std::fs::read(&dest).unwrap(), full);
    }

    #[tokio::test]
    async fn connection_error_then_success_yields_one_complete_file() {
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = reserved.local_addr().unwrap();
        drop(reserved);
        let url = format!("http://{addr}/BepInEx.zip");

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("patch.zip");
        std::fs::write(&dest, vec![b's'; 5_000]).unwrap();

        let body = vec![b'n'; 1_500];
        let response = http_response(&body, Some(body.len()));
        let mut answered = 0;
        let outcome = NetworkClient::new()
            .fetch(&url, &dest, "development build", &mut |_err: &str| {
                answered += 1;
                let listener = std::net::TcpListener::bind(addr).unwrap();
                listener.set_nonblocking(true).unwrap();
                let listener = TcpListener::from_std(listener).unwrap();
                tokio::spawn(serve(listener, vec![response.clone()]));
                true
            })
            .await;

        assert!(matches!(outcome, FetchOutcome::Completed(ref r) if r.attempts == 2));
        assert_eq!(answered, 1);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn declining_retry_abandons_and_removes_partial_file() {
        let url = spawn(vec![http_response(&[b'x'; 10], Some(1_000))]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("patch.zip");

        let outcome = NetworkClient::new()
            .fetch(&url, &dest, "stable release", &mut |_err: &str| false)
            .await;

        match outcome {
            FetchOutcome::Abandoned {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 1);
                assert!(!last_error.is_empty());
            }
            other => panic!("expected abandon, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn abandon_survives_a_destination_it_cannot_remove() {
        let url = spawn(vec![http_response(b"abc", Some(3))]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("patch.zip");
        std::fs::create_dir(&dest).unwrap();

        let outcome = NetworkClient::new()
            .fetch(&url, &dest, "development build", &mut |_err: &str| false)
            .await;

        match outcome {
            FetchOutcome::Abandoned { last_error, .. } => {
                assert!(last_error.contains("failed to create file"));
            }
            other => panic!("expected abandon, got {other:?}"),
        }
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn missing_content_length_is_an_error() {
        let url = spawn(vec![http_response(b"no length here", None)]).await;
        let dir = tempfile::tempdir().unwrap();

        let err = NetworkClient::new()
            .download_to_path(&url, &dir.path().join("a.zip"), |_, _| {})
            .await
            .unwrap_err();
        assert!(err.contains("Content-Length"));
    }

    #[tokio::test]
    async fn reports_digest_of_written_bytes() {
        let url = spawn(vec![http_response(b"abc", Some(3))]).await;
        let dir = tempfile::tempdir().unwrap();

        let report = NetworkClient::new()
            .download_to_path(&url, &dir.path().join("a.zip"), |_, _| {})
            .await
            .unwrap();
        assert_eq!(
            report.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
