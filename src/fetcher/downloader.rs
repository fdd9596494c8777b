use crate::error::{InstallerError, Result};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub bytes_so_far: u64,
    /// Content length when the server reported one, otherwise 0.
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct FetchedArchive {
    pub path: PathBuf,
    pub url: String,
    pub bytes: u64,
}

pub struct ArchiveDownloader {
    timeout: Duration,
    user_agent: String,
    progress_callback: Option<Box<dyn Fn(FetchProgress) + Send + Sync>>,
    running: Arc<AtomicBool>,
}

impl ArchiveDownloader {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            user_agent: format!("profile-installer/{}", env!("CARGO_PKG_VERSION")),
            progress_callback: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(FetchProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Parse `url` and accept only `https`, `http` and `file`.
    pub fn validate_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|_| InstallerError::InvalidUrl {
            url: url.to_string(),
        })?;

        match parsed.scheme() {
            "https" | "http" | "file" => Ok(parsed),
            _ => Err(InstallerError::InvalidUrl {
                url: url.to_string(),
            }),
        }
    }

    /// Download `url` into `dest`.
    ///
    /// Bytes are streamed into `dest.part`, which is renamed to `dest` only after the
    /// whole body arrived. On failure or cancellation the partial file is removed and
    /// `dest` is left as it was.
    pub fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<FetchedArchive> {
        let parsed = Self::validate_url(url)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallerError::file_op(parent, e))?;
        }

        info!(%url, dest = %dest.display(), "downloading profile archive");

        let bytes = if parsed.scheme() == "file" {
            let source = parsed
                .to_file_path()
                .map_err(|_| InstallerError::InvalidUrl {
                    url: url.to_string(),
                })?;
            let file = fs::File::open(&source).map_err(|e| InstallerError::Network {
                message: format!("cannot open {}: {}", source.display(), e),
            })?;
            let total = file.metadata().map(|m| m.len()).unwrap_or(0);
            self.stream_to_file(file, total, dest)?
        } else {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .user_agent(self.user_agent.as_str())
                .build()?;

            let response = client
                .get(parsed.as_str())
                .send()
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(InstallerError::Network {
                    message: format!("HTTP {} from {}", status, url),
                });
            }

            let total = response.content_length().unwrap_or(0);
            self.stream_to_file(response, total, dest)?
        };

        info!(bytes, "download complete");

        Ok(FetchedArchive {
            path: dest.to_path_buf(),
            url: url.to_string(),
            bytes,
        })
    }

    fn stream_to_file<R: Read>(&self, reader: R, total: u64, dest: &Path) -> Result<u64> {
        let part = part_path(dest);

        match self.write_part(reader, total, &part) {
            Ok(bytes) => {
                fs::rename(&part, dest).map_err(|e| InstallerError::file_op(dest, e))?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&part) {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %part.display(), error = %remove_err, "could not remove partial download");
                    }
                }
                Err(e)
            }
        }
    }

    fn write_part<R: Read>(&self, mut reader: R, total: u64, part: &Path) -> Result<u64> {
        let mut file = fs::File::create(part).map_err(|e| InstallerError::file_op(part, e))?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut bytes_so_far = 0u64;

        self.report(FetchProgress {
            bytes_so_far,
            total,
        });

        loop {
            if !self.is_running() {
                debug!(bytes_so_far, "download cancelled");
                return Err(InstallerError::Cancelled);
            }

            let read = reader.read(&mut buffer).map_err(|e| self.read_error(e))?;
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read])
                .map_err(|e| InstallerError::file_op(part, e))?;
            bytes_so_far += read as u64;

            self.report(FetchProgress {
                bytes_so_far,
                total,
            });
        }

        file.sync_all().map_err(|e| InstallerError::file_op(part, e))?;
        Ok(bytes_so_far)
    }

    fn report(&self, progress: FetchProgress) {
        if let Some(ref callback) = self.progress_callback {
            callback(progress);
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> InstallerError {
        if error.is_timeout() {
            InstallerError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            InstallerError::from(error)
        }
    }

    fn read_error(&self, error: std::io::Error) -> InstallerError {
        if error.kind() == std::io::ErrorKind::TimedOut {
            InstallerError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            InstallerError::Network {
                message: format!("download interrupted: {}", error),
            }
        }
    }
}

impl Default for ArchiveDownloader {
    fn default() -> Self {
        Self::new()
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn test_url_validation() {
        assert!(ArchiveDownloader::validate_url("https://github.com/o/r/archive/main.zip").is_ok());
        assert!(ArchiveDownloader::validate_url("http://localhost:8080/p.zip").is_ok());
        assert!(ArchiveDownloader::validate_url("file:///tmp/p.zip").is_ok());

        assert!(ArchiveDownloader::validate_url("ftp://example.com/p.zip").is_err());
        assert!(ArchiveDownloader::validate_url("not-a-url").is_err());
    }

    #[test]
    fn test_fetch_local_file_reports_progress() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.zip");
        fs::write(&source, vec![7u8; 200_000]).unwrap();
        let dest = temp_dir.path().join("cache").join("profiles.zip");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let downloader = ArchiveDownloader::new().with_progress(move |p| {
            sink.lock().unwrap().push(p);
        });

        let fetched = downloader.fetch_to_file(&file_url(&source), &dest).unwrap();

        assert_eq!(fetched.bytes, 200_000);
        assert_eq!(fs::read(&dest).unwrap().len(), 200_000);
        assert!(!part_path(&dest).exists());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().unwrap().bytes_so_far, 0);
        let last = seen.last().unwrap();
        assert_eq!(last.bytes_so_far, 200_000);
        assert_eq!(last.total, 200_000);
    }

    #[test]
    fn test_missing_local_file_is_network_error() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("profiles.zip");
        let result = ArchiveDownloader::new()
            .fetch_to_file(&file_url(&temp_dir.path().join("nope.zip")), &dest);

        assert!(matches!(result, Err(InstallerError::Network { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn test_cancelled_download_leaves_no_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.zip");
        fs::write(&source, b"data").unwrap();
        let dest = temp_dir.path().join("profiles.zip");
        fs::write(&dest, b"previous").unwrap();

        let downloader = ArchiveDownloader::new();
        downloader.cancel();
        let result = downloader.fetch_to_file(&file_url(&source), &dest);

        assert!(matches!(result, Err(InstallerError::Cancelled)));
        assert!(!part_path(&dest).exists());
        assert_eq!(fs::read(&dest).unwrap(), b"previous");
    }

    /// One-shot HTTP server on a loopback port that answers the first request with `response`.
    fn serve_once(response: &'static [u8]) -> (String, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = stream.read(&mut buffer).unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read]);
            }
            stream.write_all(response).unwrap();
        });
        (format!("http://{}/profiles.zip", addr), handle)
    }

    #[test]
    fn test_connection_refused_is_network_error() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("profiles.zip");
        // nothing listens on a port once its listener is dropped
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let result = ArchiveDownloader::new()
            .with_timeout(Duration::from_secs(5))
            .fetch_to_file(&format!("http://127.0.0.1:{}/profiles.zip", port), &dest);

        assert!(matches!(result, Err(InstallerError::Network { .. })));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_http_error_status_is_network_error() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("profiles.zip");
        let (url, server) = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
        );

        let result = ArchiveDownloader::new()
            .with_timeout(Duration::from_secs(5))
            .fetch_to_file(&url, &dest);
        server.join().unwrap();

        match result {
            Err(InstallerError::Network { message }) => assert!(message.contains("404")),
            other => panic!("expected a network error, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn test_http_body_without_length_reports_zero_total() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("cache").join("profiles.zip");
        let (url, server) = serve_once(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let fetched = ArchiveDownloader::new()
            .with_timeout(Duration::from_secs(5))
            .with_progress(move |p| sink.lock().unwrap().push(p))
            .fetch_to_file(&url, &dest)
            .unwrap();
        server.join().unwrap();

        assert_eq!(fetched.bytes, 11);
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 2);
        assert!(seen.iter().all(|p| p.total == 0));
        assert_eq!(seen.last().unwrap().bytes_so_far, 11);
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/c/profiles.zip")),
            PathBuf::from("/c/profiles.zip.part")
        );
    }

    #[test]
    fn test_builder_configuration() {
        let downloader = ArchiveDownloader::new()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("test-agent");
        assert_eq!(downloader.timeout, Duration::from_secs(5));
        assert_eq!(downloader.user_agent, "test-agent");
        assert!(downloader.is_running());
    }
}
