//! Materializing remote locators into local scratch storage.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::locator::Locator;

/// Builds a configured HTTP client for downloads.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Returns the `.part` file path for a given final path.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Streams `url` into `path` using atomic `.part` file semantics.
///
/// # Errors
///
/// Returns [`Error::Download`] on HTTP or write failures; no partial file is
/// left behind.
pub async fn fetch_to_path(http: &reqwest::Client, url: &str, path: &Path) -> Result<()> {
    let download_error = |reason: String| Error::Download {
        url: url.to_string(),
        reason,
    };

    let response = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| download_error(e.to_string()))?;

    let pp = part_path(path);
    let result = async {
        let mut file = tokio::fs::File::create(&pp).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| download_error(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&pp, path).await?;
        Ok::<(), Error>(())
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&pp).await;
        return Err(match e {
            Error::Download { .. } => e,
            other => download_error(other.to_string()),
        });
    }
    Ok(())
}

/// Downloads HTTP(S) locators into a scratch directory.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
    scratch_dir: PathBuf,
}

impl Downloader {
    /// Creates a downloader writing into `scratch_dir`.
    #[must_use]
    pub fn new(http: reqwest::Client, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Returns the scratch directory downloads are written to.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Returns the scratch path a locator materializes to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] if the locator has no final path segment
    /// to name the file after.
    pub fn scratch_path(&self, locator: &Locator) -> Result<PathBuf> {
        let name = locator.base_name();
        if name.is_empty() {
            return Err(Error::Download {
                url: locator.to_string(),
                reason: "locator has no file name".to_string(),
            });
        }
        Ok(self.scratch_dir.join(name))
    }

    /// Fetches a remote locator and returns the local path it was saved to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] if `locator` is not an HTTP(S) URL or the
    /// transfer fails.
    pub async fn fetch(&self, locator: &Locator) -> Result<PathBuf> {
        let Locator::Remote(url) = locator else {
            return Err(Error::Download {
                url: locator.to_string(),
                reason: "only http(s) locators can be downloaded directly".to_string(),
            });
        };
        let path = self.scratch_path(locator)?;
        log::info!("Downloading {url} to {}", path.display());
        fetch_to_path(&self.http, url, &path).await?;
        Ok(path)
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::serve;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fetch_renames_part_file_on_success() {
        let base = serve("200 OK", b"cp s3://b/a /tmp/a\n").await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cmds.txt");

        fetch_to_path(&reqwest::Client::new(), &format!("{base}/cmds.txt"), &path)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "cp s3://b/a /tmp/a\n");
        assert!(!part_path(&path).exists());
    }

    #[tokio::test]
    async fn http_error_status_leaves_nothing_behind() {
        let base = serve("404 Not Found", b"missing").await;
        let dir = TempDir::new().unwrap();
        let dl = Downloader::new(reqwest::Client::new(), dir.path());

        let result = dl.fetch(&Locator::parse(&format!("{base}/cmds.txt"))).await;

        assert!(matches!(result, Err(Error::Download { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn downloader_saves_under_final_segment() {
        let base = serve("200 OK", b"payload").await;
        let dir = TempDir::new().unwrap();
        let dl = Downloader::new(reqwest::Client::new(), dir.path());

        let path = dl
            .fetch(&Locator::parse(&format!("{base}/files/data.bin?token=x")))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("data.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn part_path_appends_extension() {
        assert_eq!(
            part_path(Path::new("foo/bar.zip")),
            PathBuf::from("foo/bar.zip.part")
        );
        assert_eq!(part_path(Path::new("s5cmd")), PathBuf::from("s5cmd.part"));
    }

    #[test]
    fn scratch_path_uses_final_segment() {
        let dir = TempDir::new().unwrap();
        let dl = Downloader::new(reqwest::Client::new(), dir.path());
        let path = dl
            .scratch_path(&Locator::parse("https://example.com/a/cmds.txt?x=1"))
            .unwrap();
        assert_eq!(path, dir.path().join("cmds.txt"));
    }

    #[test]
    fn scratch_path_rejects_directory_urls() {
        let dl = Downloader::new(reqwest::Client::new(), "/tmp");
        let result = dl.scratch_path(&Locator::parse("https://example.com/dir/"));
        assert!(matches!(result, Err(Error::Download { .. })));
    }

    #[tokio::test]
    async fn fetch_rejects_non_remote_locators() {
        let dir = TempDir::new().unwrap();
        let dl = Downloader::new(reqwest::Client::new(), dir.path());
        let result = dl.fetch(&Locator::parse("s3://bucket/key.txt")).await;
        assert!(matches!(result, Err(Error::Download { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unreachable_host_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let dl = Downloader::new(reqwest::Client::new(), dir.path());
        // Port 9 on localhost is the discard service and is closed on CI hosts.
        let result = dl.fetch(&Locator::parse("http://127.0.0.1:9/file.txt")).await;
        assert!(matches!(result, Err(Error::Download { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
