//! Locating and installing the s5cmd executable.
//!
//! The resolved path is process-wide state: the first successful resolution
//! is cached and only dropped when a caller reports it has gone bad. The
//! cache sits behind an async mutex so concurrent first calls install once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::download::{build_http_client, fetch_to_path};
use crate::error::{Error, Result};
use crate::process::is_runnable;

/// Base URL of the prebuilt s5cmd release mirror.
pub const S5CMD_MIRROR: &str = "https://huggingface.co/kiriyamaX/s5cmd-backup/resolve/main";

/// Returns the release asset path for the given OS and architecture.
#[must_use]
pub fn release_asset(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("linux", "x86_64") => Some("s5cmd_2.2.2_Linux-64bit/s5cmd"),
        ("linux", "aarch64") => Some("s5cmd_2.2.2_Linux-arm64/s5cmd"),
        ("windows", "x86_64") => Some("s5cmd_2.2.2_Windows-amd64/s5cmd.exe"),
        _ => None,
    }
}

/// Returns the platform-specific executable file name.
#[must_use]
pub const fn binary_name() -> &'static str {
    if cfg!(windows) { "s5cmd.exe" } else { "s5cmd" }
}

/// Acquires the s5cmd executable when it is missing.
#[async_trait]
pub trait ToolInstaller: Send + Sync {
    /// Installs the executable at `path`.
    async fn install(&self, path: &Path) -> Result<()>;
}

/// An installer that never installs anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstall;

#[async_trait]
impl ToolInstaller for NoInstall {
    async fn install(&self, path: &Path) -> Result<()> {
        Err(Error::ToolUnavailable {
            path: path.to_path_buf(),
        })
    }
}

/// Downloads a prebuilt s5cmd release for the current platform.
#[derive(Debug, Clone)]
pub struct HttpInstaller {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInstaller {
    /// Creates an installer using the default release mirror.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(build_http_client()?, S5CMD_MIRROR))
    }

    /// Creates an installer with a custom client and mirror base URL.
    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Returns the download URL for this platform, if one exists.
    #[must_use]
    pub fn url_for_current_platform(&self) -> Option<String> {
        release_asset(std::env::consts::OS, std::env::consts::ARCH)
            .map(|asset| format!("{}/{asset}", self.base_url.trim_end_matches('/')))
    }
}

#[async_trait]
impl ToolInstaller for HttpInstaller {
    async fn install(&self, path: &Path) -> Result<()> {
        let Some(url) = self.url_for_current_platform() else {
            log::error!(
                "No s5cmd release for {}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            );
            return Err(Error::ToolUnavailable {
                path: path.to_path_buf(),
            });
        };

        log::info!("Downloading s5cmd from {url}");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        fetch_to_path(&self.http, &url, path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
        }

        log::info!("s5cmd installed at {}", path.display());
        Ok(())
    }
}

/// Resolvers shared by every runner in the process, keyed by tool path.
static RESOLVERS: LazyLock<std::sync::Mutex<HashMap<PathBuf, Arc<ToolResolver>>>> =
    LazyLock::new(|| std::sync::Mutex::new(HashMap::new()));

/// Shared, lazily established location of the s5cmd executable.
pub struct ToolResolver {
    path: PathBuf,
    installer: Arc<dyn ToolInstaller>,
    resolved: Mutex<Option<PathBuf>>,
}

impl std::fmt::Debug for ToolResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolResolver")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ToolResolver {
    /// Creates a resolver for the executable at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, installer: Arc<dyn ToolInstaller>) -> Self {
        Self {
            path: path.into(),
            installer,
            resolved: Mutex::new(None),
        }
    }

    /// Returns the process-wide resolver for `path`, creating it with
    /// `installer` on first use.
    ///
    /// Later callers share the first resolver and its installer, so one
    /// tool path is installed at most once per process.
    #[must_use]
    pub fn shared(path: impl Into<PathBuf>, installer: Arc<dyn ToolInstaller>) -> Arc<Self> {
        let path = path.into();
        let mut resolvers = RESOLVERS.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            resolvers
                .entry(path.clone())
                .or_insert_with(|| Arc::new(Self::new(path, installer))),
        )
    }

    /// Returns the configured executable path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a runnable executable path, installing it once if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolUnavailable`] if the executable is still missing
    /// after one installation attempt.
    pub async fn resolve(&self) -> Result<PathBuf> {
        let mut resolved = self.resolved.lock().await;
        if let Some(path) = resolved.as_ref() {
            return Ok(path.clone());
        }

        if !is_runnable(&self.path) {
            log::warn!(
                "s5cmd is not available at {}, attempting to install it",
                self.path.display()
            );
            if let Err(e) = self.installer.install(&self.path).await {
                log::error!("Failed to install s5cmd: {e}");
            }
            if !is_runnable(&self.path) {
                log::error!("Failed to ensure s5cmd is available");
                return Err(Error::ToolUnavailable {
                    path: self.path.clone(),
                });
            }
        }

        *resolved = Some(self.path.clone());
        Ok(self.path.clone())
    }

    /// Forgets the cached path so the next [`resolve`](Self::resolve)
    /// checks (and if needed installs) again.
    pub async fn invalidate(&self) {
        *self.resolved.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts calls and optionally writes an executable stub.
    struct StubInstaller {
        calls: AtomicUsize,
        creates: bool,
        delay: std::time::Duration,
    }

    impl StubInstaller {
        fn new(creates: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                creates,
                delay: std::time::Duration::ZERO,
            }
        }

        fn slow(delay: std::time::Duration) -> Self {
            Self {
                delay,
                ..Self::new(true)
            }
        }
    }

    #[async_trait]
    impl ToolInstaller for StubInstaller {
        async fn install(&self, path: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.creates {
                std::fs::write(path, "#!/bin/sh\nexit 0\n")?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn release_assets_cover_supported_platforms() {
        assert!(release_asset("linux", "x86_64").is_some());
        assert!(release_asset("linux", "aarch64").is_some());
        assert!(release_asset("windows", "x86_64").unwrap().ends_with(".exe"));
        assert!(release_asset("macos", "riscv64").is_none());
    }

    #[test]
    fn installer_url_joins_mirror() {
        let installer = HttpInstaller::with_client(reqwest::Client::new(), "https://mirror.test/");
        if let Some(url) = installer.url_for_current_platform() {
            assert!(url.starts_with("https://mirror.test/s5cmd_2.2.2_"));
        }
    }

    #[tokio::test]
    async fn installs_once_and_caches() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(StubInstaller::new(true));
        let resolver = ToolResolver::new(dir.path().join(binary_name()), installer.clone());

        let first = resolver.resolve().await.unwrap();
        let second = resolver.resolve().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(installer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_calls_install_once() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(StubInstaller::new(true));
        let resolver = Arc::new(ToolResolver::new(
            dir.path().join(binary_name()),
            installer.clone(),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve().await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            assert!(task.unwrap().is_ok());
        }
        assert_eq!(installer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_install_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(StubInstaller::new(false));
        let resolver = ToolResolver::new(dir.path().join(binary_name()), installer.clone());

        let result = resolver.resolve().await;
        assert!(matches!(result, Err(Error::ToolUnavailable { .. })));
        assert_eq!(installer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_install_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let resolver = ToolResolver::new(dir.path().join(binary_name()), Arc::new(NoInstall));
        assert!(matches!(
            resolver.resolve().await,
            Err(Error::ToolUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn invalidate_triggers_reinstall() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(StubInstaller::new(true));
        let resolver = ToolResolver::new(dir.path().join(binary_name()), installer.clone());

        let path = resolver.resolve().await.unwrap();
        std::fs::remove_file(&path).unwrap();
        // Cached value is returned without re-checking.
        assert_eq!(resolver.resolve().await.unwrap(), path);

        resolver.invalidate().await;
        resolver.resolve().await.unwrap();
        assert_eq!(installer.calls.load(Ordering::SeqCst), 2);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn shared_resolvers_install_once_per_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(binary_name());
        let installer = Arc::new(StubInstaller::slow(std::time::Duration::from_millis(100)));

        let a = ToolResolver::shared(&path, installer.clone());
        let b = ToolResolver::shared(&path, installer.clone());
        assert!(Arc::ptr_eq(&a, &b));

        let (first, second) = tokio::join!(a.resolve(), b.resolve());
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(installer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shared_resolvers_are_keyed_by_path() {
        let dir = TempDir::new().unwrap();
        let a = ToolResolver::shared(dir.path().join("a"), Arc::new(NoInstall));
        let b = ToolResolver::shared(dir.path().join("b"), Arc::new(NoInstall));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.path(), dir.path().join("b"));
    }
}
