//! User-facing transfer operations built on s5cmd.
//!
//! Each operation validates and normalizes its locators, resolves the s5cmd
//! executable, and supervises one subprocess on a blocking task so pipe
//! reads never stall the async runtime.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::{self, TransferBatch};
use crate::config::RunnerConfig;
use crate::download::{Downloader, build_http_client};
use crate::error::{Error, Result};
use crate::listing::{Listing, parse_listing};
use crate::locator::Locator;
use crate::process::{ProcessHandle, launch};
use crate::progress::{NoProgress, ProgressSink, drive};
use crate::tool::{HttpInstaller, NoInstall, S5CMD_MIRROR, ToolInstaller, ToolResolver};

/// How a run's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reporting {
    /// s5cmd writes straight to our stdout/stderr.
    Passthrough,
    /// Output is captured and summarized into samples at this interval.
    Sampled(Duration),
}

impl Reporting {
    /// Checks that a sampled interval is positive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero interval.
    pub fn validate(self) -> Result<()> {
        match self {
            Self::Sampled(interval) => check_interval(interval),
            Self::Passthrough => Ok(()),
        }
    }
}

fn check_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        Err(Error::Config("report interval must be positive".to_string()))
    } else {
        Ok(())
    }
}

/// An informational adjustment or warning. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// A local directory source was given a trailing `/`.
    LocalSourceSlashAppended {
        /// The adjusted source.
        adjusted: String,
    },
    /// An object-storage source was given a trailing `/*` pattern.
    ObjectSourcePatternAppended {
        /// The adjusted source.
        adjusted: String,
    },
    /// An object-storage destination was given a trailing `/`.
    ObjectDestinationSlashAppended {
        /// The adjusted destination.
        adjusted: String,
    },
    /// A single file will be stored under the literal destination name.
    UploadedAsFileName {
        /// Local file being uploaded.
        source: String,
        /// Destination it will be stored as.
        destination: String,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalSourceSlashAppended { adjusted } => write!(
                f,
                "local source path does not end with a slash; using {adjusted}"
            ),
            Self::ObjectSourcePatternAppended { adjusted } => write!(
                f,
                "S3 source path does not end with a pattern; using {adjusted}"
            ),
            Self::ObjectDestinationSlashAppended { adjusted } => write!(
                f,
                "S3 destination path does not end with a slash; using {adjusted}"
            ),
            Self::UploadedAsFileName {
                source,
                destination,
            } => write!(
                f,
                "'{source}' is being uploaded as a file named '{destination}' instead of into a folder"
            ),
        }
    }
}

/// Result of a successful operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Output lines observed, when the run was sampled.
    pub lines: Option<u64>,
    /// Advisories raised while preparing the run.
    pub advisories: Vec<Advisory>,
}

impl RunOutcome {
    fn new(lines: Option<u64>, advisories: Vec<Advisory>) -> Self {
        for advisory in &advisories {
            log::warn!("{advisory}");
        }
        Self { lines, advisories }
    }
}

/// Normalizes `sync` locators so s5cmd copies directory contents.
///
/// Applying it to its own output changes nothing.
#[must_use]
pub fn normalize_sync(source: &Locator, destination: &Locator) -> (Locator, Locator, Vec<Advisory>) {
    let mut advisories = Vec::new();

    let source = match source {
        Locator::Local(path) if Path::new(path).is_dir() && !source.has_trailing_separator() => {
            let adjusted = format!("{path}/");
            advisories.push(Advisory::LocalSourceSlashAppended {
                adjusted: adjusted.clone(),
            });
            Locator::Local(adjusted)
        }
        Locator::ObjectStorage(uri) if !uri.ends_with("/*") => {
            let adjusted = format!("{}/*", uri.trim_end_matches('/'));
            advisories.push(Advisory::ObjectSourcePatternAppended {
                adjusted: adjusted.clone(),
            });
            Locator::ObjectStorage(adjusted)
        }
        other => other.clone(),
    };

    let destination = match destination {
        Locator::ObjectStorage(uri) if !destination.has_trailing_separator() => {
            let adjusted = format!("{uri}/");
            advisories.push(Advisory::ObjectDestinationSlashAppended {
                adjusted: adjusted.clone(),
            });
            Locator::ObjectStorage(adjusted)
        }
        other => other.clone(),
    };

    (source, destination, advisories)
}

/// Warns when a file with an extension goes to a destination that looks
/// like a folder but lacks a trailing separator.
///
/// A destination whose final segment has an extension is taken as an
/// intended file name, so `cp data.csv s3://b/other.csv` stays silent.
fn upload_advisory(source: &Locator, destination: &Locator) -> Option<Advisory> {
    let path = source.local_path()?;
    let source_has_extension = path.is_file() && path.extension().is_some();
    let destination_name = destination.base_name();
    let looks_like_folder = !destination.has_trailing_separator()
        && !destination_name.is_empty()
        && !destination_name.contains('.');
    (source_has_extension && looks_like_folder).then(|| Advisory::UploadedAsFileName {
        source: source.to_string(),
        destination: destination.to_string(),
    })
}

fn check_status(status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::ToolFailed {
            code: status.code(),
        })
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A materialized input removed when the run that needed it ends.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::error!("Failed to remove scratch file {}: {e}", self.0.display());
            }
        }
    }
}

/// Moves a file, falling back to copy and delete across filesystems.
async fn move_local(from: &Path, to: &Path) -> Result<PathBuf> {
    let target = if to.is_dir() || to.as_os_str().to_string_lossy().ends_with(std::path::is_separator)
    {
        match from.file_name() {
            Some(name) => to.join(name),
            None => to.to_path_buf(),
        }
    } else {
        to.to_path_buf()
    };

    if tokio::fs::rename(from, &target).await.is_err() {
        tokio::fs::copy(from, &target).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(target)
}

/// Runs transfer operations through s5cmd.
#[derive(Clone)]
pub struct Runner {
    config: RunnerConfig,
    tool: Arc<ToolResolver>,
    downloader: Downloader,
    progress: Arc<dyn ProgressSink>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner from configuration.
    ///
    /// Runners with the same `tool_path` share one [`ToolResolver`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let http = build_http_client()?;
        let installer: Arc<dyn ToolInstaller> = if config.auto_install {
            Arc::new(HttpInstaller::with_client(http.clone(), S5CMD_MIRROR))
        } else {
            Arc::new(NoInstall)
        };
        let tool = ToolResolver::shared(config.tool_path.clone(), installer);
        let downloader = Downloader::new(http, config.scratch_dir.clone());
        Ok(Self::with_parts(config, tool, downloader))
    }

    /// Creates a runner from explicit parts, sharing `tool` with other
    /// runners.
    #[must_use]
    pub fn with_parts(config: RunnerConfig, tool: Arc<ToolResolver>, downloader: Downloader) -> Self {
        Self {
            config,
            tool,
            downloader,
            progress: Arc::new(NoProgress),
        }
    }

    /// Sets the sink that receives sampled progress.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the runner configuration.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Launches s5cmd with `args` and hands the handle to `consume` on a
    /// blocking task. If the cached executable turns out to be gone, the
    /// resolver is invalidated and the launch retried once.
    async fn supervise<T, F>(&self, args: Vec<String>, capture: bool, consume: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&mut ProcessHandle) -> Result<T> + Send + Sync + 'static,
    {
        let consume = Arc::new(consume);
        let mut retried = false;
        loop {
            let executable = self.tool.resolve().await?;
            let args = args.clone();
            let consume = Arc::clone(&consume);
            let result = tokio::task::spawn_blocking(move || {
                let mut handle = launch(&executable, &args, capture)?;
                consume(&mut handle)
            })
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

            match result {
                Err(Error::ToolUnavailable { .. }) if !retried => {
                    retried = true;
                    self.tool.invalidate().await;
                }
                other => return other,
            }
        }
    }

    /// Runs s5cmd and checks its exit status, returning the observed line
    /// count for sampled runs.
    async fn run_tool(
        &self,
        args: Vec<String>,
        reporting: Reporting,
        label: &'static str,
        expected_total: Option<u64>,
    ) -> Result<Option<u64>> {
        log::debug!("s5cmd {}", args.join(" "));
        match reporting {
            Reporting::Passthrough => {
                let status = self.supervise(args, false, ProcessHandle::wait).await?;
                check_status(status)?;
                Ok(None)
            }
            Reporting::Sampled(interval) => {
                let sink = Arc::clone(&self.progress);
                let summary = self
                    .supervise(args, true, move |handle| {
                        drive(handle, label, expected_total, interval, sink.as_ref())
                    })
                    .await?;
                check_status(summary.status)?;
                Ok(Some(summary.observed))
            }
        }
    }

    /// Copies a single source to a destination.
    ///
    /// HTTP(S) sources are downloaded to scratch first, then uploaded or
    /// moved into place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] when both sides are HTTP(S)
    /// URLs, [`Error::Download`] if fetching the source fails, and
    /// [`Error::ToolFailed`] if s5cmd fails.
    pub async fn cp(&self, source: &str, destination: &str, reporting: Reporting) -> Result<RunOutcome> {
        reporting.validate()?;
        let source = Locator::parse(source);
        let destination = Locator::parse(destination);

        if let Locator::Remote(_) = source {
            if let Locator::Remote(_) = destination {
                return Err(Error::UnsupportedOperation(format!(
                    "cannot copy between two http(s) URLs: {source} -> {destination}"
                )));
            }
            let local = self.downloader.fetch(&source).await?;
            let local_locator = Locator::Local(path_arg(&local));
            let advisories = upload_advisory(&local_locator, &destination)
                .into_iter()
                .collect();
            if let Locator::ObjectStorage(uri) = &destination {
                let args = vec!["cp".to_string(), path_arg(&local), uri.clone()];
                let lines = self.run_tool(args, reporting, "cp", Some(1)).await?;
                drop(ScratchFile(local));
                return Ok(RunOutcome::new(lines, advisories));
            }
            let target = move_local(&local, Path::new(destination.as_str())).await?;
            log::info!("Moved {} to {}", local.display(), target.display());
            return Ok(RunOutcome::new(None, advisories));
        }

        let advisories = upload_advisory(&source, &destination).into_iter().collect();
        let args = vec![
            "cp".to_string(),
            source.to_string(),
            destination.to_string(),
        ];
        let lines = self.run_tool(args, reporting, "cp", None).await?;
        Ok(RunOutcome::new(lines, advisories))
    }

    /// Moves objects to, from or within object storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] when neither side is object
    /// storage.
    pub async fn mv(&self, source: &str, destination: &str, reporting: Reporting) -> Result<RunOutcome> {
        reporting.validate()?;
        let source = Locator::parse(source);
        let destination = Locator::parse(destination);
        if !source.is_object_storage() && !destination.is_object_storage() {
            return Err(Error::UnsupportedOperation(format!(
                "mv needs an s3:// source or destination, got {source} -> {destination}"
            )));
        }

        let args = vec![
            "mv".to_string(),
            source.to_string(),
            destination.to_string(),
        ];
        let lines = self.run_tool(args, reporting, "mv", None).await?;
        Ok(RunOutcome::new(lines, Vec::new()))
    }

    /// Synchronizes a folder or prefix to a destination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolFailed`] if s5cmd fails.
    pub async fn sync(&self, source: &str, destination: &str, reporting: Reporting) -> Result<RunOutcome> {
        reporting.validate()?;
        let (source, destination, advisories) =
            normalize_sync(&Locator::parse(source), &Locator::parse(destination));
        let args = vec![
            "sync".to_string(),
            source.to_string(),
            destination.to_string(),
        ];
        let lines = self.run_tool(args, reporting, "sync", None).await?;
        Ok(RunOutcome::new(lines, advisories))
    }

    /// Downloads every source into `destination_dir` through one generated
    /// command file. The file is removed afterwards whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for an empty list and
    /// [`Error::ToolFailed`] if s5cmd fails.
    pub async fn download_list<S: AsRef<str>>(
        &self,
        sources: &[S],
        destination_dir: &str,
        reporting: Reporting,
    ) -> Result<RunOutcome> {
        reporting.validate()?;
        let batch = TransferBatch::into_directory(sources, destination_dir)?;
        let command_file = batch::generate(&batch, &self.config.scratch_dir)?;
        log::info!(
            "Downloading {} files to {destination_dir} using {}",
            batch.len(),
            command_file.path().display()
        );

        let args = vec!["run".to_string(), path_arg(command_file.path())];
        let result = self
            .run_tool(args, reporting, "download", Some(batch.len() as u64))
            .await;

        if let Err(e) = command_file.remove() {
            log::error!("Failed to remove command file: {e}");
        }
        Ok(RunOutcome::new(result?, Vec::new()))
    }

    /// Runs an existing command file given as a local path, HTTP(S) URL, or
    /// S3 URI. Remote files are materialized in scratch and removed after.
    ///
    /// # Errors
    ///
    /// Returns an I/O not-found error for a missing local file,
    /// [`Error::Download`] if a remote file cannot be fetched, and
    /// [`Error::ToolFailed`] if s5cmd fails.
    pub async fn run_file(&self, command_file: &str, reporting: Reporting) -> Result<RunOutcome> {
        reporting.validate()?;
        let locator = Locator::parse(command_file);
        let (path, _scratch) = match &locator {
            Locator::Local(path) => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("command file not found: {}", path.display()),
                    )));
                }
                (path, None)
            }
            Locator::Remote(_) => {
                let path = self.downloader.fetch(&locator).await?;
                (path.clone(), Some(ScratchFile(path)))
            }
            Locator::ObjectStorage(uri) => {
                let path = self.downloader.scratch_path(&locator)?;
                let scratch = ScratchFile(path.clone());
                let args = vec!["cp".to_string(), uri.clone(), path_arg(&path)];
                self.run_tool(args, Reporting::Passthrough, "cp", None)
                    .await
                    .map_err(|e| Error::Download {
                        url: uri.clone(),
                        reason: e.to_string(),
                    })?;
                (path, Some(scratch))
            }
        };

        let args = vec!["run".to_string(), path_arg(&path)];
        let lines = self.run_tool(args, reporting, "run", None).await?;
        Ok(RunOutcome::new(lines, Vec::new()))
    }

    /// Lists objects under an S3 URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] for non-S3 locators and
    /// [`Error::StreamRead`] if the output cannot be read.
    pub async fn ls(&self, uri: &str, interval: Duration) -> Result<Listing> {
        check_interval(interval)?;
        let locator = Locator::parse(uri);
        if !locator.is_object_storage() {
            return Err(Error::UnsupportedOperation(format!(
                "ls expects an s3:// URI, got {locator}"
            )));
        }
        let sink = Arc::clone(&self.progress);
        self.supervise(vec!["ls".to_string(), locator.to_string()], true, move |handle| {
            parse_listing(handle, interval, sink.as_ref())
        })
        .await
    }
}
