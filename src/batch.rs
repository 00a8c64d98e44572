//! Transfer requests, batches and the command files s5cmd's `run` consumes.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::locator::{Locator, join_destination};

/// Highest numeric suffix tried before giving up on a unique file name.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// A single source → destination transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source: Locator,
    destination: Locator,
}

impl TransferRequest {
    /// Creates a request from any pair of locators.
    #[must_use]
    pub fn new(source: impl Into<Locator>, destination: impl Into<Locator>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Creates a request copying `source` into `destination_dir`, keeping its
    /// base name.
    #[must_use]
    pub fn into_directory(source: impl Into<Locator>, destination_dir: &str) -> Self {
        let source = source.into();
        let destination = join_destination(destination_dir, &source.base_name());
        Self {
            source,
            destination: Locator::parse(&destination),
        }
    }

    /// Returns the source locator.
    #[must_use]
    pub const fn source(&self) -> &Locator {
        &self.source
    }

    /// Returns the destination locator.
    #[must_use]
    pub const fn destination(&self) -> &Locator {
        &self.destination
    }

    /// Renders this request as one command-file line, without the newline.
    #[must_use]
    pub fn command_line(&self) -> String {
        format!("cp {} {}", self.source, self.destination)
    }
}

/// A non-empty, ordered set of transfer requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferBatch {
    requests: Vec<TransferRequest>,
}

impl TransferBatch {
    /// Builds a batch from explicit requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] if `requests` is empty.
    pub fn new(requests: Vec<TransferRequest>) -> Result<Self> {
        if requests.is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(Self { requests })
    }

    /// Builds a batch copying every source into one destination directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] if `sources` is empty.
    pub fn into_directory<S: AsRef<str>>(sources: &[S], destination_dir: &str) -> Result<Self> {
        Self::new(
            sources
                .iter()
                .map(|s| TransferRequest::into_directory(s.as_ref(), destination_dir))
                .collect(),
        )
    }

    /// Returns the requests in order.
    #[must_use]
    pub fn requests(&self) -> &[TransferRequest] {
        &self.requests
    }

    /// Returns the number of requests (never zero).
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Always false; kept for API symmetry with slices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Returns the batch fingerprint computed over the source locators.
    ///
    /// # Errors
    ///
    /// Never fails for a constructed batch; the `Result` mirrors
    /// [`fingerprint`].
    pub fn fingerprint(&self) -> Result<String> {
        let sources: Vec<&str> = self.requests.iter().map(|r| r.source.as_str()).collect();
        fingerprint(&sources)
    }
}

/// A generated command file, removed from disk when dropped.
#[derive(Debug)]
pub struct CommandFile {
    path: PathBuf,
    created: DateTime<Local>,
    fingerprint: String,
    entries: usize,
    removed: bool,
}

impl CommandFile {
    /// Returns the path of the file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns when the file was generated.
    #[must_use]
    pub const fn created(&self) -> DateTime<Local> {
        self.created
    }

    /// Returns the batch fingerprint embedded in the file name.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns the number of command lines in the file.
    #[must_use]
    pub const fn entries(&self) -> usize {
        self.entries
    }

    /// Removes the file now, reporting the outcome instead of logging it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file exists but cannot be removed.
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        remove_if_present(&self.path)
    }
}

impl Drop for CommandFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match remove_if_present(&self.path) {
            Ok(()) => log::debug!("Removed command file {}", self.path.display()),
            Err(e) => log::error!(
                "Failed to remove command file {}: {e}",
                self.path.display()
            ),
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Returns the candidate file name for the `attempt`-th try.
fn command_file_name(date: &str, fingerprint: &str, attempt: usize) -> String {
    if attempt == 0 {
        format!("s5cmd_commands_{date}_{fingerprint}.txt")
    } else {
        format!("s5cmd_commands_{date}_{fingerprint}_{attempt}.txt")
    }
}

/// Creates a file that did not exist before, adding a numeric suffix on
/// name clashes.
fn create_unique(
    scratch_dir: &Path,
    date: &str,
    fingerprint: &str,
) -> Result<(PathBuf, fs::File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = scratch_dir.join(command_file_name(date, fingerprint, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free command file name for {fingerprint} in {}",
            scratch_dir.display()
        ),
    )))
}

/// Writes `batch` as an s5cmd command file inside `scratch_dir`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written. A partially
/// written file is removed before returning.
pub fn generate(batch: &TransferBatch, scratch_dir: &Path) -> Result<CommandFile> {
    let fingerprint = batch.fingerprint()?;
    let created = Local::now();
    let date = created.format("%Y%m%d-%H%M%S").to_string();

    let (path, file) = create_unique(scratch_dir, &date, &fingerprint)?;
    // From here on the guard removes the file on any early return.
    let command_file = CommandFile {
        path,
        created,
        fingerprint,
        entries: batch.len(),
        removed: false,
    };

    let mut writer = BufWriter::new(file);
    for request in batch.requests() {
        writeln!(writer, "{}", request.command_line())?;
    }
    writer.flush()?;

    log::debug!(
        "Generated command file {} with {} entries",
        command_file.path.display(),
        command_file.entries
    );
    Ok(command_file)
}

/// Writes a command file copying every source into `destination_dir`.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] for an empty source list, or an I/O error
/// if the file cannot be written.
pub fn generate_for_sources<S: AsRef<str>>(
    sources: &[S],
    destination_dir: &str,
    scratch_dir: &Path,
) -> Result<CommandFile> {
    let batch = TransferBatch::into_directory(sources, destination_dir)?;
    generate(&batch, scratch_dir)
}
