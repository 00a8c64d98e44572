//! Launching and supervising the external s5cmd process.
//!
//! A captured run attaches the child's stdout and stderr to the write end of
//! a single OS pipe, so the parent observes one stream in exactly the order
//! the child wrote it. The caller must drain that stream; a full pipe blocks
//! the child.

use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, PipeReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::error::{Error, Result};

/// Lifecycle of a launched process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// The process was spawned and has not been observed to exit.
    Running,
    /// The process exited with the given status.
    Completed(ExitStatus),
}

/// A running or finished s5cmd invocation.
#[derive(Debug)]
pub struct ProcessHandle {
    program: String,
    child: Option<Child>,
    output: Option<BufReader<PipeReader>>,
    state: ProcessState,
}

impl ProcessHandle {
    /// Returns the program this handle was launched from.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the last observed state without polling the process.
    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// Returns true if a merged output stream is attached.
    #[must_use]
    pub const fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Reads the next line of merged output into `buf`, including its
    /// trailing newline. Returns `Ok(0)` at end of stream or when no output
    /// was captured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamRead`] if the pipe cannot be read.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.clear();
        match self.output.as_mut() {
            Some(reader) => reader.read_until(b'\n', buf).map_err(Error::StreamRead),
            None => Ok(0),
        }
    }

    /// Polls the process without blocking, recording its exit status.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the status cannot be queried.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let ProcessState::Completed(status) = self.state {
            return Ok(Some(status));
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child.try_wait()?;
        if let Some(status) = status {
            self.state = ProcessState::Completed(status);
        }
        Ok(status)
    }

    /// Returns true once the process is known to have exited.
    ///
    /// Polling errors are treated as "still running".
    pub fn has_exited(&mut self) -> bool {
        matches!(self.try_wait(), Ok(Some(_)))
    }

    /// Blocks until the process exits and returns its status.
    ///
    /// Any remaining output is closed first so the child cannot stall on a
    /// full pipe while we wait.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if waiting fails.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let ProcessState::Completed(status) = self.state {
            return Ok(status);
        }
        self.output = None;
        let Some(child) = self.child.as_mut() else {
            return Err(Error::Io(io::Error::other("process handle has no child")));
        };
        let status = child.wait()?;
        self.state = ProcessState::Completed(status);
        Ok(status)
    }
}

/// Returns true if `path` names a regular file we are allowed to execute.
#[must_use]
pub fn is_runnable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Launches `executable` with `args`.
///
/// With `capture_output` false the call runs the process to completion with
/// inherited standard streams and returns a completed handle. With
/// `capture_output` true the process is spawned with its stdout and stderr
/// merged into one pipe and the handle is returned immediately.
///
/// # Errors
///
/// Returns [`Error::ToolUnavailable`] if the executable is missing or not
/// runnable, and [`Error::StartFailed`] if the OS refuses to spawn it.
pub fn launch<I, S>(executable: &Path, args: I, capture_output: bool) -> Result<ProcessHandle>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if !is_runnable(executable) {
        return Err(Error::ToolUnavailable {
            path: executable.to_path_buf(),
        });
    }

    let program = executable.display().to_string();
    let start_failed = |source| Error::StartFailed {
        program: program.clone(),
        source,
    };

    let mut command = Command::new(executable);
    command.args(args).stdin(Stdio::null());
    log::debug!("Launching {command:?}");

    if !capture_output {
        let status = command.status().map_err(start_failed)?;
        return Ok(ProcessHandle {
            program,
            child: None,
            output: None,
            state: ProcessState::Completed(status),
        });
    }

    let (reader, writer) = io::pipe().map_err(start_failed)?;
    let stderr_writer = writer.try_clone().map_err(start_failed)?;
    command.stdout(writer).stderr(stderr_writer);
    let child = command.spawn().map_err(start_failed)?;
    // The command still owns our copies of the write end; without dropping
    // it the reader would never see end of stream.
    drop(command);

    Ok(ProcessHandle {
        program,
        child: Some(child),
        output: Some(BufReader::new(reader)),
        state: ProcessState::Running,
    })
}
