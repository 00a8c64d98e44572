//! Time-sampled progress over a process's merged output.
//!
//! s5cmd prints one line per transferred object, which for large batches is
//! hundreds of thousands of lines. Counting each line into a display would
//! make the display the bottleneck, so lines are counted locally and
//! published as a [`ProgressSample`] at most once per report interval.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::process::ProcessHandle;

/// Lines observed since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Number of new output lines covered by this sample.
    pub lines: u64,
    /// When the sample was taken.
    pub at: Instant,
    /// Total the caller expects, if known.
    pub expected_total: Option<u64>,
}

/// Trait for receiving progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait ProgressSink: Send + Sync {
    /// Called once before the first sample.
    fn on_start(&self, _label: &str, _expected_total: Option<u64>) {}

    /// Called for every published sample.
    fn on_sample(&self, _sample: &ProgressSample) {}

    /// Called once the process has exited, with the count to display.
    fn on_finish(&self, _reported_total: u64) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Pending-count accumulator that decides when a sample is due.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_report: Instant,
    pending: u64,
}

impl Throttle {
    /// Creates a throttle whose first interval starts at `now`.
    #[must_use]
    pub const fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_report: now,
            pending: 0,
        }
    }

    /// Adds `count` observed items to the pending total.
    pub const fn record(&mut self, count: u64) {
        self.pending += count;
    }

    /// Returns the number of items not yet published.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.pending
    }

    /// Returns true if at least one interval has passed since the last
    /// report.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_report) >= self.interval
    }

    /// Publishes the pending count and starts a new interval at `now`.
    pub const fn take(&mut self, now: Instant) -> u64 {
        self.last_report = now;
        std::mem::replace(&mut self.pending, 0)
    }
}

/// Summary of a fully drained run.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSummary {
    /// Lines actually read from the stream.
    pub observed: u64,
    /// Count handed to [`ProgressSink::on_finish`].
    pub reported: u64,
    /// Wall-clock time from start of consumption to process exit.
    pub elapsed: Duration,
    /// Exit status of the process.
    pub status: ExitStatus,
}

/// Lazy sequence of samples read from a running process.
///
/// Ends when the stream closes; the process has been waited on by then and
/// its status is available from [`exit_status`](Self::exit_status).
#[derive(Debug)]
pub struct ProgressSamples<'a> {
    handle: &'a mut ProcessHandle,
    expected_total: Option<u64>,
    throttle: Throttle,
    buf: Vec<u8>,
    observed: u64,
    status: Option<ExitStatus>,
    finished: bool,
}

impl ProgressSamples<'_> {
    /// Returns the number of lines read so far.
    #[must_use]
    pub const fn observed(&self) -> u64 {
        self.observed
    }

    /// Returns the exit status once the stream has been fully consumed.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    const fn sample(&self, lines: u64, at: Instant) -> ProgressSample {
        ProgressSample {
            lines,
            at,
            expected_total: self.expected_total,
        }
    }
}

impl Iterator for ProgressSamples<'_> {
    type Item = Result<ProgressSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.handle.read_line(&mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    let now = Instant::now();
                    let lines = self.throttle.take(now);
                    match self.handle.wait() {
                        Ok(status) => self.status = Some(status),
                        Err(e) => return Some(Err(e)),
                    }
                    return (lines > 0).then(|| Ok(self.sample(lines, now)));
                }
                Ok(_) => {
                    self.observed += 1;
                    self.throttle.record(1);
                    let now = Instant::now();
                    if self.throttle.is_due(now) || self.handle.has_exited() {
                        let lines = self.throttle.take(now);
                        return Some(Ok(self.sample(lines, now)));
                    }
                }
                Err(e) => {
                    self.finished = true;
                    let _ = self.handle.try_wait();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Starts sampling the merged output of `handle`.
#[must_use]
pub fn aggregate(
    handle: &mut ProcessHandle,
    expected_total: Option<u64>,
    report_interval: Duration,
) -> ProgressSamples<'_> {
    ProgressSamples {
        handle,
        expected_total,
        throttle: Throttle::new(report_interval, Instant::now()),
        buf: Vec::new(),
        observed: 0,
        status: None,
        finished: false,
    }
}

/// Returns the count to display when a run ends.
///
/// A run shorter than one interval reports at least `expected_total`, so a
/// quick batch never shows an undercount.
#[must_use]
pub fn reported_total(
    observed: u64,
    expected_total: Option<u64>,
    elapsed: Duration,
    report_interval: Duration,
) -> u64 {
    if elapsed < report_interval {
        observed.max(expected_total.unwrap_or(0))
    } else {
        observed
    }
}

/// Drains `handle` to completion, feeding samples into `sink`.
///
/// # Errors
///
/// Returns [`Error::StreamRead`](crate::Error::StreamRead) if the output
/// cannot be read, or an I/O error if waiting on the process fails.
pub fn drive(
    handle: &mut ProcessHandle,
    label: &str,
    expected_total: Option<u64>,
    report_interval: Duration,
    sink: &dyn ProgressSink,
) -> Result<ProgressSummary> {
    let start = Instant::now();
    sink.on_start(label, expected_total);

    let mut samples = aggregate(handle, expected_total, report_interval);
    for sample in samples.by_ref() {
        let sample = sample?;
        log::trace!("{label}: +{} lines", sample.lines);
        sink.on_sample(&sample);
    }

    let observed = samples.observed();
    let Some(status) = samples.exit_status() else {
        return Err(crate::Error::Io(std::io::Error::other(
            "output ended without an exit status",
        )));
    };
    let elapsed = start.elapsed();
    let reported = reported_total(observed, expected_total, elapsed, report_interval);
    sink.on_finish(reported);

    log::debug!("{label}: {observed} lines in {elapsed:?}, exit {status}");
    Ok(ProgressSummary {
        observed,
        reported,
        elapsed,
        status,
    })
}
