//! Parsing `s5cmd ls` output into typed records.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::Result;
use crate::process::ProcessHandle;
use crate::progress::{ProgressSample, ProgressSink, Throttle};

static RECORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})\s+(\d+)\s+(.*)$").expect("valid regex")
});

/// One object reported by `s5cmd ls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    /// Object path as printed, spaces included.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time as `YYYY/MM/DD HH:MM:SS`.
    pub timestamp: String,
}

/// Size and timestamp of a listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Size in bytes.
    pub size: u64,
    /// Modification time as `YYYY/MM/DD HH:MM:SS`.
    pub timestamp: String,
}

/// Listed objects keyed by path.
///
/// Records are inserted in the order s5cmd prints them, so a later
/// duplicate replaces an earlier one, but iteration is sorted by path.
pub type Listing = BTreeMap<String, ListingEntry>;

/// Parses one line of `ls` output.
///
/// Directory rows, diagnostics and sizes that do not fit in a `u64` yield
/// `None`.
#[must_use]
pub fn parse_line(line: &str) -> Option<ListingRecord> {
    let caps = RECORD_RE.captures(line.trim())?;
    let size = caps[2].parse().ok()?;
    Some(ListingRecord {
        path: caps[3].to_string(),
        size,
        timestamp: caps[1].to_string(),
    })
}

/// Inserts a record, replacing any earlier entry for the same path.
pub fn insert(listing: &mut Listing, record: ListingRecord) {
    listing.insert(
        record.path,
        ListingEntry {
            size: record.size,
            timestamp: record.timestamp,
        },
    );
}

/// Drains the output of a running `ls` and collects every record.
///
/// Records are inserted as soon as they are read; the sink only receives
/// throttled counts of matched records.
///
/// # Errors
///
/// Returns [`Error::StreamRead`](crate::Error::StreamRead) if the output
/// cannot be read, or an I/O error if waiting on the process fails.
pub fn parse_listing(
    handle: &mut ProcessHandle,
    report_interval: Duration,
    sink: &dyn ProgressSink,
) -> Result<Listing> {
    let start = Instant::now();
    let mut throttle = Throttle::new(report_interval, start);
    let mut listing = Listing::new();
    let mut buf = Vec::new();
    let mut matched: u64 = 0;

    sink.on_start("listing", None);

    loop {
        let read = match handle.read_line(&mut buf) {
            Ok(read) => read,
            Err(e) => {
                let _ = handle.try_wait();
                return Err(e);
            }
        };
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let Some(record) = parse_line(&line) else {
            log::trace!("Skipping ls line: {}", line.trim_end());
            continue;
        };
        insert(&mut listing, record);
        matched += 1;
        throttle.record(1);

        let now = Instant::now();
        if throttle.is_due(now) || handle.has_exited() {
            let lines = throttle.take(now);
            sink.on_sample(&ProgressSample {
                lines,
                at: now,
                expected_total: None,
            });
        }
    }

    let now = Instant::now();
    let lines = throttle.take(now);
    if lines > 0 {
        sink.on_sample(&ProgressSample {
            lines,
            at: now,
            expected_total: None,
        });
    }

    let status = handle.wait()?;
    if !status.success() {
        // s5cmd exits non-zero when nothing matches; the listing is just empty.
        log::warn!("s5cmd ls exited with {status}");
    }
    sink.on_finish(matched);
    log::debug!(
        "Listed {} objects ({matched} records) in {:?}, exit {status}",
        listing.len(),
        start.elapsed()
    );
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_with_spaces() {
        let record = parse_line("2024/01/15 10:30:00       1024  folder/file name.txt").unwrap();
        assert_eq!(
            record,
            ListingRecord {
                path: "folder/file name.txt".to_string(),
                size: 1024,
                timestamp: "2024/01/15 10:30:00".to_string(),
            }
        );
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let record = parse_line("  2023/12/31 23:59:59 0 empty.bin \n").unwrap();
        assert_eq!(record.size, 0);
        assert_eq!(record.path, "empty.bin");
    }

    #[test]
    fn skips_malformed_lines() {
        assert_eq!(parse_line("2024/01/15 10:30:00  folder/file.txt"), None);
        assert_eq!(parse_line("                                  DIR  folder/"), None);
        assert_eq!(parse_line("ERROR \"ls s3://b\": no object found"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn skips_sizes_that_overflow() {
        assert_eq!(
            parse_line("2024/01/15 10:30:00 99999999999999999999999 huge.bin"),
            None
        );
    }

    #[test]
    fn iteration_is_sorted_by_path() {
        let mut listing = Listing::new();
        for line in [
            "2024/01/01 00:00:00 1 zeta.txt",
            "2024/01/01 00:00:00 2 alpha/b.txt",
            "2024/01/01 00:00:00 3 alpha/a.txt",
        ] {
            insert(&mut listing, parse_line(line).unwrap());
        }
        let paths: Vec<_> = listing.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["alpha/a.txt", "alpha/b.txt", "zeta.txt"]);
    }

    #[test]
    fn later_duplicates_overwrite() {
        let mut listing = Listing::new();
        insert(&mut listing, parse_line("2024/01/01 00:00:00 1 a.txt").unwrap());
        insert(&mut listing, parse_line("2024/02/01 00:00:00 2 a.txt").unwrap());
        assert_eq!(listing.len(), 1);
        assert_eq!(listing["a.txt"].size, 2);
        assert_eq!(listing["a.txt"].timestamp, "2024/02/01 00:00:00");
    }

    #[cfg(unix)]
    mod process_tests {
        use super::*;
        use crate::process::launch;
        use crate::process::test_support::write_script;
        use crate::progress::NoProgress;
        use std::sync::Mutex;
        use tempfile::TempDir;

        #[derive(Default)]
        struct Counter {
            sampled: Mutex<u64>,
            finished: Mutex<Option<u64>>,
        }

        impl ProgressSink for Counter {
            fn on_sample(&self, sample: &ProgressSample) {
                *self.sampled.lock().unwrap() += sample.lines;
            }

            fn on_finish(&self, reported_total: u64) {
                *self.finished.lock().unwrap() = Some(reported_total);
            }
        }

        #[test]
        fn collects_records_and_skips_noise() {
            let dir = TempDir::new().unwrap();
            let script = write_script(
                dir.path(),
                "s5cmd",
                "echo '2024/01/15 10:30:00       1024  folder/file name.txt'\n\
                 echo '                                  DIR  folder/'\n\
                 echo 'WARNING something odd' >&2\n\
                 echo '2024/01/16 11:00:00          7  other.txt'\n\
                 echo '2024/01/17 12:00:00          9  other.txt'",
            );
            let mut handle = launch(&script, ["ls", "s3://b/*"], true).unwrap();
            let counter = Counter::default();

            let listing = parse_listing(&mut handle, Duration::from_secs(3600), &counter).unwrap();

            assert_eq!(listing.len(), 2);
            assert_eq!(listing["folder/file name.txt"].size, 1024);
            assert_eq!(listing["other.txt"].size, 9);
            assert_eq!(*counter.sampled.lock().unwrap(), 3);
            assert_eq!(*counter.finished.lock().unwrap(), Some(3));
        }

        #[test]
        fn empty_output_is_an_empty_listing() {
            let dir = TempDir::new().unwrap();
            let script = write_script(dir.path(), "s5cmd", "exit 0");
            let mut handle = launch(&script, ["ls"], true).unwrap();
            let listing = parse_listing(&mut handle, Duration::from_secs(1), &NoProgress).unwrap();
            assert!(listing.is_empty());
        }

        #[test]
        fn throttling_never_drops_records() {
            let dir = TempDir::new().unwrap();
            let script = write_script(
                dir.path(),
                "s5cmd",
                "i=0\nwhile [ $i -lt 300 ]; do echo \"2024/01/15 10:30:00 $i obj $i\"; i=$((i+1)); done",
            );
            let mut handle = launch(&script, ["ls"], true).unwrap();
            let listing = parse_listing(&mut handle, Duration::ZERO, &NoProgress).unwrap();
            assert_eq!(listing.len(), 300);
            assert_eq!(listing["obj 299"].size, 299);
        }
    }
}
