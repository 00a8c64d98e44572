//! Progress bars and listing output for the command line.

use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use crate::listing::Listing;
use crate::progress::{ProgressSample, ProgressSink};
use crate::transfer::RunOutcome;

/// Shows s5cmd output counts as a bar when the total is known, otherwise
/// as a spinner.
#[derive(Default)]
pub struct BarSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl std::fmt::Debug for BarSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarSink").finish_non_exhaustive()
    }
}

impl BarSink {
    /// Creates a sink with no bar until a run starts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|bar| bar.clone())
    }
}

/// Creates a determinate bar over `total` lines.
fn make_bar(total: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(label.to_string());
    bar
}

/// Creates a spinner counting lines of unknown total.
fn make_spinner(label: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}: {pos} lines ({elapsed})")
            .expect("spinner template is valid"),
    );
    bar.set_message(label.to_string());
    bar
}

impl ProgressSink for BarSink {
    fn on_start(&self, label: &str, expected_total: Option<u64>) {
        let bar = expected_total.map_or_else(|| make_spinner(label), |n| make_bar(n, label));
        bar.enable_steady_tick(Duration::from_millis(250));
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_sample(&self, sample: &ProgressSample) {
        if let Some(bar) = self.current() {
            bar.inc(sample.lines);
        }
    }

    fn on_finish(&self, reported_total: u64) {
        if let Some(bar) = self.current() {
            if bar.length().is_some_and(|len| len < reported_total) {
                bar.set_length(reported_total);
            }
            bar.set_position(reported_total);
            bar.finish();
        }
    }
}

/// Formats one listing row as `timestamp  size  path`.
#[must_use]
pub fn listing_row(path: &str, size: u64, timestamp: &str) -> String {
    format!("{timestamp}  {size:>12}  {path}")
}

/// Formats the closing summary of a listing.
#[must_use]
pub fn listing_summary(listing: &Listing) -> String {
    let total: u64 = listing.values().map(|entry| entry.size).sum();
    format!("{} object(s), {}", listing.len(), HumanBytes(total))
}

/// Prints a listing, sorted by path, followed by its summary.
pub fn print_listing(listing: &Listing) {
    for (path, entry) in listing {
        println!("{}", listing_row(path, entry.size, &entry.timestamp));
    }
    println!("{}", style(listing_summary(listing)).bold());
}

/// Prints a one-line result for a finished operation.
pub fn print_outcome(operation: &str, outcome: &RunOutcome) {
    let detail = outcome
        .lines
        .map_or_else(String::new, |n| format!(" ({n} lines of output)"));
    let notes = if outcome.advisories.is_empty() {
        String::new()
    } else {
        format!(", {} advisory note(s)", outcome.advisories.len())
    };
    eprintln!("{} {operation} finished{detail}{notes}", style("✓").green());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingEntry;
    use std::time::Instant;

    #[test]
    fn listing_rows_keep_spaces_in_paths() {
        assert_eq!(
            listing_row("folder/file name.txt", 1024, "2024/01/15 10:30:00"),
            "2024/01/15 10:30:00          1024  folder/file name.txt"
        );
    }

    #[test]
    fn listing_summary_counts_and_sizes() {
        let mut listing = Listing::new();
        for (path, size) in [("a", 1024_u64), ("b", 1024)] {
            listing.insert(
                path.to_string(),
                ListingEntry {
                    size,
                    timestamp: "2024/01/15 10:30:00".to_string(),
                },
            );
        }
        assert_eq!(listing_summary(&listing), "2 object(s), 2.00 KiB");
        assert_eq!(listing_summary(&Listing::new()), "0 object(s), 0 B");
    }

    #[test]
    fn bar_sink_ends_at_reported_total() {
        let sink = BarSink::new();
        sink.on_start("download", Some(3));
        sink.on_sample(&ProgressSample {
            lines: 2,
            at: Instant::now(),
            expected_total: Some(3),
        });
        sink.on_finish(5);

        let bar = sink.current().unwrap();
        assert_eq!(bar.position(), 5);
        assert_eq!(bar.length(), Some(5));
        assert!(bar.is_finished());
    }

    #[test]
    fn spinner_counts_without_total() {
        let sink = BarSink::new();
        sink.on_start("sync", None);
        sink.on_sample(&ProgressSample {
            lines: 4,
            at: Instant::now(),
            expected_total: None,
        });
        assert_eq!(sink.current().unwrap().position(), 4);
    }
}
