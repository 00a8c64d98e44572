//! s5cmd-runner - batch orchestration and progress aggregation for s5cmd.
//!
//! The library drives the `s5cmd` executable: it turns lists of transfers
//! into command files, launches and supervises s5cmd, samples its output
//! into throttled progress reports and parses `ls` listings.
//!
//! # Example
//!
//! ```no_run
//! use s5cmd_runner::{Reporting, Runner, RunnerConfig};
//!
//! # async fn example() -> s5cmd_runner::Result<()> {
//! let config = RunnerConfig::load_default()?;
//! let interval = config.report_interval();
//! let runner = Runner::new(config)?;
//!
//! let outcome = runner
//!     .download_list(
//!         &["s3://bucket/a.csv", "s3://bucket/b.csv"],
//!         "/data/in",
//!         Reporting::Sampled(interval),
//!     )
//!     .await?;
//! println!("s5cmd reported {:?} lines", outcome.lines);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod batch;
pub mod config;
pub mod download;
pub mod error;
pub mod fingerprint;
pub mod listing;
pub mod locator;
pub mod process;
pub mod progress;
pub mod tool;
pub mod transfer;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use batch::{CommandFile, TransferBatch, TransferRequest};
pub use config::RunnerConfig;
pub use download::Downloader;
pub use error::{Error, Result};
pub use listing::{Listing, ListingEntry, ListingRecord, parse_listing};
pub use locator::Locator;
pub use process::{ProcessHandle, ProcessState, launch};
pub use progress::{NoProgress, ProgressSample, ProgressSink, ProgressSummary};
pub use tool::{HttpInstaller, NoInstall, ToolInstaller, ToolResolver};
pub use transfer::{Advisory, Reporting, RunOutcome, Runner};
