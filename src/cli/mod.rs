//! Command-line front end for s5cmd-runner.
//!
//! Flags override values from the configuration file, which in turn
//! override built-in defaults.

mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::transfer::{Reporting, Runner};

pub use progress::{BarSink, listing_row, listing_summary, print_listing, print_outcome};

/// Run s5cmd transfers with batching and progress reporting.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Run s5cmd transfers with batching and progress reporting")]
pub struct Args {
    /// Configuration file (defaults to the per-user config.toml).
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Path of the s5cmd executable.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub tool: Option<PathBuf>,

    /// Directory for command files and downloaded inputs.
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub scratch_dir: Option<PathBuf>,

    /// Never download s5cmd when it is missing.
    #[arg(long)]
    pub no_install: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed on the command line.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Copy a local path, S3 URI or HTTP(S) URL to a destination.
    Cp {
        source: String,
        destination: String,
        /// Show sampled progress instead of raw s5cmd output.
        #[arg(long)]
        progress: bool,
        /// Seconds between progress samples.
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// Move objects to, from or within S3.
    Mv { source: String, destination: String },
    /// Synchronize a folder or prefix to a destination.
    Sync {
        source: String,
        destination: String,
        /// Show raw s5cmd output instead of sampled progress.
        #[arg(long)]
        passthrough: bool,
        /// Seconds between progress samples.
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// Download many objects into one directory in a single s5cmd run.
    Download {
        #[arg(value_hint = ValueHint::DirPath)]
        destination_dir: String,
        sources: Vec<String>,
        /// Read additional sources from a file, one per line.
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        from_file: Option<PathBuf>,
        /// Show raw s5cmd output instead of sampled progress.
        #[arg(long)]
        passthrough: bool,
        /// Seconds between progress samples.
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// Execute an s5cmd command file from a local path, S3 or HTTP(S).
    Run {
        command_file: String,
        /// Show raw s5cmd output instead of sampled progress.
        #[arg(long)]
        passthrough: bool,
        /// Seconds between progress samples.
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// List objects under an S3 URI.
    Ls {
        uri: String,
        /// Seconds between progress samples.
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

/// Initializes `env_logger`; `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Loads configuration and applies command-line overrides.
///
/// # Errors
///
/// Returns [`Error::Config`] if the configuration file is invalid.
pub fn load_config(args: &Args) -> Result<RunnerConfig> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::load_default()?,
    };
    if let Some(tool) = &args.tool {
        config = config.with_tool_path(tool);
    }
    if let Some(dir) = &args.scratch_dir {
        config = config.with_scratch_dir(dir);
    }
    if args.no_install {
        config = config.with_auto_install(false);
    }
    Ok(config)
}

fn reporting(passthrough: bool, interval: Option<u64>, default: Duration) -> Reporting {
    if passthrough {
        Reporting::Passthrough
    } else {
        Reporting::Sampled(interval.map_or(default, Duration::from_secs))
    }
}

/// Reads a source list: one locator per line, blank lines and `#` comments
/// ignored.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn read_source_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Runs the parsed command.
///
/// # Errors
///
/// Returns any error from configuration loading or the operation itself.
pub async fn execute(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    log::debug!("Using s5cmd at {}", config.tool_path.display());
    let report = config.report_interval();
    let sync = config.sync_interval();
    let list = config.list_interval();
    let runner = Runner::new(config)?.with_progress(Arc::new(BarSink::new()));

    match args.command {
        Command::Cp {
            source,
            destination,
            progress,
            interval,
        } => {
            let outcome = runner
                .cp(&source, &destination, reporting(!progress, interval, sync))
                .await?;
            print_outcome("cp", &outcome);
        }
        Command::Mv {
            source,
            destination,
        } => {
            let outcome = runner
                .mv(&source, &destination, Reporting::Passthrough)
                .await?;
            print_outcome("mv", &outcome);
        }
        Command::Sync {
            source,
            destination,
            passthrough,
            interval,
        } => {
            let outcome = runner
                .sync(&source, &destination, reporting(passthrough, interval, sync))
                .await?;
            print_outcome("sync", &outcome);
        }
        Command::Download {
            destination_dir,
            mut sources,
            from_file,
            passthrough,
            interval,
        } => {
            if let Some(path) = from_file {
                sources.extend(read_source_list(&path)?);
            }
            let outcome = runner
                .download_list(&sources, &destination_dir, reporting(passthrough, interval, report))
                .await?;
            print_outcome("download", &outcome);
        }
        Command::Run {
            command_file,
            passthrough,
            interval,
        } => {
            let outcome = runner
                .run_file(&command_file, reporting(passthrough, interval, report))
                .await?;
            print_outcome("run", &outcome);
        }
        Command::Ls { uri, interval } => {
            let listing = runner
                .ls(&uri, interval.map_or(list, Duration::from_secs))
                .await?;
            print_listing(&listing);
        }
    }
    Ok(())
}

/// Parses the command line, sets up logging and runs the command.
///
/// # Errors
///
/// Returns any error from [`execute`].
pub async fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    execute(args).await
}

/// Maps a failure to the process exit code: s5cmd's own code when it
/// failed, else 1.
#[must_use]
pub const fn exit_code(error: &Error) -> i32 {
    match error {
        Error::ToolFailed { code: Some(code) } if *code != 0 => *code,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_global_flags_and_download() {
        let args = Args::try_parse_from([
            "s5run",
            "--tool",
            "/opt/s5cmd",
            "-vv",
            "download",
            "/data/in",
            "s3://b/a.csv",
            "s3://b/b.csv",
            "--interval",
            "2",
        ])
        .unwrap();

        assert_eq!(args.tool, Some(PathBuf::from("/opt/s5cmd")));
        assert_eq!(args.verbose, 2);
        assert_eq!(
            args.command,
            Command::Download {
                destination_dir: "/data/in".to_string(),
                sources: vec!["s3://b/a.csv".to_string(), "s3://b/b.csv".to_string()],
                from_file: None,
                passthrough: false,
                interval: Some(2),
            }
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        for command in [
            vec!["s5run", "sync", "s3://b/a", "s3://b/b", "--interval", "0"],
            vec!["s5run", "ls", "s3://b/", "--interval", "0"],
            vec!["s5run", "cp", "a.txt", "s3://b/", "--progress", "--interval", "0"],
        ] {
            assert!(Args::try_parse_from(command).is_err());
        }
        let args =
            Args::try_parse_from(["s5run", "ls", "s3://b/", "--interval", "1"]).unwrap();
        assert_eq!(
            args.command,
            Command::Ls {
                uri: "s3://b/".to_string(),
                interval: Some(1),
            }
        );
    }

    #[test]
    fn mv_requires_two_locators() {
        assert!(Args::try_parse_from(["s5run", "mv", "s3://b/a"]).is_err());
    }

    #[test]
    fn cp_defaults_to_passthrough() {
        assert_eq!(
            reporting(true, None, Duration::from_secs(10)),
            Reporting::Passthrough
        );
        assert_eq!(
            reporting(false, Some(3), Duration::from_secs(10)),
            Reporting::Sampled(Duration::from_secs(3))
        );
        assert_eq!(
            reporting(false, None, Duration::from_secs(10)),
            Reporting::Sampled(Duration::from_secs(10))
        );
    }

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tool_path = \"/from/file\"\nreport_interval_secs = 7\n").unwrap();
        let config_arg = path.to_string_lossy().into_owned();

        let args = Args::try_parse_from([
            "s5run",
            "--config",
            config_arg.as_str(),
            "--scratch-dir",
            "/scratch",
            "--no-install",
            "ls",
            "s3://b/",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();

        assert_eq!(config.tool_path, PathBuf::from("/from/file"));
        assert_eq!(config.scratch_dir, PathBuf::from("/scratch"));
        assert_eq!(config.report_interval_secs, 7);
        assert!(!config.auto_install);
    }

    #[test]
    fn source_list_skips_blanks_and_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sources.txt");
        std::fs::write(&path, "# inputs\ns3://b/a.csv\n\n  s3://b/b.csv  \n").unwrap();
        assert_eq!(
            read_source_list(&path).unwrap(),
            vec!["s3://b/a.csv", "s3://b/b.csv"]
        );
    }

    #[test]
    fn exit_code_follows_tool_status() {
        assert_eq!(exit_code(&Error::ToolFailed { code: Some(3) }), 3);
        assert_eq!(exit_code(&Error::ToolFailed { code: None }), 1);
        assert_eq!(exit_code(&Error::EmptyInput), 1);
    }
}
