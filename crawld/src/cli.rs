//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::{JobStatus, TargetType};

/// crawld - crawl target scheduler and job orchestrator
#[derive(Parser)]
#[command(
    name = "crawld",
    about = "Schedules periodic crawls and orchestrates crawl jobs on a compute cluster",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the scheduler loop in the foreground
    Run,

    /// Run a single scheduling pass and exit (cron-friendly)
    Tick,

    /// Manage crawl targets
    Target {
        #[command(subcommand)]
        command: TargetCommand,
    },

    /// List job ledger entries
    Jobs {
        /// Only jobs for this target URL
        #[arg(short, long)]
        target: Option<String>,

        /// Only jobs with this status
        #[arg(short, long)]
        status: Option<JobStatus>,
    },
}

/// Target management subcommands
#[derive(Subcommand)]
pub enum TargetCommand {
    /// Register a target, or overwrite an existing registration
    Add {
        /// Target URL (https:// is assumed when no scheme is given)
        url: String,

        /// Kind of URL (website, rss_feed)
        #[arg(short = 't', long, default_value = "website")]
        target_type: TargetType,

        /// Maximum requests per crawl (0 = crawler default)
        #[arg(long, default_value = "0")]
        max_requests: u32,

        /// Maximum files to download per crawl (0 = crawler default)
        #[arg(long, default_value = "0")]
        max_files: u32,

        /// Don't download files
        #[arg(long)]
        no_downloads: bool,

        /// File extensions to download, comma separated (empty = all)
        #[arg(long, value_delimiter = ',')]
        file_types: Vec<String>,

        /// Skip robots.txt rules
        #[arg(long)]
        ignore_robots_txt: bool,

        /// Crawl every N hours (0 = manual only)
        #[arg(short, long, default_value = "0")]
        interval_hours: u32,
    },

    /// Deregister a target (its job history is kept)
    Remove {
        /// Target URL
        url: String,
    },

    /// List registered targets
    List,

    /// Dispatch a crawl for a target right now
    Crawl {
        /// Target URL
        url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["crawld", "run"]);
        assert!(matches!(cli.command, Command::Run));
    }

    #[test]
    fn test_cli_parse_tick() {
        let cli = Cli::parse_from(["crawld", "tick"]);
        assert!(matches!(cli.command, Command::Tick));
    }

    #[test]
    fn test_cli_parse_target_add() {
        let cli = Cli::parse_from([
            "crawld",
            "target",
            "add",
            "example.com",
            "--interval-hours",
            "24",
            "--file-types",
            "pdf,csv",
        ]);
        let Command::Target {
            command:
                TargetCommand::Add {
                    url,
                    target_type,
                    interval_hours,
                    file_types,
                    no_downloads,
                    ..
                },
        } = cli.command
        else {
            panic!("Expected target add command");
        };

        assert_eq!(url, "example.com");
        assert_eq!(target_type, TargetType::Website);
        assert_eq!(interval_hours, 24);
        assert_eq!(file_types, vec!["pdf".to_string(), "csv".to_string()]);
        assert!(!no_downloads);
    }

    #[test]
    fn test_cli_parse_target_add_rss() {
        let cli = Cli::parse_from(["crawld", "target", "add", "example.com/feed", "-t", "rss"]);
        let Command::Target {
            command: TargetCommand::Add { target_type, .. },
        } = cli.command
        else {
            panic!("Expected target add command");
        };
        assert_eq!(target_type, TargetType::RssFeed);
    }

    #[test]
    fn test_cli_parse_target_remove() {
        let cli = Cli::parse_from(["crawld", "target", "remove", "example.com"]);
        assert!(matches!(
            cli.command,
            Command::Target {
                command: TargetCommand::Remove { .. }
            }
        ));
    }

    #[test]
    fn test_cli_parse_jobs_with_status() {
        let cli = Cli::parse_from(["crawld", "jobs", "--status", "failed"]);
        let Command::Jobs { status, target } = cli.command else {
            panic!("Expected jobs command");
        };
        assert_eq!(status, Some(JobStatus::Failed));
        assert!(target.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["crawld", "jobs", "--status", "bogus"]).is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["crawld", "-c", "/path/to/config.yml", "tick"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
