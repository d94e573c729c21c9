//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default seconds between connectivity checks in `watch`.
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 30;

/// Wellness directory with an offline cache
#[derive(Parser, Debug)]
#[command(name = "wellcache")]
#[command(about = "Browse the wellness directory, online or off")]
#[command(version)]
pub struct Cli {
    /// Treat the network as unreachable; only cached or bundled data is shown
    #[arg(long, global = true)]
    pub offline: bool,

    /// Keep the cache in memory for this run instead of on disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Also write logs to this file, rotated daily
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the directory as currently available, without fetching
    Show {
        /// Only list services in this category
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,
    },
    /// Describe where the data comes from and how old it is
    Status,
    /// Fetch the latest directory and update the cache
    Refresh,
    /// Delete the offline cache
    Clear,
    /// Follow connectivity and refresh whenever the network comes back
    Watch {
        /// Seconds between connectivity checks
        #[arg(long, value_name = "SECS", default_value_t = DEFAULT_WATCH_INTERVAL_SECS)]
        interval: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_show_with_category() {
        let cli = Cli::try_parse_from(["wellcache", "show", "--category", "mental_wellness"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Show {
                category: Some("mental_wellness".to_string())
            }
        );
        assert!(!cli.offline);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["wellcache", "refresh", "--offline", "--ephemeral"]).unwrap();
        assert_eq!(cli.command, Command::Refresh);
        assert!(cli.offline);
        assert!(cli.ephemeral);
    }

    #[test]
    fn test_watch_default_interval() {
        let cli = Cli::try_parse_from(["wellcache", "watch"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Watch {
                interval: DEFAULT_WATCH_INTERVAL_SECS
            }
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["wellcache"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
