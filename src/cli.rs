use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogArgs;

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Spawn N worker threads on the following N cpus
    #[arg(short = 'c', long = "count")]
    pub count: Option<usize>,

    /// Timeout after N seconds
    #[arg(short = 't', long = "timeout")]
    pub timeout: Option<u64>,

    /// N% busy when mode is set to constant load (0-100)
    #[arg(short = 'b', long = "busy")]
    pub busy: Option<u32>,

    /// N msec of one sample period
    #[arg(short = 'p', long = "sample")]
    pub sample: Option<u64>,

    /// N sec for one trigonometric period
    #[arg(short = 'd', long = "period")]
    pub period: Option<u64>,

    /// Workload type: 1 = constant load y=ax (default), 2 = wave load y=0.5sin(ax)+0.5
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<u32>,
}

#[derive(Debug, Parser)]
#[command(
    name = "cpuload",
    about = "Generate a controlled CPU load on a range of logical cpus",
    after_help = "Example: cpuload --start 3 --count 4 --timeout 100 --busy 60"
)]
#[command(args_conflicts_with_subcommands = true)]
#[command(subcommand_negates_reqs = true)]
pub struct Cli {
    /// Start from the cpu with this id
    #[arg(short = 's', long = "start", required = true)]
    pub start: Option<usize>,

    #[command(flatten)]
    pub load: LoadArgs,

    /// Configuration file path (default: /etc/cpuload.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calibrate the cycle counter on each cpu repeatedly and report its stability
    Calibrate(CalibrateArgs),
}

#[derive(Debug, Parser)]
pub struct CalibrateArgs {
    /// Start from the cpu with this id
    #[arg(short = 's', long = "start")]
    pub start: usize,

    /// Calibrate N cpus following the start cpu
    #[arg(short = 'c', long = "count", default_value_t = 1)]
    pub count: usize,

    /// N msec of one sample period
    #[arg(short = 'p', long = "sample")]
    pub sample: Option<u64>,

    /// Calibration rounds per cpu (1-1000)
    #[arg(short = 'r', long = "rounds", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub rounds: u32,

    /// Configuration file path (default: /etc/cpuload.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_options() {
        let cli = Cli::try_parse_from([
            "cpuload", "-s", "2", "-c", "1", "-b", "40", "-t", "100", "-p", "10", "-d", "5", "-m",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.start, Some(2));
        assert_eq!(cli.load.count, Some(1));
        assert_eq!(cli.load.busy, Some(40));
        assert_eq!(cli.load.timeout, Some(100));
        assert_eq!(cli.load.sample, Some(10));
        assert_eq!(cli.load.period, Some(5));
        assert_eq!(cli.load.mode, Some(2));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_long_options_leave_unset_fields_empty() {
        let cli = Cli::try_parse_from(["cpuload", "--start", "3", "--busy", "60"]).unwrap();
        assert_eq!(cli.start, Some(3));
        assert_eq!(cli.load.busy, Some(60));
        assert!(cli.load.count.is_none());
        assert!(cli.load.mode.is_none());
    }

    #[test]
    fn test_start_is_required() {
        let err = Cli::try_parse_from(["cpuload", "--busy", "40"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_calibrate_subcommand() {
        let cli = Cli::try_parse_from(["cpuload", "calibrate", "-s", "1", "-c", "2", "-r", "3"])
            .unwrap();
        match cli.command {
            Some(Command::Calibrate(args)) => {
                assert_eq!(args.start, 1);
                assert_eq!(args.count, 2);
                assert_eq!(args.rounds, 3);
            }
            None => panic!("expected calibrate subcommand"),
        }
    }

    #[test]
    fn test_calibrate_rounds_range() {
        assert!(Cli::try_parse_from(["cpuload", "calibrate", "-s", "0", "-r", "0"]).is_err());
    }
}
