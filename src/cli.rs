//! Command-line interface (clap v4 derive)

use clap::{Args, Parser, Subcommand};

use crate::config::CliOverrides;

/// gatepool - bounded concurrent task dispatcher
///
/// Runs work through a fixed pool of executors whose concurrency is
/// capped by an admission gate, delivering each result on the
/// submitter's own reply channel.
#[derive(Parser, Debug)]
#[command(name = "gatepool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push a synthetic workload through the dispatcher and report
    Run(RunArgs),

    /// Sum integers through the dispatcher and print the answer
    Sum {
        /// Integers to add
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<i64>,

        #[command(flatten)]
        dispatcher: DispatcherArgs,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of tasks to submit
    #[arg(short = 'n', long, default_value_t = 20)]
    pub tasks: u64,

    /// How long each task sleeps, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub sleep_ms: u64,

    /// Make every n-th task fail (0 = never)
    #[arg(long, default_value_t = 0)]
    pub fail_every: u64,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub dispatcher: DispatcherArgs,
}

/// Dispatcher options shared by workload commands
#[derive(Args, Debug, Clone, Default)]
pub struct DispatcherArgs {
    /// Path to configuration file
    #[arg(short, long, env = "GATEPOOL_CONFIG")]
    pub config: Option<String>,

    /// Executor loops (0 = gate-only mode)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum tasks running at once
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Intake queue bound (0 = unbounded)
    #[arg(long)]
    pub queue_bound: Option<usize>,
}

impl DispatcherArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            workers: self.workers,
            capacity: self.capacity,
            queue_bound: self.queue_bound,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::parse_from(["gatepool", "run"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.tasks, 20);
                assert_eq!(args.sleep_ms, 50);
                assert_eq!(args.fail_every, 0);
                assert!(!args.json);
                assert!(args.dispatcher.workers.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_options() {
        let cli = Cli::parse_from([
            "gatepool",
            "run",
            "--tasks",
            "10",
            "--workers",
            "4",
            "--capacity",
            "2",
            "--queue-bound",
            "0",
            "--fail-every",
            "3",
            "--json",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.tasks, 10);
                assert_eq!(args.fail_every, 3);
                assert!(args.json);
                let overrides = args.dispatcher.overrides();
                assert_eq!(overrides.workers, Some(4));
                assert_eq!(overrides.capacity, Some(2));
                assert_eq!(overrides.queue_bound, Some(0));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_sum_values() {
        let cli = Cli::parse_from(["gatepool", "sum", "3", "-4", "5"]);
        match cli.command {
            Commands::Sum { values, .. } => assert_eq!(values, vec![3, -4, 5]),
            _ => panic!("Expected Sum command"),
        }
    }

    #[test]
    fn test_sum_requires_values() {
        assert!(Cli::try_parse_from(["gatepool", "sum"]).is_err());
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::parse_from(["gatepool", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);

        let cli = Cli::parse_from(["gatepool", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["gatepool", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
