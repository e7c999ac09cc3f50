//! Command line handling shared by operators built on this crate.
//!
//! ```no_run
//! use clap::Parser;
//! use kubedoop_operator::cli::{Command, RunArguments};
//!
//! #[derive(clap::Parser)]
//! #[command(name = "superset-operator", version)]
//! struct Opts {
//!     #[clap(subcommand)]
//!     command: Command,
//! }
//!
//! let opts = Opts::parse();
//! match opts.command {
//!     Command::Crd => {
//!         // Print the CRDs
//!     }
//!     Command::Run(RunArguments { watch_namespace, .. }) => {
//!         // Run the operator
//!     }
//! }
//! ```
use clap::{Args, Parser};

use crate::{logging::LogFormat, namespace::WatchNamespace};

/// A common set of commands used by operators.
///
/// This enum is generic over the arguments available to the [`Command::Run`] subcommand. By default,
/// [`RunArguments`] is used, but a custom type can be used.
#[derive(Debug, PartialEq, Eq, Parser)]
pub enum Command<Run: Args = RunArguments> {
    /// Print CRD objects.
    Crd,

    /// Run the operator.
    Run(Run),
}

/// Default CLI arguments that most operators take when running.
#[derive(Debug, PartialEq, Eq, Parser)]
#[command(long_about = "")]
pub struct RunArguments {
    /// Provides a specific namespace to watch (instead of watching all namespaces)
    #[arg(long, env, default_value = "")]
    pub watch_namespace: WatchNamespace,

    /// The format of the log lines written to the console
    #[arg(long, env, value_enum, default_value_t)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        RunArguments::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let command = Command::<RunArguments>::try_parse_from(["superset-operator", "run"])
            .expect("valid arguments");
        assert_eq!(
            command,
            Command::Run(RunArguments {
                watch_namespace: WatchNamespace::All,
                log_format: LogFormat::Plain,
            })
        );
    }

    #[test]
    fn run_with_arguments() {
        let command = Command::<RunArguments>::try_parse_from([
            "superset-operator",
            "run",
            "--watch-namespace",
            "analytics",
            "--log-format",
            "json",
        ])
        .expect("valid arguments");
        assert_eq!(
            command,
            Command::Run(RunArguments {
                watch_namespace: WatchNamespace::One("analytics".to_string()),
                log_format: LogFormat::Json,
            })
        );
    }
}
