// src/cli.rs

//! Argument parsing for the `ruledag` binary using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `ruledag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ruledag",
    version,
    about = "Compile rule-defined job DAGs into task graphs and register them just in time.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the rule-definition file (TOML).
    ///
    /// Default: `Ruledag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Ruledag.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RULEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Compile with default parameter values and print the task graph.
    Check(SelectionArgs),

    /// Register the static launcher task (phase 1).
    Register {
        /// Owner to register under; defaults to `[config].owner`.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Compile, register and launch a concrete workflow (phase 2).
    Jit {
        /// Identity of the running launcher execution.
        #[arg(long, env = "RULEDAG_EXECUTION_ID")]
        execution_id: String,

        /// Owner to register under; defaults to `RULEDAG_OWNER`, then
        /// `[config].owner`.
        #[arg(long)]
        owner: Option<String>,

        #[command(flatten)]
        selection: SelectionArgs,
    },
}

/// Target selection and parameter values shared by `check` and `jit`.
#[derive(Debug, Clone, Default, Args)]
pub struct SelectionArgs {
    /// Explicit target; repeatable. Replaces `[workflow].targets`.
    #[arg(long = "target", value_name = "PATH")]
    pub targets: Vec<String>,

    /// Parameter value as `name=value`; repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
