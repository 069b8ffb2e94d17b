//! Command-line definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Signing key renewal
///
/// Keeps a time-limited signing key fresh in the managed secret store.
/// Configuration is read from the optional TOML file and then from the
/// environment (`SIGNING_KEY_SECRET_ID`, `ISSUER_ENDPOINT`, ...).
#[derive(Debug, Parser)]
#[command(name = "signing-key-renewal", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SIGNING_KEY_RENEWAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use the in-memory store and the mock issuer instead of real services
    #[arg(long, global = true)]
    pub local: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process one invocation and print its report as JSON
    Handle {
        /// Event payload file, `-` for stdin; a scheduler tick when omitted
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Validate configuration and print the effective values
    CheckConfig,
}
