//! This module contains the command-line interface [`Cli`] parser for serving and running
//! attendance exports.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The command line configuration struct, where the command-line interface parser is automatically
/// derived by [`clap::Parser`].
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// The config file to load (extension optional). Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "config")]
    pub config: String,

    /// The different commands available for exporting attendance records.
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP export service.
    Serve,

    /// Write the attendance report for a date range as CSV.
    Export {
        /// First day of the report, `YYYY-MM-DD`.
        #[arg(long)]
        start: String,

        /// Last day of the report, inclusive.
        #[arg(long)]
        end: String,

        /// Where to write the report. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the first rows of a report as a table.
    Preview {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// How many rows to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Create the database tables.
    Setup,

    /// Mint a bearer token signed with the configured secret.
    Token {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        role: String,
    },
}
