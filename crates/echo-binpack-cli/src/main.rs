// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `echo-binpack`: move JSON object graphs in and out of the binpack wire format.
//!
//! Every subcommand takes a schema document (see `echo_binpack::SchemaDocument`).
//! Binary payloads go to stdout unless `--output` is given; logs go to stderr.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "echo-binpack", version, about = "Schema-driven binary codec for Echo object graphs")]
struct Cli {
    /// Log codec decisions (widths, reference ids, skipped fields) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

/// Wire switches shared by the payload subcommands.
#[derive(Args, Debug)]
struct WireArgs {
    /// Schema document (JSON)
    #[arg(long)]
    schema: PathBuf,
    /// Big-endian scalars, overriding the document
    #[arg(long)]
    big_endian: bool,
    /// No header byte; widths come from the document's `options.widths`
    #[arg(long)]
    no_header: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a JSON value into a binary payload
    Encode {
        #[command(flatten)]
        wire: WireArgs,
        /// JSON input file (`-` or omitted: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Binary output file (`-` or omitted: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Decode a binary payload into JSON
    Decode {
        #[command(flatten)]
        wire: WireArgs,
        /// Binary input file (`-` or omitted: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
        /// JSON output file (`-` or omitted: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Encode a JSON value, decode it again and compare the graphs
    Verify {
        #[command(flatten)]
        wire: WireArgs,
        /// JSON input file (`-` or omitted: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print header widths and graph size of a binary payload
    Inspect {
        #[command(flatten)]
        wire: WireArgs,
        /// Binary input file (`-` or omitted: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Compile a schema document and print its fingerprint
    Schema {
        /// Schema document (JSON)
        #[arg(long)]
        schema: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    commands::run(cli.command)
}
