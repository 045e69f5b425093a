//! Command line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::model::{Compression, ParserKind};

#[derive(Parser, Debug)]
#[command(version, about = "Load log objects from object storage into a warehouse")]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "FLOE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load objects that all share one source descriptor
    Load {
        /// Schema name handed to the policy (`schema.<name>`)
        #[arg(long)]
        schema: String,
        /// Compression of the objects (none, gzip, zstd)
        #[arg(long, default_value = "none")]
        compress: Compression,
        /// Parser for the decompressed bytes
        #[arg(long, default_value = "json")]
        parser: ParserKind,
        /// Object URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Load one object, asking the policy which sources it contains
    LoadObject {
        /// Object URL
        url: String,
    },
    /// Publish object URLs (or prefixes) to the message queue
    Enqueue {
        /// Object or prefix URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
}
