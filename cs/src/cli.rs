//! CLI argument parsing for coordstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(author, version, about = "Inspect a coordination store", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store file to open (overrides config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the children of a node
    Ls {
        /// Node path
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a node's payload
    Get {
        /// Node path
        #[arg(required = true)]
        path: String,
    },

    /// Show a node's metadata
    Stat {
        /// Node path
        #[arg(required = true)]
        path: String,
    },

    /// Write a raw payload, creating missing parents
    Set {
        /// Node path
        #[arg(required = true)]
        path: String,

        /// Payload (stored as given)
        #[arg(default_value = "")]
        value: String,
    },

    /// Delete a node
    Rm {
        /// Node path
        #[arg(required = true)]
        path: String,

        /// Delete the whole subtree
        #[arg(short, long)]
        recursive: bool,
    },

    /// Print the subtree below a node
    Tree {
        /// Node path
        #[arg(default_value = "/")]
        path: String,
    },
}
