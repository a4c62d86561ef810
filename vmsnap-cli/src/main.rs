// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! vmsnap CLI
//!
//! Command-line interface for the vmsnap snapshot controller.

use clap::{Parser, Subcommand};

mod commands;

/// vmsnap - VM memory snapshot, restore and shared-page controller
#[derive(Parser)]
#[command(name = "vmsnap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "vmsnap.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the command server until Ctrl+C
    Serve,

    /// Send one command to a running server
    Send {
        /// Socket path (defaults to the one in the configuration file)
        #[arg(short, long)]
        socket: Option<String>,

        /// Command line: save, restore, unlink, link <addr> or stats
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Serve => commands::serve::execute(&cli.config).await,
        Commands::Send { socket, request } => {
            commands::send::execute(&cli.config, socket.as_deref(), &request).await
        }
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
