// Copyright 2026 Liveprobe Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use liveprobe::cli::{self, PageOptions};

#[derive(Parser)]
#[command(
    name = "liveprobe",
    about = "Liveprobe — resilient observation and interaction for live-updating web views",
    version,
    after_help = "Run 'liveprobe <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Run the browser headed instead of headless
    #[arg(long, global = true)]
    headed: bool,

    /// Browser UI language (e.g. "en", "bg")
    #[arg(long, global = true, default_value = "en")]
    lang: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Click the first available outcome on a live page
    Click {
        /// Page URL to open
        url: String,
        /// Interaction attempts before giving up
        #[arg(long, default_value = "3")]
        attempts: u32,
    },
    /// Read the current first-outcome odds
    Read {
        /// Page URL to open
        url: String,
        /// Include half-time markets instead of skipping them
        #[arg(long)]
        include_halftime: bool,
    },
    /// Watch the first outcome for an odds change within a bounded window
    Watch {
        /// Page URL to open
        url: String,
        /// Seconds to wait for a baseline signal
        #[arg(long, default_value = "10")]
        baseline_timeout: u64,
        /// Seconds the change window stays open after the baseline
        #[arg(long, default_value = "40")]
        window: u64,
        /// Poll cadence in milliseconds
        #[arg(long, default_value = "500")]
        poll: u64,
        /// Include half-time markets instead of skipping them
        #[arg(long)]
        include_halftime: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let filter = if args.verbose { "liveprobe=debug" } else { "liveprobe=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let page = |url: String| PageOptions {
        url,
        headed: args.headed,
        lang: args.lang.clone(),
        json: args.json,
    };

    match args.command {
        Commands::Click { url, attempts } => cli::click(page(url), attempts).await,
        Commands::Read {
            url,
            include_halftime,
        } => cli::read(page(url), include_halftime).await,
        Commands::Watch {
            url,
            baseline_timeout,
            window,
            poll,
            include_halftime,
        } => cli::watch(page(url), baseline_timeout, window, poll, include_halftime).await,
    }
}
