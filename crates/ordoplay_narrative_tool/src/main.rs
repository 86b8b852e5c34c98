// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` Narrative - command-line host for narrative graphs
//!
//! Loads, checks, converts and walks narrative documents outside the
//! editor. Useful for CI checks on authored content and for quickly
//! playing through a branch.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use commands::Runner;
use ordoplay_narrative_graph::{GraphSettings, SETTINGS_FILE_NAME};
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "ordoplay_narrative_graph=info,ordoplay_narrative_tool=info";

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // An explicit settings file must exist; the default one is optional
    let settings = match &cli.settings {
        Some(path) => GraphSettings::load(path),
        None => GraphSettings::load_or_default(Path::new(SETTINGS_FILE_NAME)),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load settings: {e}");
            std::process::exit(1);
        }
    };

    let runner = Runner::new(settings);
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = runner.run(cli.command, &mut stdout) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
