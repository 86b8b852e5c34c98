// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default step limit for `trace`
pub const DEFAULT_MAX_STEPS: usize = 1000;

#[derive(Parser, Debug)]
#[command(name = "ordoplay_narrative")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check, trace and convert OrdoPlay narrative graphs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (defaults to narrative.settings.ron if present)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Load a document and report skipped entries
    Check {
        /// Document to check
        path: PathBuf,
    },

    /// Walk a document from its start node
    Trace {
        /// Document to walk
        path: PathBuf,

        /// Choice index taken at each branch point, in order
        #[arg(long = "pick", value_delimiter = ',')]
        picks: Vec<usize>,

        /// Stop after this many nodes
        #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
        max_steps: usize,
    },

    /// Re-save a document, format chosen by extension
    Convert {
        /// Source document
        input: PathBuf,
        /// Destination document
        output: PathBuf,
    },

    /// Create an empty document
    New {
        /// Document to create
        path: PathBuf,
        /// Document name (defaults to the file stem)
        name: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ordoplay_narrative").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_trace() {
        let cli = parse(&["trace", "intro.ron", "--pick", "1,0", "--settings", "s.ron"]).unwrap();
        assert_eq!(cli.settings, Some(PathBuf::from("s.ron")));
        assert_eq!(
            cli.command,
            Command::Trace {
                path: PathBuf::from("intro.ron"),
                picks: vec![1, 0],
                max_steps: DEFAULT_MAX_STEPS,
            }
        );
    }

    #[test]
    fn test_parse_new_with_optional_name() {
        let cli = parse(&["new", "a.json"]).unwrap();
        assert_eq!(
            cli.command,
            Command::New {
                path: PathBuf::from("a.json"),
                name: None
            }
        );
        let cli = parse(&["new", "a.json", "Tavern"]).unwrap();
        assert!(matches!(cli.command, Command::New { name: Some(ref n), .. } if n == "Tavern"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["convert", "a.ron"]).is_err());
        assert!(parse(&["check"]).is_err());
        assert!(parse(&["launch"]).is_err());
        assert!(parse(&["check", "a.ron", "b.ron"]).is_err());
        assert!(parse(&["trace", "a.ron", "--pick", "x"]).is_err());
        assert!(parse(&["check", "a.ron", "--verbose"]).is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
