//! CLI module for Laer.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Laer - Chapter content generation
///
/// Generates summaries, extracted course material and quiz questions for
/// course chapters from YouTube transcripts and an LLM.
/// The name "Laer" comes from the Norwegian word "lær", meaning "learn."
#[derive(Parser, Debug)]
#[command(name = "laer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "LAER_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate summary, content and questions for one chapter
    Generate {
        /// Chapter ID
        chapter_id: String,

        /// Seed for option shuffling (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate every chapter of a course
    Course {
        /// Course ID
        course_id: String,

        /// Maximum chapters processed at once (overrides config)
        #[arg(short = 'j', long)]
        jobs: Option<usize>,
    },

    /// Show the stored content of a chapter
    Show {
        /// Chapter ID
        chapter_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
