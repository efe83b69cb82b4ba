//! Laer - Chapter content generation
//!
//! Turns course chapters into study material: a summary, an extract of the
//! course material and a set of multiple-choice questions.
//!
//! The name "Laer" comes from the Norwegian word "lær", meaning "learn."
//!
//! # Overview
//!
//! For each chapter Laer:
//! - Looks up a matching YouTube video and its captions
//! - Summarizes the transcript, or the chapter topic when there is none
//! - Extracts the relevant part of the course material
//! - Generates quiz questions with shuffled options
//! - Stores everything in one write
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `generation` - Schema-constrained LLM generation with bounded retry
//! - `video` - Video search, caption download and transcript truncation
//! - `quiz` - Question types, shuffling and synthesis
//! - `store` - Persistence gateway (SQLite, in-memory)
//! - `orchestrator` - Chapter pipeline and course fan-out
//!
//! # Example
//!
//! ```rust,no_run
//! use laer::config::Settings;
//! use laer::orchestrator::ChapterPipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = ChapterPipeline::from_settings(&settings)?;
//!
//!     let outcome = pipeline.process_chapter("chapter-id").await?;
//!     println!("Generated {} questions", outcome.questions.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod openai;
pub mod orchestrator;
pub mod quiz;
pub mod store;
pub mod video;

#[cfg(test)]
mod test_support;

pub use error::{LaerError, Result};
