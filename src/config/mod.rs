//! Configuration module for Laer.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ExtractionPrompts, Prompts, QuizPrompts, SummaryPrompts};
pub use settings::{
    DatabaseSettings, GeneralSettings, GenerationSettings, PipelineSettings, PromptSettings,
    QuizSettings, Settings, TranscriptSettings, YoutubeSettings,
};
