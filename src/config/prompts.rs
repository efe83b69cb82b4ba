//! Prompt templates for Laer.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub summary: SummaryPrompts,
    pub extraction: ExtractionPrompts,
    pub quiz: QuizPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for chapter summaries.
///
/// `video_*` is used when a transcript is available, `topic_*` when only the
/// chapter name is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    pub video_system: String,
    pub video_user: String,
    pub video_field: String,
    pub topic_system: String,
    pub topic_user: String,
    pub topic_field: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            video_system: "You are an AI capable of summarizing a youtube transcript.".to_string(),
            video_user: r#"Summarize in 250 words or less and do not talk of the sponsors or anything unrelated to the main topic, also do not introduce what the summary is about.
{{transcript}}"#
                .to_string(),
            video_field: "summary of the transcript in 250 words or less, without sponsor or unrelated content and without an introductory sentence".to_string(),
            topic_system: "You are an AI capable of summarizing knowledge of the chapter content.".to_string(),
            topic_user: r#"Summarize in 250 words or less and do not talk of the sponsors or anything unrelated to the main topic, also do not introduce what the summary is about.
{{chapter}}"#
                .to_string(),
            topic_field: "summary of the content of the chapter in 250 words or less, without an introductory sentence".to_string(),
        }
    }
}

/// Prompts for extracting relevant course material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionPrompts {
    pub system: String,
    pub user: String,
    pub field: String,
}

impl Default for ExtractionPrompts {
    fn default() -> Self {
        Self {
            system: "You are an AI capable of extracting content from the whole material of a course.".to_string(),
            user: r#"Extract content in 300 words or less related to the topic "{{unit}}" or "{{chapter}}" from:
{{material}}"#
                .to_string(),
            field: "content extracted from the course material in 300 words or less, relevant to the unit or chapter topic".to_string(),
        }
    }
}

/// Prompts for multiple-choice question synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizPrompts {
    pub system: String,
    pub user: String,
}

impl Default for QuizPrompts {
    fn default() -> Self {
        Self {
            system: "You are a helpful AI that is able to generate mcq questions and answers, the length of each answer should not be more than {{max_words}} words.".to_string(),
            user: "You are to generate a random hard mcq question about {{chapter}} with context of the following transcript: {{transcript}}".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let summary_path = custom_path.join("summary.toml");
            if summary_path.exists() {
                let content = std::fs::read_to_string(&summary_path)?;
                prompts.summary = toml::from_str(&content)?;
            }

            let extraction_path = custom_path.join("extraction.toml");
            if extraction_path.exists() {
                let content = std::fs::read_to_string(&extraction_path)?;
                prompts.extraction = toml::from_str(&content)?;
            }

            let quiz_path = custom_path.join("quiz.toml");
            if quiz_path.exists() {
                let content = std::fs::read_to_string(&quiz_path)?;
                prompts.quiz = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Placeholders are substituted in one pass, so `{{name}}` text inside a
    /// value is kept literally. Unknown placeholders are left as they are.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        placeholder_regex()
            .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("Invalid regex"))
}
