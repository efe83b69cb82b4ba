//! Schema-constrained generation.
//!
//! [`StrictGenerator`] wraps a [`ChatBackend`] and only returns replies that
//! decode into the requested [`OutputSchema`]. Malformed replies are retried
//! with the previous output and the validation error appended to the system
//! prompt; once attempts run out the call fails with
//! [`LaerError::GenerationContractViolation`].

mod backend;
mod schema;

pub use backend::{ChatBackend, ChatRequest, OpenAiBackend};
pub use schema::{
    decode_batch_reply, decode_reply, FieldShape, FieldValue, GenerationResult, OutputSchema,
    SchemaField,
};

use crate::config::GenerationSettings;
use crate::error::{LaerError, Result};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub model: String,
    pub temperature: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::from(&GenerationSettings::default())
    }
}

impl From<&GenerationSettings> for GenerateOptions {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }
}

/// Generator that enforces an output schema on an unreliable backend.
pub struct StrictGenerator {
    backend: Arc<dyn ChatBackend>,
    options: GenerateOptions,
}

impl StrictGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>, options: GenerateOptions) -> Self {
        Self { backend, options }
    }

    /// Generate one object matching `schema`.
    pub async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
    ) -> Result<GenerationResult> {
        self.generate_with(system_prompt, user_prompt, schema, &self.options)
            .await
    }

    /// Generate one object matching `schema` with explicit options.
    #[instrument(skip_all, fields(fields = schema.len()))]
    pub async fn generate_with(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
        options: &GenerateOptions,
    ) -> Result<GenerationResult> {
        check_inputs(system_prompt, std::slice::from_ref(&user_prompt), schema, options)?;

        let system = format!(
            "{}\nYou are to output the following in json format: {}. \nDo not put quotation marks or escape character \\ in the output fields.",
            system_prompt,
            schema.format_hint()
        );

        self.run_attempts(&system, user_prompt, true, options, |reply| {
            decode_reply(schema, reply)
        })
        .await
    }

    /// Generate one object per user prompt in a single call.
    ///
    /// The reply must be a JSON array with exactly `user_prompts.len()` elements,
    /// in input order.
    pub async fn generate_batch(
        &self,
        system_prompt: &str,
        user_prompts: &[String],
        schema: &OutputSchema,
    ) -> Result<Vec<GenerationResult>> {
        self.generate_batch_checked(system_prompt, user_prompts, schema, Ok)
            .await
    }

    /// Like [`generate_batch`](Self::generate_batch), with `check` run on every
    /// decoded element inside the retry loop.
    ///
    /// A rejection from `check` counts as a malformed reply: it is fed back to
    /// the model and retried like a schema error.
    #[instrument(skip_all, fields(fields = schema.len(), inputs = user_prompts.len()))]
    pub async fn generate_batch_checked<T, C>(
        &self,
        system_prompt: &str,
        user_prompts: &[String],
        schema: &OutputSchema,
        check: C,
    ) -> Result<Vec<T>>
    where
        C: Fn(GenerationResult) -> std::result::Result<T, String>,
    {
        let options = &self.options;
        check_inputs(system_prompt, user_prompts, schema, options)?;

        let expected = user_prompts.len();
        let system = format!(
            "{}\nYou are to output an array of objects in the following json format: {}. \nDo not put quotation marks or escape character \\ in the output fields.\nGenerate an array of json, one json for each input element, {} elements in total.",
            system_prompt,
            schema.format_hint(),
            expected
        );
        let user = user_prompts
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Input {}: {}", i + 1, p))
            .collect::<Vec<_>>()
            .join("\n");

        self.run_attempts(&system, &user, false, options, |reply| {
            decode_batch_reply(schema, reply, expected)?
                .into_iter()
                .enumerate()
                .map(|(i, item)| check(item).map_err(|e| format!("element {}: {}", i, e)))
                .collect()
        })
        .await
    }

    /// The bounded retry loop shared by single and batch calls.
    async fn run_attempts<T, F>(
        &self,
        system: &str,
        user: &str,
        json_object: bool,
        options: &GenerateOptions,
        decode: F,
    ) -> Result<T>
    where
        F: Fn(&str) -> std::result::Result<T, String>,
    {
        let mut feedback = String::new();
        let mut last_reply = String::new();
        let mut last_error = String::new();

        for attempt in 1..=options.max_attempts {
            let request = ChatRequest {
                system: format!("{}{}", system, feedback),
                user: user.to_string(),
                model: options.model.clone(),
                temperature: options.temperature,
                json_object,
            };

            let reply = self.backend.complete(&request).await?;
            debug!(attempt, "Model reply: {}", preview(&reply, 500));

            match decode(&reply) {
                Ok(value) => return Ok(value),
                Err(reason) => {
                    warn!(
                        attempt,
                        max_attempts = options.max_attempts,
                        "Model reply rejected: {}",
                        reason
                    );
                    feedback = format!(
                        "\n\nYour previous output was not valid JSON matching the required keys.\nPrevious output: {}\nError message: {}",
                        reply, reason
                    );
                    last_reply = reply;
                    last_error = reason;
                }
            }
        }

        Err(LaerError::GenerationContractViolation {
            raw_reply: last_reply,
            reason: format!("{} (after {} attempts)", last_error, options.max_attempts),
        })
    }
}

fn check_inputs(
    system_prompt: &str,
    user_prompts: &[impl AsRef<str>],
    schema: &OutputSchema,
    options: &GenerateOptions,
) -> Result<()> {
    if system_prompt.trim().is_empty() {
        return Err(LaerError::InvalidInput("system prompt is empty".to_string()));
    }
    if user_prompts.is_empty() || user_prompts.iter().any(|p| p.as_ref().trim().is_empty()) {
        return Err(LaerError::InvalidInput("user prompt is empty".to_string()));
    }
    if schema.is_empty() {
        return Err(LaerError::InvalidInput("output schema has no fields".to_string()));
    }
    if options.max_attempts == 0 {
        return Err(LaerError::InvalidInput("max_attempts must be at least 1".to_string()));
    }
    Ok(())
}

/// First `max_chars` characters of `s`, for logs.
pub(crate) fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
