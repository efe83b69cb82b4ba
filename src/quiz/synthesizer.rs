//! Question synthesis through the strict generator.

use super::QuizQuestion;
use crate::config::Prompts;
use crate::error::{LaerError, Result};
use crate::generation::{GenerationResult, OutputSchema, StrictGenerator};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Turns a transcript (possibly empty) and a chapter name into quiz questions.
pub struct QuestionSynthesizer {
    generator: Arc<StrictGenerator>,
    prompts: Prompts,
    count: usize,
    max_answer_words: usize,
}

impl QuestionSynthesizer {
    pub fn new(
        generator: Arc<StrictGenerator>,
        prompts: Prompts,
        count: usize,
        max_answer_words: usize,
    ) -> Self {
        Self {
            generator,
            prompts,
            count,
            max_answer_words,
        }
    }

    fn schema(&self) -> OutputSchema {
        OutputSchema::new()
            .text("question", "question")
            .text(
                "answer",
                format!("answer with max length of {} words", self.max_answer_words),
            )
            .text("option1", self.option_description("option1"))
            .text("option2", self.option_description("option2"))
            .text("option3", self.option_description("option3"))
    }

    fn option_description(&self, name: &str) -> String {
        format!("{} with max length of {} words", name, self.max_answer_words)
    }

    /// Produce exactly `count` questions in one batched generation call.
    #[instrument(skip(self, transcript), fields(transcript_words = transcript.split_whitespace().count()))]
    pub async fn synthesize(&self, transcript: &str, chapter_name: &str) -> Result<Vec<QuizQuestion>> {
        if self.count == 0 {
            return Err(LaerError::InvalidInput(
                "question count must be at least 1".to_string(),
            ));
        }

        let mut system_vars = HashMap::new();
        system_vars.insert("max_words".to_string(), self.max_answer_words.to_string());
        let system = self
            .prompts
            .render_with_custom(&self.prompts.quiz.system, &system_vars);

        let mut user_vars = HashMap::new();
        user_vars.insert("chapter".to_string(), chapter_name.to_string());
        user_vars.insert("transcript".to_string(), transcript.to_string());
        let user = self.prompts.render_with_custom(&self.prompts.quiz.user, &user_vars);

        let user_prompts = vec![user; self.count];
        let questions = self
            .generator
            .generate_batch_checked(&system, &user_prompts, &self.schema(), into_question)
            .await?;

        info!("Synthesized {} questions", questions.len());
        Ok(questions)
    }
}

fn into_question(mut result: GenerationResult) -> std::result::Result<QuizQuestion, String> {
    let mut field = |name: &str| {
        result
            .take_text(name)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let question = QuizQuestion {
        question: field("question"),
        answer: field("answer"),
        option1: field("option1"),
        option2: field("option2"),
        option3: field("option3"),
    };

    check_question(&question)?;
    Ok(question)
}

/// One correct answer and three distinct distractors.
fn check_question(question: &QuizQuestion) -> std::result::Result<(), String> {
    if question.question.is_empty() {
        return Err("question text is empty".to_string());
    }
    if question.answer.is_empty() {
        return Err("answer is empty".to_string());
    }

    let normalized: Vec<String> = question
        .options()
        .iter()
        .map(|o| o.to_lowercase())
        .collect();
    if normalized[1..].contains(&normalized[0]) {
        return Err(format!(
            "answer '{}' duplicates a distractor",
            question.answer
        ));
    }
    let distractors = &normalized[1..];
    for (i, option) in distractors.iter().enumerate() {
        if option.is_empty() {
            return Err(format!("option{} is empty", i + 1));
        }
        if distractors[..i].contains(option) {
            return Err(format!("option{} duplicates another distractor", i + 1));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerateOptions;
    use crate::test_support::ScriptedBackend;

    fn question_json(n: usize) -> String {
        format!(
            r#"{{"question": "Question {n}?", "answer": "Right {n}", "option1": "Wrong a{n}", "option2": "Wrong b{n}", "option3": "Wrong c{n}"}}"#
        )
    }

    fn batch_reply(count: usize) -> String {
        let items: Vec<String> = (1..=count).map(question_json).collect();
        format!("[{}]", items.join(", "))
    }

    fn synthesizer(backend: Arc<ScriptedBackend>, count: usize) -> QuestionSynthesizer {
        let generator = Arc::new(StrictGenerator::new(backend, GenerateOptions::default()));
        QuestionSynthesizer::new(generator, Prompts::default(), count, 15)
    }

    #[tokio::test]
    async fn test_synthesizes_requested_count_in_order() {
        let reply = batch_reply(5);
        let backend = Arc::new(ScriptedBackend::new(vec![reply.as_str()]));
        let questions = synthesizer(backend.clone(), 5)
            .synthesize("bubble sort swaps adjacent items", "Intro to Sorting")
            .await
            .unwrap();

        assert_eq!(questions.len(), 5);
        assert_eq!(questions[0].question, "Question 1?");
        assert_eq!(questions[4].answer, "Right 5");

        let request = &backend.requests()[0];
        assert!(request.system.contains("not be more than 15 words"));
        assert_eq!(request.user.matches("Intro to Sorting").count(), 5);
        assert!(request.user.contains("bubble sort swaps adjacent items"));
    }

    #[tokio::test]
    async fn test_wrong_count_is_retried() {
        let short = batch_reply(3);
        let full = batch_reply(5);
        let backend = Arc::new(ScriptedBackend::new(vec![short.as_str(), full.as_str()]));
        let questions = synthesizer(backend.clone(), 5)
            .synthesize("", "Intro to Sorting")
            .await
            .unwrap();

        assert_eq!(questions.len(), 5);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_transcript_is_allowed() {
        let reply = batch_reply(1);
        let backend = Arc::new(ScriptedBackend::new(vec![reply.as_str()]));
        let questions = synthesizer(backend, 1)
            .synthesize("", "Graphs")
            .await
            .unwrap();
        assert_eq!(questions.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_option_is_retried_with_feedback() {
        let duplicate = r#"[{"question": "Q?", "answer": "Same", "option1": "same", "option2": "B", "option3": "C"}]"#;
        let valid = batch_reply(1);
        let backend = Arc::new(ScriptedBackend::new(vec![duplicate, valid.as_str()]));
        let questions = synthesizer(backend.clone(), 1)
            .synthesize("text", "Topic")
            .await
            .unwrap();

        assert_eq!(questions[0].answer, "Right 1");
        assert_eq!(backend.call_count(), 2);
        let retry = &backend.requests()[1];
        assert!(retry.system.contains("duplicates a distractor"));
        assert!(retry.system.contains(duplicate));
    }

    #[tokio::test]
    async fn test_persistent_duplicates_keep_the_raw_reply() {
        let reply = r#"[{"question": "Q?", "answer": "A", "option1": "B", "option2": "b", "option3": "C"}]"#;
        let backend = Arc::new(ScriptedBackend::repeating(reply));
        let err = synthesizer(backend.clone(), 1)
            .synthesize("text", "Topic")
            .await
            .unwrap_err();

        assert_eq!(backend.call_count(), 3);
        match err {
            LaerError::GenerationContractViolation { raw_reply, reason } => {
                assert_eq!(raw_reply, reply);
                assert!(reason.contains("option2 duplicates another distractor"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_option_descriptions_follow_word_limit() {
        let backend = Arc::new(ScriptedBackend::repeating("[]"));
        let generator = Arc::new(StrictGenerator::new(backend, GenerateOptions::default()));
        let hint = QuestionSynthesizer::new(generator, Prompts::default(), 1, 8)
            .schema()
            .format_hint();

        assert_eq!(hint.matches("max length of 8 words").count(), 4);
        assert!(!hint.contains("15 words"));
    }

    #[test]
    fn test_check_question_rules() {
        let mut q = QuizQuestion {
            question: "Q?".to_string(),
            answer: "A".to_string(),
            option1: "B".to_string(),
            option2: "C".to_string(),
            option3: "D".to_string(),
        };
        assert!(check_question(&q).is_ok());

        q.option3 = "c".to_string();
        assert!(check_question(&q).unwrap_err().contains("option3"));

        q.option3 = String::new();
        assert!(check_question(&q).unwrap_err().contains("empty"));
    }
}
