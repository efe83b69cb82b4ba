//! Chapter pipeline orchestrator for Laer.
//!
//! Runs one chapter through
//! `Fetching -> Summarizing -> ExtractingContent -> SynthesizingQuestions -> Persisting`
//! and reports either a [`ChapterOutcome`] or a [`StageFailure`]. Nothing is
//! written until the last stage, so a failure anywhere leaves the chapter untouched.

use crate::config::{Prompts, Settings};
use crate::error::{Entity, LaerError, Result};
use crate::generation::{ChatBackend, GenerateOptions, OpenAiBackend, OutputSchema, StrictGenerator};
use crate::quiz::{PersistedQuestion, QuestionSynthesizer, QuizQuestion};
use crate::store::{Chapter, ChapterUpdate, Course, PersistenceGateway, SqliteGateway, Unit};
use crate::video::{TranscriptAcquirer, VideoProvider, YoutubeProvider};
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Pipeline stage a chapter is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Summarizing,
    ExtractingContent,
    SynthesizingQuestions,
    Persisting,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetching => write!(f, "fetching"),
            Stage::Summarizing => write!(f, "summarizing"),
            Stage::ExtractingContent => write!(f, "extracting content"),
            Stage::SynthesizingQuestions => write!(f, "synthesizing questions"),
            Stage::Persisting => write!(f, "persisting"),
        }
    }
}

/// Which summary path a chapter took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Summarized from the video transcript.
    Video,
    /// Summarized from the chapter name alone.
    NameOnly,
}

/// Terminal failure of a chapter pipeline.
#[derive(Debug, Error)]
#[error("chapter {chapter_id} failed while {stage}: {error}")]
pub struct StageFailure {
    pub chapter_id: String,
    pub stage: Stage,
    #[source]
    pub error: LaerError,
}

impl StageFailure {
    fn new(chapter_id: &str, stage: Stage, error: LaerError) -> Self {
        Self {
            chapter_id: chapter_id.to_string(),
            stage,
            error,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, LaerError::Cancelled)
    }
}

/// Everything generated for one chapter, as committed.
#[derive(Debug, Clone)]
pub struct ChapterOutcome {
    pub chapter_id: String,
    pub branch: Branch,
    pub video_id: Option<String>,
    pub summary: String,
    pub content: String,
    pub questions: Vec<PersistedQuestion>,
}

/// Per-chapter results of a course run, in completion order.
#[derive(Debug)]
pub struct CourseReport {
    pub course_id: String,
    pub results: Vec<std::result::Result<ChapterOutcome, StageFailure>>,
}

impl CourseReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ChapterOutcome> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageFailure> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }
}

/// One finished chapter of a course run.
pub struct CourseProgress<'a> {
    /// Chapters finished so far, including this one.
    pub done: usize,
    pub total: usize,
    pub result: &'a std::result::Result<ChapterOutcome, StageFailure>,
}

/// Cooperative cancellation signal shared between a caller and running pipelines.
#[derive(Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows the pipeline needs, plus what the video lookup found.
struct Fetched {
    chapter: Chapter,
    unit: Unit,
    course: Course,
    video_id: Option<String>,
    transcript: Option<String>,
}

/// The chapter content-generation pipeline.
pub struct ChapterPipeline {
    gateway: Arc<dyn PersistenceGateway>,
    acquirer: TranscriptAcquirer,
    generator: Arc<StrictGenerator>,
    synthesizer: QuestionSynthesizer,
    prompts: Prompts,
    rng: Mutex<StdRng>,
    max_concurrent_chapters: usize,
}

impl ChapterPipeline {
    /// Create a pipeline from explicit components.
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        provider: Arc<dyn VideoProvider>,
        backend: Arc<dyn ChatBackend>,
        settings: &Settings,
        prompts: Prompts,
    ) -> Self {
        let generator = Arc::new(StrictGenerator::new(
            backend,
            GenerateOptions::from(&settings.generation),
        ));
        let synthesizer = QuestionSynthesizer::new(
            generator.clone(),
            prompts.clone(),
            settings.quiz.question_count,
            settings.quiz.max_answer_words,
        );

        Self {
            gateway,
            acquirer: TranscriptAcquirer::new(provider, settings.transcript.word_budget),
            generator,
            synthesizer,
            prompts,
            rng: Mutex::new(StdRng::from_entropy()),
            max_concurrent_chapters: settings.pipeline.max_concurrent_chapters.max(1),
        }
    }

    /// Create a pipeline backed by SQLite, YouTube and OpenAI.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let gateway = Arc::new(SqliteGateway::new(&settings.sqlite_path())?);
        let provider = Arc::new(YoutubeProvider::from_settings(settings)?);
        let backend = Arc::new(OpenAiBackend::new(Duration::from_secs(
            settings.generation.request_timeout_seconds,
        ))?);

        Ok(Self::new(gateway, provider, backend, settings, prompts))
    }

    /// Make option shuffling reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Run the full pipeline for one chapter.
    pub async fn process_chapter(
        &self,
        chapter_id: &str,
    ) -> std::result::Result<ChapterOutcome, StageFailure> {
        self.process_chapter_cancellable(chapter_id, &CancelToken::new())
            .await
    }

    /// Run the full pipeline for one chapter, abandoning it if `cancel` fires.
    ///
    /// A cancelled chapter is never written.
    #[instrument(skip(self, cancel))]
    pub async fn process_chapter_cancellable(
        &self,
        chapter_id: &str,
        cancel: &CancelToken,
    ) -> std::result::Result<ChapterOutcome, StageFailure> {
        let fetched = self
            .run_stage(chapter_id, Stage::Fetching, cancel, self.fetch(chapter_id))
            .await?;

        let branch = if fetched.transcript.is_some() {
            Branch::Video
        } else {
            Branch::NameOnly
        };
        info!(chapter_id, ?branch, video_id = ?fetched.video_id, "Source resolved");

        let summary = self
            .run_stage(
                chapter_id,
                Stage::Summarizing,
                cancel,
                self.summarize(&fetched),
            )
            .await?;

        let content = self
            .run_stage(
                chapter_id,
                Stage::ExtractingContent,
                cancel,
                self.extract_content(&fetched),
            )
            .await?;

        let transcript = fetched.transcript.as_deref().unwrap_or_default();
        let quiz = self
            .run_stage(
                chapter_id,
                Stage::SynthesizingQuestions,
                cancel,
                self.synthesizer.synthesize(transcript, &fetched.chapter.name),
            )
            .await?;

        info!(chapter_id, stage = %Stage::Persisting, "Entering stage");
        if cancel.is_cancelled() {
            return Err(StageFailure::new(chapter_id, Stage::Persisting, LaerError::Cancelled));
        }

        let outcome = ChapterOutcome {
            chapter_id: chapter_id.to_string(),
            branch,
            video_id: fetched.video_id,
            summary,
            content,
            questions: self.shuffle_questions(chapter_id, &quiz),
        };
        self.persist(&outcome)
            .await
            .map_err(|e| StageFailure::new(chapter_id, Stage::Persisting, e))?;

        info!(chapter_id, questions = outcome.questions.len(), "Chapter done");
        Ok(outcome)
    }

    /// Run every chapter of a course with bounded parallelism.
    pub async fn process_course(&self, course_id: &str, cancel: &CancelToken) -> Result<CourseReport> {
        self.process_course_with_progress(course_id, cancel, |_| {})
            .await
    }

    /// Run every chapter of a course, calling `on_progress` as each one finishes.
    #[instrument(skip(self, cancel, on_progress))]
    pub async fn process_course_with_progress<F>(
        &self,
        course_id: &str,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<CourseReport>
    where
        F: FnMut(CourseProgress<'_>),
    {
        if self.gateway.find_course(course_id).await?.is_none() {
            return Err(LaerError::not_found(Entity::Course, course_id));
        }

        let chapters = self.gateway.list_chapters(course_id).await?;
        info!(
            "Processing {} chapters, {} at a time",
            chapters.len(),
            self.max_concurrent_chapters
        );

        let total = chapters.len();
        let mut runs = stream::iter(chapters)
            .map(|chapter| async move {
                self.process_chapter_cancellable(&chapter.id, cancel).await
            })
            .buffer_unordered(self.max_concurrent_chapters);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = runs.next().await {
            on_progress(CourseProgress {
                done: results.len() + 1,
                total,
                result: &result,
            });
            results.push(result);
        }

        for failure in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!("{}", failure);
        }

        Ok(CourseReport {
            course_id: course_id.to_string(),
            results,
        })
    }

    /// Log the stage transition and race `work` against cancellation.
    async fn run_stage<T>(
        &self,
        chapter_id: &str,
        stage: Stage,
        cancel: &CancelToken,
        work: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, StageFailure> {
        info!(chapter_id, %stage, "Entering stage");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(chapter_id, %stage, "Cancelled");
                Err(StageFailure::new(chapter_id, stage, LaerError::Cancelled))
            }
            result = work => result.map_err(|e| StageFailure::new(chapter_id, stage, e)),
        }
    }

    async fn fetch(&self, chapter_id: &str) -> Result<Fetched> {
        let chapter = self
            .gateway
            .find_chapter(chapter_id)
            .await?
            .ok_or_else(|| LaerError::not_found(Entity::Chapter, chapter_id))?;
        let unit = self
            .gateway
            .find_unit(&chapter.unit_id)
            .await?
            .ok_or_else(|| LaerError::not_found(Entity::Unit, &chapter.unit_id))?;
        let course = self
            .gateway
            .find_course(&unit.course_id)
            .await?
            .ok_or_else(|| LaerError::not_found(Entity::Course, &unit.course_id))?;

        let video_id = self.acquirer.find_video(&chapter.search_phrase).await;
        let transcript = match &video_id {
            Some(id) => match self.acquirer.fetch_transcript(id).await {
                Ok(text) => Some(text),
                Err(LaerError::TranscriptUnavailable(reason)) => {
                    warn!("Falling back to chapter name: {}", reason);
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        Ok(Fetched {
            chapter,
            unit,
            course,
            video_id,
            transcript,
        })
    }

    async fn summarize(&self, fetched: &Fetched) -> Result<String> {
        let prompts = &self.prompts.summary;
        let mut vars = HashMap::new();
        vars.insert("chapter".to_string(), fetched.chapter.name.clone());

        let (system, user, field) = match &fetched.transcript {
            Some(transcript) => {
                vars.insert("transcript".to_string(), transcript.clone());
                (&prompts.video_system, &prompts.video_user, &prompts.video_field)
            }
            None => (&prompts.topic_system, &prompts.topic_user, &prompts.topic_field),
        };

        let schema = OutputSchema::new().text("summary", field.as_str());
        let mut result = self
            .generator
            .generate(
                &self.prompts.render_with_custom(system, &vars),
                &self.prompts.render_with_custom(user, &vars),
                &schema,
            )
            .await?;

        required_text(result.take_text("summary"), "summary")
    }

    async fn extract_content(&self, fetched: &Fetched) -> Result<String> {
        let prompts = &self.prompts.extraction;
        let mut vars = HashMap::new();
        vars.insert("unit".to_string(), fetched.unit.name.clone());
        vars.insert("chapter".to_string(), fetched.chapter.name.clone());
        vars.insert("material".to_string(), fetched.course.material.clone());

        let schema = OutputSchema::new().text("content", prompts.field.as_str());
        let mut result = self
            .generator
            .generate(
                &self.prompts.render_with_custom(&prompts.system, &vars),
                &self.prompts.render_with_custom(&prompts.user, &vars),
                &schema,
            )
            .await?;

        required_text(result.take_text("content"), "content")
    }

    /// Shuffle each question's options exactly once.
    fn shuffle_questions(&self, chapter_id: &str, quiz: &[QuizQuestion]) -> Vec<PersistedQuestion> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        quiz.iter()
            .map(|q| PersistedQuestion::from_quiz(q, chapter_id, &mut *rng))
            .collect()
    }

    async fn persist(&self, outcome: &ChapterOutcome) -> Result<()> {
        let update = ChapterUpdate {
            video_id: outcome.video_id.clone(),
            summary: outcome.summary.clone(),
            content: outcome.content.clone(),
        };
        self.gateway
            .commit_chapter(&outcome.chapter_id, &outcome.questions, &update)
            .await
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| LaerError::GenerationContractViolation {
        raw_reply: String::new(),
        reason: format!("{} not in json output", field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ChatRequest;
    use crate::store::MemoryGateway;
    use crate::test_support::{FakeVideoProvider, FailingGateway, ScriptedBackend};
    use tokio_test::{assert_err, assert_ok};

    fn question_json(n: usize) -> String {
        format!(
            r#"{{"question": "Question {n}?", "answer": "Right {n}", "option1": "Wrong a{n}", "option2": "Wrong b{n}", "option3": "Wrong c{n}"}}"#
        )
    }

    /// Answers every request with a well-formed reply for its schema.
    fn reply_for(request: &ChatRequest) -> String {
        if request.system.contains(r#""question""#) {
            let count = request.user.matches("Input ").count();
            let items: Vec<String> = (1..=count).map(question_json).collect();
            format!("[{}]", items.join(", "))
        } else if request.system.contains(r#""summary""#) {
            r#"{"summary": "Sorting puts items in order."}"#.to_string()
        } else {
            r#"{"content": "Bubble sort and merge sort."}"#.to_string()
        }
    }

    fn seeded_gateway() -> Arc<MemoryGateway> {
        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .insert_course(Course {
                id: "c1".to_string(),
                name: "Algorithms".to_string(),
                material: "Sorting algorithms arrange elements in order.".to_string(),
            })
            .unwrap();
        gateway
            .insert_unit(Unit {
                id: "u1".to_string(),
                course_id: "c1".to_string(),
                name: "Sorting".to_string(),
            })
            .unwrap();
        gateway
            .insert_chapter(Chapter::new(
                "ch1",
                "u1",
                "Intro to Sorting",
                "sorting algorithms explained",
            ))
            .unwrap();
        gateway
    }

    fn pipeline(
        gateway: Arc<dyn PersistenceGateway>,
        provider: Arc<FakeVideoProvider>,
        backend: Arc<ScriptedBackend>,
    ) -> ChapterPipeline {
        let mut settings = Settings::default();
        settings.pipeline.max_concurrent_chapters = 2;
        ChapterPipeline::new(gateway, provider, backend, &settings, Prompts::default()).with_seed(42)
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn test_video_branch_truncates_transcript() {
        let gateway = seeded_gateway();
        let provider = Arc::new(FakeVideoProvider::with_video("v1", &words(600)));
        let backend = Arc::new(ScriptedBackend::responding(reply_for));
        let pipeline = pipeline(gateway.clone(), provider.clone(), backend.clone());

        let outcome = assert_ok!(pipeline.process_chapter("ch1").await);

        assert_eq!(outcome.branch, Branch::Video);
        assert_eq!(outcome.video_id.as_deref(), Some("v1"));
        assert_eq!(outcome.questions.len(), 5);
        assert_eq!(provider.fetch_calls(), 1);

        let summary_request = &backend.requests()[0];
        assert!(summary_request.system.contains("youtube transcript"));
        assert!(summary_request.user.contains("w499"));
        assert!(!summary_request.user.contains("w500"));

        let chapter = gateway.find_chapter("ch1").await.unwrap().unwrap();
        assert_eq!(chapter.video_id.as_deref(), Some("v1"));
        assert_eq!(chapter.summary.as_deref(), Some("Sorting puts items in order."));
        assert_eq!(chapter.content.as_deref(), Some("Bubble sort and merge sort."));
        assert_eq!(gateway.list_questions("ch1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_questions_keep_answer_and_permute_options() {
        let provider = Arc::new(FakeVideoProvider::with_video("v1", "some transcript"));
        let backend = Arc::new(ScriptedBackend::responding(reply_for));
        let outcome = pipeline(seeded_gateway(), provider, backend)
            .process_chapter("ch1")
            .await
            .unwrap();

        for (i, question) in outcome.questions.iter().enumerate() {
            let n = i + 1;
            assert_eq!(question.answer, format!("Right {n}"));
            let mut options = question.options.clone();
            options.sort();
            let mut expected = vec![
                format!("Right {n}"),
                format!("Wrong a{n}"),
                format!("Wrong b{n}"),
                format!("Wrong c{n}"),
            ];
            expected.sort();
            assert_eq!(options, expected);
        }
    }

    #[tokio::test]
    async fn test_name_only_branch_never_fetches_transcript() {
        let gateway = seeded_gateway();
        let provider = Arc::new(FakeVideoProvider::no_video());
        let backend = Arc::new(ScriptedBackend::responding(reply_for));
        let pipeline = pipeline(gateway.clone(), provider.clone(), backend.clone());

        let outcome = assert_ok!(pipeline.process_chapter("ch1").await);

        assert_eq!(outcome.branch, Branch::NameOnly);
        assert_eq!(outcome.video_id, None);
        assert_eq!(provider.fetch_calls(), 0);

        let summary_request = &backend.requests()[0];
        assert!(summary_request.system.contains("knowledge of the chapter content"));
        assert!(summary_request.user.contains("Intro to Sorting"));

        let chapter = gateway.find_chapter("ch1").await.unwrap().unwrap();
        assert_eq!(chapter.video_id, None);
        assert!(chapter.summary.is_some());
    }

    #[tokio::test]
    async fn test_missing_captions_keep_video_id() {
        let provider = Arc::new(FakeVideoProvider::without_captions("v1"));
        let backend = Arc::new(ScriptedBackend::responding(reply_for));
        let outcome = pipeline(seeded_gateway(), provider.clone(), backend.clone())
            .process_chapter("ch1")
            .await
            .unwrap();

        assert_eq!(outcome.branch, Branch::NameOnly);
        assert_eq!(outcome.video_id.as_deref(), Some("v1"));
        assert_eq!(provider.fetch_calls(), 1);
        assert!(backend.requests()[0].system.contains("knowledge of the chapter content"));
    }

    #[tokio::test]
    async fn test_unknown_chapter_fails_without_external_calls() {
        let provider = Arc::new(FakeVideoProvider::with_video("v1", "text"));
        let backend = Arc::new(ScriptedBackend::responding(reply_for));
        let pipeline = pipeline(seeded_gateway(), provider.clone(), backend.clone());

        let failure = assert_err!(pipeline.process_chapter("nope").await);

        assert_eq!(failure.stage, Stage::Fetching);
        assert!(matches!(
            failure.error,
            LaerError::NotFound {
                entity: Entity::Chapter,
                ..
            }
        ));
        assert_eq!(provider.search_calls(), 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_unit_is_not_found() {
        let gateway = seeded_gateway();
        gateway
            .insert_chapter(Chapter::new("orphan", "u-missing", "Orphan", "orphan"))
            .unwrap();
        let provider = Arc::new(FakeVideoProvider::no_video());
        let backend = Arc::new(ScriptedBackend::responding(reply_for));

        let failure = pipeline(gateway, provider, backend)
            .process_chapter("orphan")
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            LaerError::NotFound {
                entity: Entity::Unit,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_failure_after_insert_is_persistence_failure() {
        let inner = seeded_gateway();
        let gateway = Arc::new(FailingGateway::failing_updates(inner.clone()));
        let provider = Arc::new(FakeVideoProvider::with_video("v1", "text"));
        let backend = Arc::new(ScriptedBackend::responding(reply_for));

        let failure = pipeline(gateway, provider, backend)
            .process_chapter("ch1")
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Persisting);
        assert!(matches!(failure.error, LaerError::Persistence(_)));
        let chapter = inner.find_chapter("ch1").await.unwrap().unwrap();
        assert!(chapter.summary.is_none());
    }

    #[tokio::test]
    async fn test_contract_violation_aborts_before_any_write() {
        let gateway = seeded_gateway();
        let provider = Arc::new(FakeVideoProvider::with_video("v1", "text"));
        let backend = Arc::new(ScriptedBackend::repeating("I cannot help with that."));

        let failure = pipeline(gateway.clone(), provider, backend.clone())
            .process_chapter("ch1")
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Summarizing);
        assert!(matches!(
            failure.error,
            LaerError::GenerationContractViolation { .. }
        ));
        assert_eq!(backend.call_count(), 3);
        assert_eq!(gateway.question_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_chapter() {
        let gateway = seeded_gateway();
        let provider = Arc::new(FakeVideoProvider::with_video("v1", "text"));
        let backend = Arc::new(
            ScriptedBackend::responding(reply_for).with_delay(Duration::from_secs(30)),
        );
        let pipeline = pipeline(gateway.clone(), provider, backend);

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let failure = pipeline
            .process_chapter_cancellable("ch1", &cancel)
            .await
            .unwrap_err();

        assert!(failure.is_cancelled());
        assert_eq!(failure.stage, Stage::Summarizing);
        assert_eq!(gateway.question_count(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_does_nothing() {
        let provider = Arc::new(FakeVideoProvider::with_video("v1", "text"));
        let backend = Arc::new(ScriptedBackend::responding(reply_for));
        let pipeline = pipeline(seeded_gateway(), provider.clone(), backend.clone());

        let cancel = CancelToken::new();
        cancel.cancel();
        let failure = pipeline
            .process_chapter_cancellable("ch1", &cancel)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Fetching);
        assert!(failure.is_cancelled());
        assert_eq!(provider.search_calls(), 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_seeded_shuffle_is_reproducible() {
        let run = || async {
            let provider = Arc::new(FakeVideoProvider::with_video("v1", "text"));
            let backend = Arc::new(ScriptedBackend::responding(reply_for));
            pipeline(seeded_gateway(), provider, backend)
                .process_chapter("ch1")
                .await
                .unwrap()
        };

        let first = run().await;
        let second = run().await;
        let orders = |o: &ChapterOutcome| {
            o.questions
                .iter()
                .map(|q| q.options.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(orders(&first), orders(&second));
        assert_ne!(first.questions[0].id, second.questions[0].id);
    }

    #[tokio::test]
    async fn test_course_runs_with_bounded_parallelism() {
        let gateway = seeded_gateway();
        gateway
            .insert_unit(Unit {
                id: "u2".to_string(),
                course_id: "c1".to_string(),
                name: "Searching".to_string(),
            })
            .unwrap();
        for (id, unit) in [("ch2", "u1"), ("ch3", "u2"), ("ch4", "u2")] {
            gateway
                .insert_chapter(Chapter::new(id, unit, format!("Chapter {id}"), id))
                .unwrap();
        }

        let provider = Arc::new(FakeVideoProvider::no_video());
        let backend = Arc::new(
            ScriptedBackend::responding(reply_for).with_delay(Duration::from_millis(20)),
        );
        let pipeline = pipeline(gateway.clone(), provider, backend.clone());

        let mut progress = Vec::new();
        let report = pipeline
            .process_course_with_progress("c1", &CancelToken::new(), |p| {
                progress.push((p.done, p.total, p.result.is_ok()))
            })
            .await
            .unwrap();

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.success_count(), 4);
        assert_eq!(backend.max_in_flight(), 2);
        assert_eq!(gateway.question_count(), 20);
        assert_eq!(
            progress,
            vec![(1, 4, true), (2, 4, true), (3, 4, true), (4, 4, true)]
        );
    }

    #[tokio::test]
    async fn test_unknown_course_is_not_found() {
        let provider = Arc::new(FakeVideoProvider::no_video());
        let backend = Arc::new(ScriptedBackend::responding(reply_for));
        let err = pipeline(seeded_gateway(), provider, backend)
            .process_course("nope", &CancelToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LaerError::NotFound {
                entity: Entity::Course,
                ..
            }
        ));
    }
}
