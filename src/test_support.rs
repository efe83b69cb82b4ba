//! Scripted fakes shared by unit tests.

use crate::error::{LaerError, Result};
use crate::generation::{ChatBackend, ChatRequest};
use crate::quiz::PersistedQuestion;
use crate::store::{Chapter, ChapterUpdate, Course, MemoryGateway, PersistenceGateway, Unit};
use crate::video::VideoProvider;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&ChatRequest) -> String + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Repeat(String),
    Fail(String),
    Respond(Responder),
}

/// Chat backend that replays canned replies and records every request.
pub struct ScriptedBackend {
    script: Script,
    delay: Option<Duration>,
    requests: Mutex<Vec<ChatRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: None,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replies are consumed in order; running out is a transport error.
    pub fn new(replies: Vec<&str>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(
            replies.into_iter().map(str::to_string).collect(),
        )))
    }

    pub fn repeating(reply: &str) -> Self {
        Self::with_script(Script::Repeat(reply.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    /// Compute each reply from the request.
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> String + Send + Sync + 'static,
    {
        Self::with_script(Script::Respond(Box::new(responder)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of overlapping `complete` calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.script {
            Script::Queue(replies) => replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LaerError::OpenAI("script exhausted".to_string())),
            Script::Repeat(reply) => Ok(reply.clone()),
            Script::Fail(message) => Err(LaerError::OpenAI(message.clone())),
            Script::Respond(responder) => Ok(responder(request)),
        }
    }
}

enum SearchScript {
    Found(String),
    Nothing,
    Error,
}

/// Video provider with one canned search result and transcript.
pub struct FakeVideoProvider {
    search: SearchScript,
    transcript: Option<String>,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl FakeVideoProvider {
    fn build(search: SearchScript, transcript: Option<String>) -> Self {
        Self {
            search,
            transcript,
            search_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_video(video_id: &str, transcript: &str) -> Self {
        Self::build(
            SearchScript::Found(video_id.to_string()),
            Some(transcript.to_string()),
        )
    }

    /// A video is found but it has no captions.
    pub fn without_captions(video_id: &str) -> Self {
        Self::build(SearchScript::Found(video_id.to_string()), None)
    }

    pub fn no_video() -> Self {
        Self::build(SearchScript::Nothing, None)
    }

    pub fn search_error() -> Self {
        Self::build(SearchScript::Error, None)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoProvider for FakeVideoProvider {
    async fn search(&self, _phrase: &str) -> Result<Option<String>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        match &self.search {
            SearchScript::Found(id) => Ok(Some(id.clone())),
            SearchScript::Nothing => Ok(None),
            SearchScript::Error => Err(LaerError::VideoSource("quota exceeded".to_string())),
        }
    }

    async fn fetch_transcript(&self, video_id: &str) -> Result<String> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.transcript.clone().ok_or_else(|| {
            LaerError::VideoSource(format!("{}: captions disabled", video_id))
        })
    }
}

/// Gateway whose chapter updates always fail; everything else is delegated.
pub struct FailingGateway {
    inner: Arc<MemoryGateway>,
}

impl FailingGateway {
    pub fn failing_updates(inner: Arc<MemoryGateway>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PersistenceGateway for FailingGateway {
    async fn find_chapter(&self, id: &str) -> Result<Option<Chapter>> {
        self.inner.find_chapter(id).await
    }

    async fn find_unit(&self, id: &str) -> Result<Option<Unit>> {
        self.inner.find_unit(id).await
    }

    async fn find_course(&self, id: &str) -> Result<Option<Course>> {
        self.inner.find_course(id).await
    }

    async fn insert_questions(&self, questions: &[PersistedQuestion]) -> Result<usize> {
        self.inner.insert_questions(questions).await
    }

    async fn update_chapter(&self, _id: &str, _update: &ChapterUpdate) -> Result<()> {
        Err(LaerError::Persistence("disk I/O error".to_string()))
    }

    async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>> {
        self.inner.list_chapters(course_id).await
    }

    async fn list_questions(&self, chapter_id: &str) -> Result<Vec<PersistedQuestion>> {
        self.inner.list_questions(chapter_id).await
    }
}
