//! Persistence gateway for courses, units, chapters and questions.
//!
//! The pipeline only reads chapter, unit and course rows and writes generated
//! questions plus three chapter fields. Everything else about the schema is
//! owned by whoever populates the database.

mod memory;
mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

use crate::error::Result;
use crate::quiz::PersistedQuestion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Top-level container with the raw course material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub material: String,
}

/// Grouping of chapters within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub course_id: String,
    pub name: String,
}

/// A chapter row. The generated fields stay empty until the pipeline commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub unit_id: String,
    pub name: String,
    /// Phrase used to look up a source video.
    pub search_phrase: String,
    pub video_id: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
}

impl Chapter {
    /// A chapter with nothing generated yet.
    pub fn new(
        id: impl Into<String>,
        unit_id: impl Into<String>,
        name: impl Into<String>,
        search_phrase: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            unit_id: unit_id.into(),
            name: name.into(),
            search_phrase: search_phrase.into(),
            video_id: None,
            summary: None,
            content: None,
        }
    }
}

/// Generated chapter fields written in one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterUpdate {
    pub video_id: Option<String>,
    pub summary: String,
    pub content: String,
}

/// Trait for persistence backends.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn find_chapter(&self, id: &str) -> Result<Option<Chapter>>;

    async fn find_unit(&self, id: &str) -> Result<Option<Unit>>;

    async fn find_course(&self, id: &str) -> Result<Option<Course>>;

    /// Store questions; options are kept as a JSON array.
    async fn insert_questions(&self, questions: &[PersistedQuestion]) -> Result<usize>;

    /// Write the generated fields of a chapter.
    async fn update_chapter(&self, id: &str, update: &ChapterUpdate) -> Result<()>;

    /// Write a chapter's questions and generated fields.
    ///
    /// The default runs the two writes in sequence; backends that can should
    /// override it to make the pair atomic.
    async fn commit_chapter(
        &self,
        chapter_id: &str,
        questions: &[PersistedQuestion],
        update: &ChapterUpdate,
    ) -> Result<()> {
        self.insert_questions(questions).await?;
        self.update_chapter(chapter_id, update).await
    }

    /// All chapters of a course, in unit then chapter order.
    async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>>;

    /// Stored questions of a chapter, oldest first.
    async fn list_questions(&self, chapter_id: &str) -> Result<Vec<PersistedQuestion>>;
}
