//! In-memory persistence gateway.
//!
//! Useful for testing and dry runs.

use super::{Chapter, ChapterUpdate, Course, PersistenceGateway, Unit};
use crate::error::{Entity, LaerError, Result};
use crate::quiz::PersistedQuestion;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    courses: HashMap<String, Course>,
    units: Vec<Unit>,
    chapters: Vec<Chapter>,
    questions: Vec<PersistedQuestion>,
}

impl Tables {
    fn update_chapter(&mut self, id: &str, update: &ChapterUpdate) -> Result<()> {
        let chapter = self
            .chapters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| LaerError::not_found(Entity::Chapter, id))?;

        chapter.video_id = update.video_id.clone();
        chapter.summary = Some(update.summary.clone());
        chapter.content = Some(update.content.clone());
        Ok(())
    }
}

/// In-memory gateway.
#[derive(Default)]
pub struct MemoryGateway {
    tables: RwLock<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| LaerError::Persistence(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| LaerError::Persistence(format!("Failed to acquire lock: {}", e)))
    }

    pub fn insert_course(&self, course: Course) -> Result<()> {
        self.write()?.courses.insert(course.id.clone(), course);
        Ok(())
    }

    pub fn insert_unit(&self, unit: Unit) -> Result<()> {
        let mut tables = self.write()?;
        tables.units.retain(|u| u.id != unit.id);
        tables.units.push(unit);
        Ok(())
    }

    pub fn insert_chapter(&self, chapter: Chapter) -> Result<()> {
        let mut tables = self.write()?;
        tables.chapters.retain(|c| c.id != chapter.id);
        tables.chapters.push(chapter);
        Ok(())
    }

    pub fn question_count(&self) -> usize {
        self.read().map(|t| t.questions.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn find_chapter(&self, id: &str) -> Result<Option<Chapter>> {
        Ok(self.read()?.chapters.iter().find(|c| c.id == id).cloned())
    }

    async fn find_unit(&self, id: &str) -> Result<Option<Unit>> {
        Ok(self.read()?.units.iter().find(|u| u.id == id).cloned())
    }

    async fn find_course(&self, id: &str) -> Result<Option<Course>> {
        Ok(self.read()?.courses.get(id).cloned())
    }

    async fn insert_questions(&self, questions: &[PersistedQuestion]) -> Result<usize> {
        self.write()?.questions.extend_from_slice(questions);
        Ok(questions.len())
    }

    async fn update_chapter(&self, id: &str, update: &ChapterUpdate) -> Result<()> {
        self.write()?.update_chapter(id, update)
    }

    /// Both writes happen under one write guard; a missing chapter writes nothing.
    async fn commit_chapter(
        &self,
        chapter_id: &str,
        questions: &[PersistedQuestion],
        update: &ChapterUpdate,
    ) -> Result<()> {
        let mut tables = self.write()?;
        tables.update_chapter(chapter_id, update)?;
        tables.questions.extend_from_slice(questions);
        Ok(())
    }

    async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>> {
        let tables = self.read()?;
        Ok(tables
            .units
            .iter()
            .filter(|u| u.course_id == course_id)
            .flat_map(|u| tables.chapters.iter().filter(move |c| c.unit_id == u.id))
            .cloned()
            .collect())
    }

    async fn list_questions(&self, chapter_id: &str) -> Result<Vec<PersistedQuestion>> {
        Ok(self
            .read()?
            .questions
            .iter()
            .filter(|q| q.chapter_id == chapter_id)
            .cloned()
            .collect())
    }
}
