//! SQLite-based persistence gateway.

use super::{Chapter, ChapterUpdate, Course, PersistenceGateway, Unit};
use crate::error::{Entity, LaerError, Result};
use crate::quiz::PersistedQuestion;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    material TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS units (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id),
    name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_units_course_id ON units(course_id);

CREATE TABLE IF NOT EXISTS chapters (
    id TEXT PRIMARY KEY,
    unit_id TEXT NOT NULL REFERENCES units(id),
    name TEXT NOT NULL,
    search_phrase TEXT NOT NULL,
    video_id TEXT,
    summary TEXT,
    content TEXT
);

CREATE INDEX IF NOT EXISTS idx_chapters_unit_id ON chapters(unit_id);

CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY,
    chapter_id TEXT NOT NULL REFERENCES chapters(id),
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    options TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_questions_chapter_id ON questions(chapter_id);
"#;

/// SQLite gateway.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite database at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LaerError::Persistence(format!("Failed to acquire lock: {}", e)))
    }

    pub fn seed_course(&self, course: &Course) -> Result<()> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO courses (id, name, material) VALUES (?1, ?2, ?3)",
            params![course.id, course.name, course.material],
        )?;
        Ok(())
    }

    pub fn seed_unit(&self, unit: &Unit) -> Result<()> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO units (id, course_id, name) VALUES (?1, ?2, ?3)",
            params![unit.id, unit.course_id, unit.name],
        )?;
        Ok(())
    }

    pub fn seed_chapter(&self, chapter: &Chapter) -> Result<()> {
        self.lock()?.execute(
            r#"
            INSERT OR REPLACE INTO chapters
            (id, unit_id, name, search_phrase, video_id, summary, content)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                chapter.id,
                chapter.unit_id,
                chapter.name,
                chapter.search_phrase,
                chapter.video_id,
                chapter.summary,
                chapter.content,
            ],
        )?;
        Ok(())
    }

    fn row_to_chapter(row: &Row<'_>) -> rusqlite::Result<Chapter> {
        Ok(Chapter {
            id: row.get(0)?,
            unit_id: row.get(1)?,
            name: row.get(2)?,
            search_phrase: row.get(3)?,
            video_id: row.get(4)?,
            summary: row.get(5)?,
            content: row.get(6)?,
        })
    }

    fn insert_questions_on(conn: &Connection, questions: &[PersistedQuestion]) -> Result<usize> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO questions (id, chapter_id, question, answer, options, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;

        for question in questions {
            stmt.execute(params![
                question.id.to_string(),
                question.chapter_id,
                question.question,
                question.answer,
                question.options_json()?,
                question.created_at.to_rfc3339(),
            ])?;
        }
        Ok(questions.len())
    }

    fn update_chapter_on(conn: &Connection, id: &str, update: &ChapterUpdate) -> Result<()> {
        let changed = conn.execute(
            "UPDATE chapters SET video_id = ?1, summary = ?2, content = ?3 WHERE id = ?4",
            params![update.video_id, update.summary, update.content, id],
        )?;
        if changed == 0 {
            return Err(LaerError::not_found(Entity::Chapter, id));
        }
        Ok(())
    }
}

/// Raw question columns before parsing.
struct QuestionRow {
    id: String,
    chapter_id: String,
    question: String,
    answer: String,
    options: String,
    created_at: String,
}

impl QuestionRow {
    fn into_question(self) -> Result<PersistedQuestion> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| LaerError::Persistence(format!("Invalid question id {}: {}", self.id, e)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| LaerError::Persistence(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(PersistedQuestion {
            id,
            chapter_id: self.chapter_id,
            question: self.question,
            answer: self.answer,
            options: serde_json::from_str(&self.options)?,
            created_at,
        })
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn find_chapter(&self, id: &str) -> Result<Option<Chapter>> {
        let conn = self.lock()?;
        let chapter = conn
            .query_row(
                r#"
                SELECT id, unit_id, name, search_phrase, video_id, summary, content
                FROM chapters WHERE id = ?1
                "#,
                params![id],
                Self::row_to_chapter,
            )
            .optional()?;
        Ok(chapter)
    }

    async fn find_unit(&self, id: &str) -> Result<Option<Unit>> {
        let conn = self.lock()?;
        let unit = conn
            .query_row(
                "SELECT id, course_id, name FROM units WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Unit {
                        id: row.get(0)?,
                        course_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(unit)
    }

    async fn find_course(&self, id: &str) -> Result<Option<Course>> {
        let conn = self.lock()?;
        let course = conn
            .query_row(
                "SELECT id, name, material FROM courses WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Course {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        material: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(course)
    }

    #[instrument(skip(self, questions), fields(count = questions.len()))]
    async fn insert_questions(&self, questions: &[PersistedQuestion]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let count = Self::insert_questions_on(&tx, questions)?;
        tx.commit()?;
        debug!("Inserted {} questions", count);
        Ok(count)
    }

    #[instrument(skip(self, update))]
    async fn update_chapter(&self, id: &str, update: &ChapterUpdate) -> Result<()> {
        let conn = self.lock()?;
        Self::update_chapter_on(&conn, id, update)
    }

    #[instrument(skip(self, questions, update), fields(count = questions.len()))]
    async fn commit_chapter(
        &self,
        chapter_id: &str,
        questions: &[PersistedQuestion],
        update: &ChapterUpdate,
    ) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        // Dropping the transaction on error rolls both writes back
        Self::insert_questions_on(&tx, questions)?;
        Self::update_chapter_on(&tx, chapter_id, update)?;

        tx.commit()?;
        info!("Committed chapter {} with {} questions", chapter_id, questions.len());
        Ok(())
    }

    async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.unit_id, c.name, c.search_phrase, c.video_id, c.summary, c.content
            FROM chapters c
            JOIN units u ON u.id = c.unit_id
            WHERE u.course_id = ?1
            ORDER BY u.rowid, c.rowid
            "#,
        )?;

        let chapters = stmt
            .query_map(params![course_id], Self::row_to_chapter)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chapters)
    }

    async fn list_questions(&self, chapter_id: &str) -> Result<Vec<PersistedQuestion>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, chapter_id, question, answer, options, created_at
            FROM questions WHERE chapter_id = ?1
            ORDER BY created_at, rowid
            "#,
        )?;

        let rows = stmt
            .query_map(params![chapter_id], |row| {
                Ok(QuestionRow {
                    id: row.get(0)?,
                    chapter_id: row.get(1)?,
                    question: row.get(2)?,
                    answer: row.get(3)?,
                    options: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(QuestionRow::into_question).collect()
    }
}
