//! Show command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::{Entity, LaerError};
use crate::quiz::PersistedQuestion;
use crate::store::{PersistenceGateway, SqliteGateway};
use anyhow::Result;
use serde::Serialize;

#[derive(Serialize)]
struct ChapterView<'a> {
    id: &'a str,
    name: &'a str,
    video_id: Option<&'a str>,
    summary: Option<&'a str>,
    content: Option<&'a str>,
    questions: &'a [PersistedQuestion],
}

/// Run the show command.
pub async fn run_show(chapter_id: &str, json: bool, settings: Settings) -> Result<()> {
    let gateway = SqliteGateway::new(&settings.sqlite_path())?;

    let chapter = gateway
        .find_chapter(chapter_id)
        .await?
        .ok_or_else(|| LaerError::not_found(Entity::Chapter, chapter_id))?;
    let questions = gateway.list_questions(chapter_id).await?;

    if json {
        let view = ChapterView {
            id: &chapter.id,
            name: &chapter.name,
            video_id: chapter.video_id.as_deref(),
            summary: chapter.summary.as_deref(),
            content: chapter.content.as_deref(),
            questions: &questions,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    Output::header(&chapter.name);
    Output::kv("ID", &chapter.id);
    Output::kv("Search phrase", &chapter.search_phrase);
    Output::kv("Video", chapter.video_id.as_deref().unwrap_or("none"));

    match (&chapter.summary, &chapter.content) {
        (None, None) => {
            Output::info("Nothing generated yet. Run 'laer generate' first.");
            return Ok(());
        }
        (summary, content) => {
            if let Some(summary) = summary {
                Output::section("Summary", summary);
            }
            if let Some(content) = content {
                Output::section("Content", content);
            }
        }
    }

    if !questions.is_empty() {
        println!();
        Output::kv("Questions", &questions.len().to_string());
        for (i, question) in questions.iter().enumerate() {
            Output::question(i + 1, question);
        }
    }

    Ok(())
}
