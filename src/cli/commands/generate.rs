//! Generate command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{Branch, ChapterPipeline};
use anyhow::Result;

/// Run the generate command.
pub async fn run_generate(chapter_id: &str, seed: Option<u64>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Generate, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'laer doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let mut pipeline = ChapterPipeline::from_settings(&settings)?;
    if let Some(seed) = seed {
        pipeline = pipeline.with_seed(seed);
    }

    let spinner = Output::spinner(&format!("Generating chapter {}...", chapter_id));
    let result = pipeline.process_chapter(chapter_id).await;
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            Output::success(&format!("Chapter {} generated", outcome.chapter_id));
            match (&outcome.video_id, outcome.branch) {
                (Some(id), Branch::Video) => Output::kv("Video", id),
                (Some(id), Branch::NameOnly) => {
                    Output::kv("Video", &format!("{} (no captions, summarized from name)", id))
                }
                (None, _) => Output::kv("Video", "none found, summarized from name"),
            }
            Output::kv("Questions", &outcome.questions.len().to_string());
            Output::section("Summary", &outcome.summary);
            Ok(())
        }
        Err(failure) => {
            Output::failure(&failure);
            Err(failure.into())
        }
    }
}
