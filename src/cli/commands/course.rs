//! Course command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{CancelToken, ChapterPipeline};
use anyhow::Result;
use tracing::warn;

/// Run the course command.
pub async fn run_course(course_id: &str, jobs: Option<usize>, mut settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Generate, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'laer doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    if let Some(jobs) = jobs {
        settings.pipeline.max_concurrent_chapters = jobs;
    }
    let pipeline = ChapterPipeline::from_settings(&settings)?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight chapters");
            on_interrupt.cancel();
        }
    });

    let bar = Output::progress_bar(
        0,
        &format!(
            "{} chapters at a time",
            settings.pipeline.max_concurrent_chapters.max(1)
        ),
    );
    let result = pipeline
        .process_course_with_progress(course_id, &cancel, |progress| {
            bar.set_length(progress.total as u64);
            bar.set_position(progress.done as u64);
            match progress.result {
                Ok(outcome) => bar.set_message(format!("{} done", outcome.chapter_id)),
                Err(failure) => bar.set_message(format!("{} failed", failure.chapter_id)),
            }
        })
        .await;
    bar.finish_and_clear();
    let report = result?;

    let total = report.results.len();
    let succeeded = report.success_count();
    for outcome in report.succeeded() {
        Output::kv(
            &outcome.chapter_id,
            &format!(
                "{} questions, video {}",
                outcome.questions.len(),
                outcome.video_id.as_deref().unwrap_or("none")
            ),
        );
    }
    for failure in report.failed() {
        Output::failure(failure);
    }

    if total == 0 {
        Output::warning(&format!("Course {} has no chapters.", course_id));
    } else if succeeded == total {
        Output::success(&format!("All {} chapters generated.", total));
    } else {
        Output::warning(&format!("{} of {} chapters generated.", succeeded, total));
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        anyhow::bail!("{} chapter(s) failed", total - succeeded);
    }

    Ok(())
}
