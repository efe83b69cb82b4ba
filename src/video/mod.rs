//! Video lookup and transcript acquisition.
//!
//! A [`VideoProvider`] talks to the outside world; [`TranscriptAcquirer`]
//! applies the pipeline's policy on top of it: failed searches degrade to
//! "no video", and transcripts are cut to a fixed word budget.

mod captions;
mod youtube;

pub use captions::vtt_to_text;
pub use youtube::YoutubeProvider;

use crate::error::{LaerError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Trait for video/transcript providers.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Find the best matching video for a search phrase.
    async fn search(&self, phrase: &str) -> Result<Option<String>>;

    /// Fetch the full transcript text of a video.
    async fn fetch_transcript(&self, video_id: &str) -> Result<String>;
}

/// Keep the first `budget` whitespace-separated words of `text`.
pub fn truncate_words(text: &str, budget: usize) -> String {
    text.split_whitespace()
        .take(budget)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Finds a chapter's video and its word-limited transcript.
pub struct TranscriptAcquirer {
    provider: Arc<dyn VideoProvider>,
    word_budget: usize,
}

impl TranscriptAcquirer {
    pub fn new(provider: Arc<dyn VideoProvider>, word_budget: usize) -> Self {
        Self {
            provider,
            word_budget,
        }
    }

    /// Look up a video. Provider errors are logged and reported as no match.
    #[instrument(skip(self))]
    pub async fn find_video(&self, search_phrase: &str) -> Option<String> {
        if search_phrase.trim().is_empty() {
            warn!("Empty search phrase, skipping video lookup");
            return None;
        }

        match self.provider.search(search_phrase).await {
            Ok(Some(video_id)) => {
                info!("Found video {}", video_id);
                Some(video_id)
            }
            Ok(None) => {
                info!("No video matched");
                None
            }
            Err(e) => {
                warn!("Video search failed, continuing without video: {}", e);
                None
            }
        }
    }

    /// Fetch a transcript truncated to the word budget.
    ///
    /// Any provider failure, or an empty transcript, is `TranscriptUnavailable`.
    #[instrument(skip(self))]
    pub async fn fetch_transcript(&self, video_id: &str) -> Result<String> {
        let transcript = match self.provider.fetch_transcript(video_id).await {
            Ok(text) => text,
            Err(LaerError::TranscriptUnavailable(reason)) => {
                return Err(LaerError::TranscriptUnavailable(reason))
            }
            Err(e) => {
                return Err(LaerError::TranscriptUnavailable(format!(
                    "{}: {}",
                    video_id, e
                )))
            }
        };

        let truncated = truncate_words(&transcript, self.word_budget);
        if truncated.is_empty() {
            return Err(LaerError::TranscriptUnavailable(format!(
                "{}: transcript is empty",
                video_id
            )));
        }
        Ok(truncated)
    }
}
