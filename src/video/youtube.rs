//! YouTube provider: search via the Data API (or yt-dlp), captions via yt-dlp.

use super::{captions::vtt_to_text, VideoProvider};
use crate::config::{Settings, YoutubeSettings};
use crate::error::{LaerError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

/// YouTube video provider.
pub struct YoutubeProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    video_duration: String,
    max_results: u32,
    language: String,
    temp_dir: PathBuf,
    video_id_regex: Regex,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

impl YoutubeProvider {
    /// Build a provider from application settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.youtube,
            &settings.transcript.language,
            settings.temp_dir(),
        )
    }

    pub fn new(youtube: &YoutubeSettings, language: &str, temp_dir: PathBuf) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_key: youtube.resolved_api_key(),
            video_duration: youtube.video_duration.clone(),
            max_results: youtube.max_results.max(1),
            language: language.to_string(),
            temp_dir,
            video_id_regex: Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("Invalid regex"),
        })
    }

    fn is_video_id(&self, candidate: &str) -> bool {
        self.video_id_regex.is_match(candidate)
    }

    fn search_url(&self, api_key: &str, phrase: &str) -> Result<url::Url> {
        let max_results = self.max_results.to_string();
        url::Url::parse_with_params(
            SEARCH_ENDPOINT,
            &[
                ("key", api_key),
                ("q", phrase),
                ("videoDuration", self.video_duration.as_str()),
                ("videoEmbeddable", "true"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
            ],
        )
        .map_err(|e| LaerError::VideoSource(format!("Invalid search URL: {}", e)))
    }

    /// Search with the YouTube Data API.
    async fn search_api(&self, api_key: &str, phrase: &str) -> Result<Option<String>> {
        let url = self.search_url(api_key, phrase)?;
        let response: SearchResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(first_video_id(response))
    }

    /// Search with yt-dlp when no API key is configured.
    async fn search_ytdlp(&self, phrase: &str) -> Result<Option<String>> {
        let query = format!("ytsearch1:{}", phrase);
        let output = run_ytdlp(&[
            "--flat-playlist",
            "--print",
            "id",
            "--no-warnings",
            &query,
        ])
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LaerError::VideoSource(format!("yt-dlp search failed: {}", stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string))
    }

    /// Download captions into `dir` and return the first VTT file found.
    async fn download_captions(&self, video_id: &str, dir: &Path) -> Result<Option<PathBuf>> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let template = dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();
        let languages = format!("{lang},{lang}.*", lang = self.language);

        let output = run_ytdlp(&[
            "--skip-download",
            "--write-subs",
            "--write-auto-subs",
            "--sub-langs",
            &languages,
            "--sub-format",
            "vtt",
            "--no-playlist",
            "--no-warnings",
            "--quiet",
            "--output",
            &template,
            &url,
        ])
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LaerError::VideoSource(format!(
                "yt-dlp caption download failed: {}",
                stderr
            )));
        }

        let mut vtt_files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "vtt"))
            .collect();
        vtt_files.sort();

        Ok(vtt_files.into_iter().next())
    }
}

fn first_video_id(response: SearchResponse) -> Option<String> {
    response
        .items
        .into_iter()
        .find_map(|item| item.id.video_id)
}

async fn run_ytdlp(args: &[&str]) -> Result<std::process::Output> {
    Command::new("yt-dlp")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LaerError::ToolNotFound("yt-dlp".to_string())
            } else {
                LaerError::VideoSource(format!("Failed to run yt-dlp: {}", e))
            }
        })
}

#[async_trait]
impl VideoProvider for YoutubeProvider {
    #[instrument(skip(self))]
    async fn search(&self, phrase: &str) -> Result<Option<String>> {
        let found = match &self.api_key {
            Some(key) => self.search_api(key, phrase).await?,
            None => {
                debug!("No YouTube API key configured, searching with yt-dlp");
                self.search_ytdlp(phrase).await?
            }
        };

        Ok(found.filter(|id| self.is_video_id(id)))
    }

    #[instrument(skip(self))]
    async fn fetch_transcript(&self, video_id: &str) -> Result<String> {
        if !self.is_video_id(video_id) {
            return Err(LaerError::InvalidInput(format!(
                "Invalid YouTube video ID: {}",
                video_id
            )));
        }

        std::fs::create_dir_all(&self.temp_dir)?;
        let dir = tempfile::Builder::new()
            .prefix("captions-")
            .tempdir_in(&self.temp_dir)?;

        let vtt_path = self
            .download_captions(video_id, dir.path())
            .await?
            .ok_or_else(|| {
                LaerError::TranscriptUnavailable(format!(
                    "{}: no {} captions available",
                    video_id, self.language
                ))
            })?;

        let vtt = std::fs::read_to_string(&vtt_path)?;
        let text = vtt_to_text(&vtt);
        info!("Fetched transcript ({} words)", text.split_whitespace().count());
        Ok(text)
    }
}
