use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::Document;
use crate::error::LoadError;

const WATCH_URL: &str = "https://www.youtube.com/watch";

/// Returns the caption fragments of a video in exactly one language.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch_transcript(&self, video_id: &str, language: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct YoutubeLoader {
    fetcher: Arc<dyn TranscriptFetcher>,
    language: String,
}

impl YoutubeLoader {
    pub fn new(fetcher: Arc<dyn TranscriptFetcher>, language: impl Into<String>) -> Self {
        Self {
            fetcher,
            language: language.into(),
        }
    }

    pub async fn load(&self, input: &str) -> Result<Document, LoadError> {
        let video_id = extract_video_id(input)
            .ok_or_else(|| LoadError::Transcript(format!("invalid video id or url: {}", input.trim())))?;

        let fragments = self
            .fetcher
            .fetch_transcript(&video_id, &self.language)
            .await
            .map_err(|err| LoadError::Transcript(format!("{err:#}")))?;

        let text = fragments
            .iter()
            .map(|fragment| fragment.trim())
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let document = Document::from_fragments([text]);
        if document.is_empty() {
            return Err(LoadError::EmptyTranscript);
        }
        Ok(document)
    }
}

#[derive(Clone)]
pub struct HttpTranscriptFetcher {
    client: Client,
}

impl HttpTranscriptFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build transcript http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TranscriptFetcher for HttpTranscriptFetcher {
    async fn fetch_transcript(&self, video_id: &str, language: &str) -> Result<Vec<String>> {
        let page = self
            .client
            .get(WATCH_URL)
            .query(&[("v", video_id)])
            .header(ACCEPT_LANGUAGE, format!("{language},en;q=0.5"))
            .send()
            .await
            .context("failed to request video page")?
            .error_for_status()
            .context("video page returned non-success status")?
            .text()
            .await
            .context("failed to read video page")?;

        let tracks = parse_caption_tracks(&page)?;
        let track = select_track(&tracks, language).ok_or_else(|| {
            let available = tracks
                .iter()
                .map(|track| track.language_code.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            anyhow::anyhow!("no transcript in language '{language}' (available: [{available}])")
        })?;

        let xml = self
            .client
            .get(&track.base_url)
            .send()
            .await
            .context("failed to request transcript")?
            .error_for_status()
            .context("transcript endpoint returned non-success status")?
            .text()
            .await
            .context("failed to read transcript")?;

        parse_timedtext(&xml)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

pub fn extract_video_id(input: &str) -> Option<String> {
    let id_re = Regex::new(r"^[A-Za-z0-9_-]{11}$").ok()?;
    let trimmed = input.trim();
    if id_re.is_match(trimmed) {
        return Some(trimmed.to_string());
    }

    let lower = trimmed.to_ascii_lowercase();
    let url = if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("https://{trimmed}")).ok()?
    };

    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    let candidate = match host {
        "youtu.be" => segments.first().map(|s| s.to_string()),
        "youtube.com" | "music.youtube.com" => match segments.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
            _ => None,
        },
        _ => None,
    }?;

    id_re.is_match(&candidate).then_some(candidate)
}

fn parse_caption_tracks(page: &str) -> Result<Vec<CaptionTrack>> {
    let raw = extract_json_array(page, "\"captionTracks\":")
        .ok_or_else(|| anyhow::anyhow!("video has no captions available"))?;
    serde_json::from_str(raw).context("failed to decode caption track list")
}

/// Manual captions win over auto-generated ones in the same language.
fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let regional = format!("{language}-");
    let matching = tracks.iter().filter(|track| {
        track.language_code.eq_ignore_ascii_case(language)
            || track
                .language_code
                .to_ascii_lowercase()
                .starts_with(&regional.to_ascii_lowercase())
    });

    let mut fallback = None;
    for track in matching {
        if track.kind.as_deref() != Some("asr") {
            return Some(track);
        }
        fallback.get_or_insert(track);
    }
    fallback
}

/// Slice of the JSON array that follows `key`, honouring nested brackets and
/// string literals.
fn extract_json_array<'a>(source: &'a str, key: &str) -> Option<&'a str> {
    let key_pos = source.find(key)?;
    let start = key_pos + key.len() + source[key_pos + key.len()..].find('[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in source[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_timedtext(xml: &str) -> Result<Vec<String>> {
    let doc = roxmltree::Document::parse(xml).context("failed to parse transcript XML")?;

    let fragments = doc
        .descendants()
        .filter(|node| node.is_element() && matches!(node.tag_name().name(), "text" | "p"))
        .map(|node| {
            let raw = node
                .descendants()
                .filter(|child| child.is_text())
                .filter_map(|child| child.text())
                .collect::<Vec<_>>()
                .join("");
            decode_entities(&raw)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect();

    Ok(fragments)
}

fn decode_entities(text: &str) -> String {
    text.replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
