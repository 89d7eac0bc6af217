//! Typed client for the remote video catalog (YouTube Data API v3).
//!
//! One method per API operation, each with its own request and response
//! contract. Pagination cursors and id chunking are handled here; callers
//! only ever see complete results.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::store::{ChannelRecord, VideoRecord};

/// Maximum number of ids the `videos` endpoint accepts per call.
pub const MAX_IDS_PER_CALL: usize = 50;
/// Default page size for channel listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

const WIRE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A point in time accepted either as a typed UTC timestamp or as a string
/// already in the wire format.
#[derive(Debug, Clone)]
pub enum TimeBound {
    Utc(DateTime<Utc>),
    Raw(String),
}

impl TimeBound {
    /// Renders the bound in the exact format the API expects
    /// (`YYYY-MM-DDTHH:MM:SSZ`). Raw strings pass through untouched; their
    /// format is the caller's responsibility.
    pub fn to_wire(&self) -> String {
        match self {
            TimeBound::Utc(ts) => ts.format(WIRE_TIME_FORMAT).to_string(),
            TimeBound::Raw(text) => text.clone(),
        }
    }
}

impl From<DateTime<Utc>> for TimeBound {
    fn from(value: DateTime<Utc>) -> Self {
        TimeBound::Utc(value)
    }
}

impl From<&str> for TimeBound {
    fn from(value: &str) -> Self {
        TimeBound::Raw(value.to_owned())
    }
}

impl From<String> for TimeBound {
    fn from(value: String) -> Self {
        TimeBound::Raw(value)
    }
}

/// Listing result for a channel search. Listings never include durations;
/// those arrive later through [`CatalogClient::fetch_video_durations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub channel_id: String,
    pub published_at: Option<String>,
    pub thumbnail_default: Option<String>,
    pub thumbnail_medium: Option<String>,
    pub thumbnail_high: Option<String>,
}

impl VideoSummary {
    /// Converts the summary into a storable record with no duration yet.
    pub fn into_record(self) -> VideoRecord {
        VideoRecord {
            video_id: self.video_id,
            title: self.title,
            channel_id: self.channel_id,
            published_at: self.published_at,
            duration: None,
            thumbnail_default: self.thumbnail_default,
            thumbnail_medium: self.thumbnail_medium,
            thumbnail_high: self.thumbnail_high,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    channel_id: String,
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: ThumbnailSet,
}

#[derive(Debug, Default, Deserialize)]
struct ThumbnailSet {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
    snippet: Option<ChannelSnippet>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

/// Remote catalog client with one typed method per API operation.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    api_base: String,
    api_key: String,
    page_size: u32,
}

impl CatalogClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Overrides the listing page size, clamped to the API maximum.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_IDS_PER_CALL as u32);
        self
    }

    /// Fetches full details for one video, including its duration in whole
    /// seconds. An unknown id resolves to `None`; an unparseable duration
    /// leaves the field unset rather than failing the call.
    pub async fn fetch_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let url = format!("{}/videos", self.api_base);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let payload: VideoListResponse = response.json().await?;

        let Some(item) = payload.items.into_iter().next() else {
            return Ok(None);
        };
        let Some(snippet) = item.snippet else {
            return Ok(None);
        };
        let duration = item
            .content_details
            .and_then(|details| details.duration)
            .and_then(|raw| parse_iso8601_duration(&raw));

        Ok(Some(VideoRecord {
            video_id: item.id,
            title: snippet.title,
            channel_id: snippet.channel_id,
            published_at: snippet.published_at,
            duration,
            thumbnail_default: snippet.thumbnails.default.map(|thumb| thumb.url),
            thumbnail_medium: snippet.thumbnails.medium.map(|thumb| thumb.url),
            thumbnail_high: snippet.thumbnails.high.map(|thumb| thumb.url),
        }))
    }

    /// Fetches details for one channel. An unknown id resolves to `None`.
    pub async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        let url = format!("{}/channels", self.api_base);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("id", channel_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let payload: ChannelListResponse = response.json().await?;

        let Some(item) = payload.items.into_iter().next() else {
            return Ok(None);
        };
        let Some(snippet) = item.snippet else {
            return Ok(None);
        };
        Ok(Some(ChannelRecord {
            channel_id: item.id,
            channel_title: snippet.title,
        }))
    }

    /// Lists a channel's videos within the given window, newest first as the
    /// API orders them. Pagination cursors are followed until the remote
    /// reports no further pages; each cursor is requested exactly once.
    pub async fn list_channel_videos(
        &self,
        channel_id: &str,
        published_after: Option<&TimeBound>,
        published_before: Option<&TimeBound>,
    ) -> Result<Vec<VideoSummary>> {
        let url = format!("{}/search", self.api_base);
        let max_results = self.page_size.to_string();
        let mut page_token: Option<String> = None;
        let mut summaries = Vec::new();
        let mut pages = 0usize;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("part", "id,snippet".to_string()),
                ("channelId", channel_id.to_string()),
                ("maxResults", max_results.clone()),
                ("order", "date".to_string()),
                ("type", "video".to_string()),
                ("key", self.api_key.clone()),
            ];
            if let Some(after) = published_after {
                query.push(("publishedAfter", after.to_wire()));
            }
            if let Some(before) = published_before {
                query.push(("publishedBefore", before.to_wire()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .query(&query)
                .send()
                .await?
                .error_for_status()?;
            let payload: SearchResponse = response.json().await?;
            pages += 1;

            for item in payload.items {
                // Items without a video id or snippet carry nothing usable.
                let Some(video_id) = item.id.video_id else {
                    continue;
                };
                let Some(snippet) = item.snippet else {
                    continue;
                };
                summaries.push(VideoSummary {
                    video_id,
                    title: snippet.title,
                    channel_id: channel_id.to_owned(),
                    published_at: snippet.published_at,
                    thumbnail_default: snippet.thumbnails.default.map(|thumb| thumb.url),
                    thumbnail_medium: snippet.thumbnails.medium.map(|thumb| thumb.url),
                    thumbnail_high: snippet.thumbnails.high.map(|thumb| thumb.url),
                });
            }

            page_token = payload.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!(
            "listed {} videos for channel {channel_id} over {pages} pages",
            summaries.len()
        );
        Ok(summaries)
    }

    /// Batched duration lookup. The API caps each call at 50 ids, so the
    /// input is chunked and the per-chunk results merged. The returned map
    /// holds an entry for every requested id; ids the remote did not answer
    /// for, and durations that fail to parse, map to `None`.
    pub async fn fetch_video_durations(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, Option<i64>>> {
        let mut durations: HashMap<String, Option<i64>> = video_ids
            .iter()
            .map(|video_id| (video_id.clone(), None))
            .collect();
        let url = format!("{}/videos", self.api_base);

        for chunk in video_ids.chunks(MAX_IDS_PER_CALL) {
            let ids = chunk.join(",");
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("part", "contentDetails"),
                    ("id", ids.as_str()),
                    ("key", self.api_key.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?;
            let payload: VideoListResponse = response.json().await?;

            for item in payload.items {
                let parsed = item
                    .content_details
                    .and_then(|details| details.duration)
                    .and_then(|raw| parse_iso8601_duration(&raw));
                durations.insert(item.id, parsed);
            }
        }

        Ok(durations)
    }
}

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").unwrap()
});

/// Converts an ISO-8601 duration such as `PT1H2M3S` (optionally with a day
/// component) into whole seconds. Anything that does not parse yields `None`
/// so callers can record the duration as unknown instead of failing.
pub fn parse_iso8601_duration(raw: &str) -> Option<i64> {
    let captures = DURATION_PATTERN.captures(raw.trim())?;
    let mut matched = false;
    let mut total = 0i64;
    for (group, scale) in [(1, 86_400), (2, 3_600), (3, 60), (4, 1)] {
        if let Some(value) = captures.get(group) {
            total += value.as_str().parse::<i64>().ok()? * scale;
            matched = true;
        }
    }
    matched.then_some(total)
}
