//! Read-through orchestration between the local store and the remote catalog.
//!
//! Lookups hit the store first and fall back to the remote, persisting
//! whatever comes back before returning it. Range reads follow a presence
//! policy: rows already stored for a window are served as-is, and only a
//! fully empty window triggers a remote sync.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::client::{CatalogClient, TimeBound, VideoSummary};
use crate::config::CatalogSettings;
use crate::error::Result;
use crate::store::{ChannelRecord, MetadataStore, VideoRecord};

/// The remote side of the cache. Implemented by [`CatalogClient`] and by
/// scripted doubles in tests.
#[allow(async_fn_in_trait)]
pub trait CatalogSource {
    async fn fetch_video(&self, video_id: &str) -> Result<Option<VideoRecord>>;

    async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>>;

    async fn list_channel_videos(
        &self,
        channel_id: &str,
        published_after: Option<&TimeBound>,
        published_before: Option<&TimeBound>,
    ) -> Result<Vec<VideoSummary>>;

    async fn fetch_video_durations(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, Option<i64>>>;
}

impl CatalogSource for CatalogClient {
    async fn fetch_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        CatalogClient::fetch_video(self, video_id).await
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        CatalogClient::fetch_channel(self, channel_id).await
    }

    async fn list_channel_videos(
        &self,
        channel_id: &str,
        published_after: Option<&TimeBound>,
        published_before: Option<&TimeBound>,
    ) -> Result<Vec<VideoSummary>> {
        CatalogClient::list_channel_videos(self, channel_id, published_after, published_before)
            .await
    }

    async fn fetch_video_durations(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, Option<i64>>> {
        CatalogClient::fetch_video_durations(self, video_ids).await
    }
}

/// Read-through cache facade tying the store and the remote together.
pub struct CachedCatalog<S> {
    store: MetadataStore,
    source: S,
}

impl CachedCatalog<CatalogClient> {
    /// Builds the full stack (store plus remote client) from resolved
    /// settings.
    pub async fn from_settings(settings: &CatalogSettings) -> Result<Self> {
        let store = MetadataStore::open(&settings.db_path).await?;
        let source = CatalogClient::new(&settings.api_base, &settings.api_key)?;
        Ok(Self::new(store, source))
    }
}

impl<S: CatalogSource> CachedCatalog<S> {
    pub fn new(store: MetadataStore, source: S) -> Self {
        Self { store, source }
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Returns the video from the store, fetching and persisting it on a
    /// miss. The owning channel is read through first so the video insert
    /// never dangles.
    pub async fn video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        if let Some(cached) = self.store.get_video(video_id).await? {
            debug!("video {video_id} served from store");
            return Ok(Some(cached));
        }

        let Some(fetched) = self.source.fetch_video(video_id).await? else {
            return Ok(None);
        };
        self.channel(&fetched.channel_id).await?;
        self.store.insert_video(&fetched).await?;
        debug!("video {video_id} fetched from remote");
        Ok(Some(fetched))
    }

    /// Returns the channel from the store, fetching and persisting it on a
    /// miss.
    pub async fn channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        if let Some(cached) = self.store.get_channel(channel_id).await? {
            return Ok(Some(cached));
        }

        let Some(fetched) = self.source.fetch_channel(channel_id).await? else {
            return Ok(None);
        };
        self.store
            .insert_channel(&fetched.channel_id, &fetched.channel_title)
            .await?;
        Ok(Some(fetched))
    }

    /// Pulls the remote listing for the window into the store, inserting
    /// each video without a duration. With `fetch_durations` set, a batched
    /// duration lookup follows and patches the new rows. Returns how many
    /// videos the listing produced; an unknown channel yields zero without
    /// a listing call.
    pub async fn sync_channel_videos(
        &self,
        channel_id: &str,
        published_after: impl Into<TimeBound>,
        published_before: impl Into<TimeBound>,
        fetch_durations: bool,
    ) -> Result<usize> {
        if self.channel(channel_id).await?.is_none() {
            info!("channel {channel_id} not found, nothing to sync");
            return Ok(0);
        }

        let after = published_after.into();
        let before = published_before.into();
        let summaries = self
            .source
            .list_channel_videos(channel_id, Some(&after), Some(&before))
            .await?;

        let mut video_ids = Vec::with_capacity(summaries.len());
        for summary in summaries {
            video_ids.push(summary.video_id.clone());
            self.store.insert_video(&summary.into_record()).await?;
        }

        if fetch_durations && !video_ids.is_empty() {
            let durations = self.source.fetch_video_durations(&video_ids).await?;
            for (video_id, duration) in durations {
                self.store.update_video_duration(&video_id, duration).await?;
            }
        }

        info!("synced {} videos for channel {channel_id}", video_ids.len());
        Ok(video_ids.len())
    }

    /// Range read over the store. Any stored rows in the window are returned
    /// as-is, even when the remote holds more for the same window; only an
    /// empty result triggers a sync (without durations) and a re-query.
    pub async fn channel_videos_in_range(
        &self,
        channel_id: &str,
        start: impl Into<TimeBound>,
        end: impl Into<TimeBound>,
    ) -> Result<Vec<VideoRecord>> {
        let start = normalize_bound(start.into());
        let end = normalize_bound(end.into());

        let cached = self.store.videos_in_range(channel_id, &start, &end).await?;
        if !cached.is_empty() {
            debug!("range [{start}, {end}] for {channel_id} served from store");
            return Ok(cached);
        }

        self.sync_channel_videos(
            channel_id,
            TimeBound::Raw(start.clone()),
            TimeBound::Raw(end.clone()),
            false,
        )
        .await?;

        self.store.videos_in_range(channel_id, &start, &end).await
    }
}

/// Renders a bound for the store query, appending the UTC designator to bare
/// strings that lack one. Typed bounds already render with the designator.
fn normalize_bound(bound: TimeBound) -> String {
    let text = bound.to_wire();
    if text.ends_with('Z') {
        text
    } else {
        format!("{text}Z")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use anyhow::Result;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Canned remote with call recording. Each fixture map holds what the
    /// "remote" knows about; the mutexes record how it was called.
    #[derive(Default)]
    struct ScriptedCatalog {
        videos: HashMap<String, VideoRecord>,
        channels: HashMap<String, ChannelRecord>,
        listings: HashMap<String, Vec<VideoSummary>>,
        durations: HashMap<String, i64>,
        video_calls: Mutex<usize>,
        channel_calls: Mutex<usize>,
        list_calls: Mutex<Vec<(String, Option<String>, Option<String>)>>,
        duration_calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedCatalog {
        fn with_channel(mut self, channel_id: &str, title: &str) -> Self {
            self.channels.insert(
                channel_id.to_owned(),
                ChannelRecord {
                    channel_id: channel_id.to_owned(),
                    channel_title: title.to_owned(),
                },
            );
            self
        }

        fn with_video(mut self, video: VideoRecord) -> Self {
            self.videos.insert(video.video_id.clone(), video);
            self
        }

        fn with_listing(mut self, channel_id: &str, summaries: Vec<VideoSummary>) -> Self {
            self.listings.insert(channel_id.to_owned(), summaries);
            self
        }

        fn with_duration(mut self, video_id: &str, seconds: i64) -> Self {
            self.durations.insert(video_id.to_owned(), seconds);
            self
        }

        fn list_call_count(&self) -> usize {
            self.list_calls.lock().unwrap().len()
        }
    }

    impl CatalogSource for ScriptedCatalog {
        async fn fetch_video(&self, video_id: &str) -> crate::error::Result<Option<VideoRecord>> {
            *self.video_calls.lock().unwrap() += 1;
            Ok(self.videos.get(video_id).cloned())
        }

        async fn fetch_channel(
            &self,
            channel_id: &str,
        ) -> crate::error::Result<Option<ChannelRecord>> {
            *self.channel_calls.lock().unwrap() += 1;
            Ok(self.channels.get(channel_id).cloned())
        }

        async fn list_channel_videos(
            &self,
            channel_id: &str,
            published_after: Option<&TimeBound>,
            published_before: Option<&TimeBound>,
        ) -> crate::error::Result<Vec<VideoSummary>> {
            self.list_calls.lock().unwrap().push((
                channel_id.to_owned(),
                published_after.map(TimeBound::to_wire),
                published_before.map(TimeBound::to_wire),
            ));
            Ok(self.listings.get(channel_id).cloned().unwrap_or_default())
        }

        async fn fetch_video_durations(
            &self,
            video_ids: &[String],
        ) -> crate::error::Result<HashMap<String, Option<i64>>> {
            self.duration_calls.lock().unwrap().push(video_ids.to_vec());
            Ok(video_ids
                .iter()
                .map(|id| (id.clone(), self.durations.get(id).copied()))
                .collect())
        }
    }

    fn remote_video(id: &str, channel_id: &str, published_at: &str) -> VideoRecord {
        VideoRecord {
            video_id: id.to_owned(),
            title: format!("Video {id}"),
            channel_id: channel_id.to_owned(),
            published_at: Some(published_at.to_owned()),
            duration: Some(321),
            thumbnail_default: Some(format!("https://i.ytimg.com/vi/{id}/default.jpg")),
            thumbnail_medium: None,
            thumbnail_high: None,
        }
    }

    fn summary(id: &str, channel_id: &str, published_at: &str) -> VideoSummary {
        VideoSummary {
            video_id: id.to_owned(),
            title: format!("Video {id}"),
            channel_id: channel_id.to_owned(),
            published_at: Some(published_at.to_owned()),
            thumbnail_default: None,
            thumbnail_medium: None,
            thumbnail_high: None,
        }
    }

    async fn catalog_with(
        source: ScriptedCatalog,
    ) -> Result<(tempfile::TempDir, CachedCatalog<ScriptedCatalog>)> {
        let dir = tempdir()?;
        let store = MetadataStore::open(&dir.path().join("youtube.db")).await?;
        Ok((dir, CachedCatalog::new(store, source)))
    }

    #[tokio::test]
    async fn video_read_through_fetches_once() -> Result<()> {
        let source = ScriptedCatalog::default()
            .with_channel("UC1", "Channel One")
            .with_video(remote_video("v1", "UC1", "2024-01-10T00:00:00Z"));
        let (_temp, catalog) = catalog_with(source).await?;

        let first = catalog.video("v1").await?.expect("video resolved");
        assert_eq!(first.title, "Video v1");
        // The owning channel was inserted as a side effect.
        let channel = catalog.store().get_channel("UC1").await?.expect("channel");
        assert_eq!(channel.channel_title, "Channel One");

        let second = catalog.video("v1").await?.expect("video resolved");
        assert_eq!(second, first);
        assert_eq!(*catalog.source.video_calls.lock().unwrap(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn video_absent_everywhere_is_none() -> Result<()> {
        let (_temp, catalog) = catalog_with(ScriptedCatalog::default()).await?;
        assert!(catalog.video("ghost").await?.is_none());
        assert!(catalog.store().get_video("ghost").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn video_with_unknown_channel_surfaces_integrity_error() -> Result<()> {
        // The remote knows the video but not its channel, so the insert has
        // nothing to reference.
        let source = ScriptedCatalog::default()
            .with_video(remote_video("v1", "UC-void", "2024-01-10T00:00:00Z"));
        let (_temp, catalog) = catalog_with(source).await?;

        let err = catalog.video("v1").await.unwrap_err();
        assert!(matches!(err, CatalogError::Integrity(_)));
        Ok(())
    }

    #[tokio::test]
    async fn channel_read_through_fetches_once() -> Result<()> {
        let source = ScriptedCatalog::default().with_channel("UC1", "Channel One");
        let (_temp, catalog) = catalog_with(source).await?;

        let first = catalog.channel("UC1").await?.expect("channel resolved");
        assert_eq!(first.channel_title, "Channel One");
        let second = catalog.channel("UC1").await?.expect("channel resolved");
        assert_eq!(second, first);
        assert_eq!(*catalog.source.channel_calls.lock().unwrap(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn sync_inserts_listing_without_durations() -> Result<()> {
        let source = ScriptedCatalog::default()
            .with_channel("UC1", "Channel One")
            .with_listing(
                "UC1",
                vec![
                    summary("v1", "UC1", "2024-01-20T00:00:00Z"),
                    summary("v2", "UC1", "2024-01-10T00:00:00Z"),
                ],
            );
        let (_temp, catalog) = catalog_with(source).await?;

        let count = catalog
            .sync_channel_videos("UC1", "2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z", false)
            .await?;
        assert_eq!(count, 2);

        let stored = catalog.store().get_video("v1").await?.expect("stored");
        assert_eq!(stored.duration, None);
        assert!(catalog.source.duration_calls.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sync_with_durations_patches_new_rows() -> Result<()> {
        let source = ScriptedCatalog::default()
            .with_channel("UC1", "Channel One")
            .with_listing(
                "UC1",
                vec![
                    summary("v1", "UC1", "2024-01-20T00:00:00Z"),
                    summary("v2", "UC1", "2024-01-10T00:00:00Z"),
                ],
            )
            .with_duration("v1", 600);
        let (_temp, catalog) = catalog_with(source).await?;

        catalog
            .sync_channel_videos("UC1", "2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z", true)
            .await?;

        let v1 = catalog.store().get_video("v1").await?.expect("stored");
        assert_eq!(v1.duration, Some(600));
        // v2 had no remote duration and stays unset.
        let v2 = catalog.store().get_video("v2").await?.expect("stored");
        assert_eq!(v2.duration, None);

        let duration_calls = catalog.source.duration_calls.lock().unwrap();
        assert_eq!(duration_calls.len(), 1);
        assert_eq!(duration_calls[0], vec!["v1".to_string(), "v2".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn sync_unknown_channel_lists_nothing() -> Result<()> {
        let (_temp, catalog) = catalog_with(ScriptedCatalog::default()).await?;
        let count = catalog
            .sync_channel_videos("UC-void", "2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z", false)
            .await?;
        assert_eq!(count, 0);
        assert_eq!(catalog.source.list_call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn presence_in_range_short_circuits_the_remote() -> Result<()> {
        // The remote listing holds more rows for the same window; one stored
        // row is enough to keep the facade local.
        let source = ScriptedCatalog::default()
            .with_channel("UC1", "Channel One")
            .with_listing(
                "UC1",
                vec![
                    summary("v1", "UC1", "2024-01-10T00:00:00Z"),
                    summary("v2", "UC1", "2024-01-15T00:00:00Z"),
                ],
            );
        let (_temp, catalog) = catalog_with(source).await?;

        catalog.store().insert_channel("UC1", "Channel One").await?;
        catalog
            .store()
            .insert_video(&summary("v1", "UC1", "2024-01-10T00:00:00Z").into_record())
            .await?;

        let videos = catalog
            .channel_videos_in_range("UC1", "2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z")
            .await?;
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].video_id, "v1");
        assert_eq!(catalog.source.list_call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_range_syncs_once_and_returns_descending() -> Result<()> {
        let source = ScriptedCatalog::default()
            .with_channel("UC123", "Channel")
            .with_listing(
                "UC123",
                vec![
                    summary("v-old", "UC123", "2024-01-05T00:00:00Z"),
                    summary("v-new", "UC123", "2024-01-25T00:00:00Z"),
                    summary("v-mid", "UC123", "2024-01-15T00:00:00Z"),
                ],
            );
        let (_temp, catalog) = catalog_with(source).await?;

        let videos = catalog
            .channel_videos_in_range("UC123", "2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z")
            .await?;

        let ids: Vec<&str> = videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, ["v-new", "v-mid", "v-old"]);
        assert!(videos.iter().all(|v| v.duration.is_none()));
        assert_eq!(catalog.source.list_call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn bare_range_bounds_get_the_utc_designator() -> Result<()> {
        let source = ScriptedCatalog::default()
            .with_channel("UC1", "Channel One")
            .with_listing("UC1", vec![summary("v1", "UC1", "2024-01-10T00:00:00Z")]);
        let (_temp, catalog) = catalog_with(source).await?;

        let videos = catalog
            .channel_videos_in_range("UC1", "2024-01-01T00:00:00", "2024-01-31T23:59:59")
            .await?;
        assert_eq!(videos.len(), 1);

        let list_calls = catalog.source.list_calls.lock().unwrap();
        assert_eq!(
            list_calls[0],
            (
                "UC1".to_string(),
                Some("2024-01-01T00:00:00Z".to_string()),
                Some("2024-01-31T23:59:59Z".to_string()),
            )
        );
        Ok(())
    }

    #[tokio::test]
    async fn range_may_stay_empty_after_a_sync() -> Result<()> {
        let source = ScriptedCatalog::default().with_channel("UC1", "Channel One");
        let (_temp, catalog) = catalog_with(source).await?;

        let videos = catalog
            .channel_videos_in_range("UC1", "2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z")
            .await?;
        assert!(videos.is_empty());
        assert_eq!(catalog.source.list_call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn remote_failure_propagates_instead_of_reading_as_empty() -> Result<()> {
        // A real client pointed at a dead port; the connection error must
        // reach the caller as a remote failure, not as "no data".
        let dir = tempdir()?;
        let store = MetadataStore::open(&dir.path().join("youtube.db")).await?;
        let client = CatalogClient::new("http://127.0.0.1:1", "test-key")?;
        let catalog = CachedCatalog::new(store, client);

        let err = catalog.video("v1").await.unwrap_err();
        assert!(matches!(err, CatalogError::Remote(_)));
        Ok(())
    }

    #[tokio::test]
    async fn from_settings_builds_a_working_stack() -> Result<()> {
        let dir = tempdir()?;
        let settings = crate::config::resolve_settings(crate::config::SettingsOverrides {
            api_key: Some("test-key".into()),
            db_path: Some(dir.path().join("youtube.db")),
            api_base: Some("http://127.0.0.1:1".into()),
            env_path: Some(dir.path().join("no.env")),
        })?;

        let catalog = CachedCatalog::from_settings(&settings).await?;
        catalog.store().insert_channel("UC1", "Channel").await?;
        assert!(catalog.store().get_channel("UC1").await?.is_some());
        Ok(())
    }
}
