//! SQLite-backed persistence for cached channel and video metadata.
//!
//! All structs in this module mirror how rows are stored on disk and exposed
//! to the facade. Inserts are idempotent on the primary key; identity fields
//! of an existing row are never rewritten, only `duration` can change after
//! the fact.

use std::path::Path;

use libsql::{Builder, Connection, Row, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CatalogError, Result};

/// Row stored in the `channels` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: String,
    pub channel_title: String,
}

/// Row stored in the `videos` table.
///
/// `duration` and the thumbnail URLs are optional so rows created from a
/// listing response (which carries neither) can be filled in later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_high: Option<String>,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            channel_id TEXT PRIMARY KEY,
            channel_title TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            video_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            published_at TEXT,
            duration INTEGER,
            thumbnail_default TEXT,
            thumbnail_medium TEXT,
            thumbnail_high TEXT,
            FOREIGN KEY (channel_id) REFERENCES channels(channel_id)
        );

        CREATE INDEX IF NOT EXISTS idx_videos_channel_id ON videos(channel_id);
        CREATE INDEX IF NOT EXISTS idx_videos_published_at ON videos(published_at DESC);
        "#,
    )
    .await?;
    Ok(())
}

/// Wrapper around the SQLite-compatible connection that performs all
/// read/write operations against the cache database.
pub struct MetadataStore {
    conn: Connection,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Opens (and if necessary creates) the SQLite DB and ensures the
    /// expected schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;

        let store = Self { conn };
        store.ensure_tables().await?;
        debug!("opened metadata store at {}", path.display());
        Ok(store)
    }

    /// Runs the SQL required to create the tables if they do not already exist.
    async fn ensure_tables(&self) -> Result<()> {
        ensure_schema(&self.conn).await
    }

    /// Inserts a channel row. A second insert for the same `channel_id` is a
    /// no-op; the stored title is kept, not overwritten.
    pub async fn insert_channel(&self, channel_id: &str, channel_title: &str) -> Result<()> {
        if channel_id.is_empty() {
            return Err(CatalogError::Validation(
                "channel_id must not be empty".into(),
            ));
        }
        if channel_title.is_empty() {
            return Err(CatalogError::Validation(
                "channel_title must not be empty".into(),
            ));
        }

        self.conn
            .execute(
                r#"
                INSERT OR IGNORE INTO channels (channel_id, channel_title)
                VALUES (?1, ?2)
                "#,
                params![channel_id, channel_title],
            )
            .await?;
        Ok(())
    }

    /// Inserts a video row, idempotent on `video_id`. The channel row must
    /// already exist; a dangling `channel_id` fails with an integrity error.
    pub async fn insert_video(&self, video: &VideoRecord) -> Result<()> {
        validate_video(video)?;

        self.conn
            .execute(
                r#"
                INSERT OR IGNORE INTO videos (
                    video_id, title, channel_id, published_at, duration,
                    thumbnail_default, thumbnail_medium, thumbnail_high
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    video.video_id.as_str(),
                    video.title.as_str(),
                    video.channel_id.as_str(),
                    video.published_at.as_deref(),
                    video.duration,
                    video.thumbnail_default.as_deref(),
                    video.thumbnail_medium.as_deref(),
                    video.thumbnail_high.as_deref(),
                ],
            )
            .await
            .map_err(classify_write_error)?;
        Ok(())
    }

    /// Overwrites the `duration` field of an existing video. Matching zero
    /// rows is not an error; the call is a silent no-op then.
    pub async fn update_video_duration(
        &self,
        video_id: &str,
        duration: Option<i64>,
    ) -> Result<()> {
        self.conn
            .execute(
                r#"
                UPDATE videos SET duration = ?1
                WHERE video_id = ?2
                "#,
                params![duration, video_id],
            )
            .await?;
        Ok(())
    }

    pub async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT video_id, title, channel_id, published_at, duration,
                       thumbnail_default, thumbnail_medium, thumbnail_high
                FROM videos
                WHERE video_id = ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query([video_id]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_video(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT channel_id, channel_title
                FROM channels
                WHERE channel_id = ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query([channel_id]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_channel(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Videos of one channel whose `published_at` falls within
    /// `[start, end]`, both bounds inclusive, newest first.
    pub async fn videos_in_range(
        &self,
        channel_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<VideoRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT video_id, title, channel_id, published_at, duration,
                       thumbnail_default, thumbnail_medium, thumbnail_high
                FROM videos
                WHERE channel_id = ?1 AND published_at BETWEEN ?2 AND ?3
                ORDER BY published_at DESC
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![channel_id, start, end]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_video(&row)?);
        }
        Ok(records)
    }

    /// Channels whose title contains `keyword`, using the store's default
    /// `LIKE` collation.
    pub async fn search_channels_by_title(&self, keyword: &str) -> Result<Vec<ChannelRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT channel_id, channel_title
                FROM channels
                WHERE channel_title LIKE ?1
                "#,
            )
            .await?;

        let pattern = format!("%{keyword}%");
        let mut rows = stmt.query([pattern.as_str()]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_channel(&row)?);
        }
        Ok(records)
    }
}

fn validate_video(video: &VideoRecord) -> Result<()> {
    if video.video_id.is_empty() {
        return Err(CatalogError::Validation("video_id must not be empty".into()));
    }
    if video.title.is_empty() {
        return Err(CatalogError::Validation("title must not be empty".into()));
    }
    if video.channel_id.is_empty() {
        return Err(CatalogError::Validation(
            "channel_id must not be empty".into(),
        ));
    }
    Ok(())
}

/// Foreign-key failures map to the integrity variant; everything else stays
/// a storage failure.
fn classify_write_error(err: libsql::Error) -> CatalogError {
    let text = err.to_string();
    if text.contains("FOREIGN KEY constraint failed") {
        CatalogError::Integrity(text)
    } else {
        CatalogError::Storage(err)
    }
}

fn row_to_video(row: &Row) -> Result<VideoRecord> {
    // Column order must match the SELECT statements above.
    Ok(VideoRecord {
        video_id: row.get(0)?,
        title: row.get(1)?,
        channel_id: row.get(2)?,
        published_at: row.get(3)?,
        duration: row.get(4)?,
        thumbnail_default: row.get(5)?,
        thumbnail_medium: row.get(6)?,
        thumbnail_high: row.get(7)?,
    })
}

fn row_to_channel(row: &Row) -> Result<ChannelRecord> {
    Ok(ChannelRecord {
        channel_id: row.get(0)?,
        channel_title: row.get(1)?,
    })
}
