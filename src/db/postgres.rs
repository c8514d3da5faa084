use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{AudioFeatures, FeedbackRecord, TrackMeta, UserId},
    services::providers::{AuthProvider, FeedbackWriter, StorageProvider},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed implementation of the storage, auth and ingestion
/// collaborators.
///
/// All reads used by the pipeline go through `StorageProvider`; the write
/// path for swipes lives on `FeedbackWriter` and is only reachable from the
/// feedback route.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TrackRow {
    spotify_id: String,
    name: Option<String>,
    artist: Option<String>,
    album_art: Option<String>,
    audio_features: Option<Json<AudioFeatures>>,
}

impl From<TrackRow> for TrackMeta {
    fn from(row: TrackRow) -> Self {
        TrackMeta {
            spotify_id: row.spotify_id,
            name: row.name,
            artist: row.artist,
            album_art: row.album_art,
            audio_features: row.audio_features.map(|Json(features)| features),
        }
    }
}

#[derive(Debug, FromRow)]
struct FeedbackRow {
    user_id: Uuid,
    liked: bool,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    track: TrackRow,
}

impl From<FeedbackRow> for FeedbackRecord {
    fn from(row: FeedbackRow) -> Self {
        FeedbackRecord {
            user_id: row.user_id,
            track: row.track.into(),
            liked: row.liked,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
impl StorageProvider for PgStore {
    async fn recent_feedback(&self, user_id: UserId, limit: u32) -> AppResult<Vec<FeedbackRecord>> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            r#"
            SELECT f.user_id, f.liked, f.created_at,
                   t.spotify_id, t.name, t.artist, t.album_art, t.audio_features
            FROM user_feedback f
            JOIN tracks t ON t.id = f.track_id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedbackRecord::from).collect())
    }

    async fn candidate_pool(&self, limit: u32) -> AppResult<Vec<TrackMeta>> {
        let rows = sqlx::query_as::<_, TrackRow>(
            r#"
            SELECT spotify_id, name, artist, album_art, audio_features
            FROM tracks
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrackMeta::from).collect())
    }
}

#[async_trait::async_trait]
impl AuthProvider for PgStore {
    async fn current_user<'a>(&self, session_token: Option<&'a str>) -> AppResult<Option<UserId>> {
        let Some(token) = session_token else {
            return Ok(None);
        };

        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM sessions WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(user_id,)| user_id))
    }
}

#[async_trait::async_trait]
impl FeedbackWriter for PgStore {
    async fn record_feedback(
        &self,
        user_id: UserId,
        spotify_id: &str,
        liked: bool,
    ) -> AppResult<()> {
        // A swiped track may not be in the catalog yet; insert a bare row
        // that later enrichment passes can fill in.
        let (track_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tracks (spotify_id)
            VALUES ($1)
            ON CONFLICT (spotify_id) DO UPDATE SET spotify_id = EXCLUDED.spotify_id
            RETURNING id
            "#,
        )
        .bind(spotify_id)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("INSERT INTO user_feedback (user_id, track_id, liked) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(track_id)
            .bind(liked)
            .execute(&self.pool)
            .await?;

        tracing::debug!(
            user_id = %user_id,
            spotify_id = %spotify_id,
            liked = liked,
            "Recorded feedback"
        );

        Ok(())
    }
}
