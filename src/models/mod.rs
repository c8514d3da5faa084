use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for an authenticated user
pub type UserId = Uuid;

/// Number of dimensions in a complete feature vector
pub const FEATURE_DIMS: usize = 8;

/// Audio characteristics of a track as reported by the metadata provider.
///
/// Every field is optional: a track freshly inserted from a swipe has none of
/// them, and a partially enriched track may have any subset. Vectorization
/// (see `services::recommend::to_vector`) requires all eight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioFeatures {
    #[serde(default)]
    pub danceability: Option<f64>,
    #[serde(default)]
    pub energy: Option<f64>,
    #[serde(default)]
    pub valence: Option<f64>,
    #[serde(default)]
    pub tempo: Option<f64>,
    #[serde(default)]
    pub acousticness: Option<f64>,
    #[serde(default)]
    pub instrumentalness: Option<f64>,
    #[serde(default)]
    pub liveness: Option<f64>,
    #[serde(default)]
    pub speechiness: Option<f64>,
}

impl AudioFeatures {
    /// Returns the feature values in canonical order. This order is the one
    /// fixed contract shared by vectorization, centroid math and ranking.
    pub fn components(&self) -> [Option<f64>; FEATURE_DIMS] {
        [
            self.danceability,
            self.energy,
            self.valence,
            self.tempo,
            self.acousticness,
            self.instrumentalness,
            self.liveness,
            self.speechiness,
        ]
    }
}

/// A dense, dimensionally complete numeric encoding of a track's audio
/// characteristics.
///
/// Constructed only by `services::recommend`, so every position is guaranteed
/// to hold a finite number. A track with incomplete features has no vector at
/// all rather than a partial one.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(pub(crate) Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A track as presented to the recommendation engine and to API clients.
///
/// Display metadata and audio features are best-effort and may be absent;
/// enrichment fills them in when the metadata provider cooperates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub spotify_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album_art: Option<String>,
    #[serde(default)]
    pub audio_features: Option<AudioFeatures>,
}

impl TrackMeta {
    pub fn new(spotify_id: impl Into<String>) -> Self {
        Self {
            spotify_id: spotify_id.into(),
            name: None,
            artist: None,
            album_art: None,
            audio_features: None,
        }
    }

    /// True when any display field is missing
    pub fn display_incomplete(&self) -> bool {
        self.name.is_none() || self.artist.is_none() || self.album_art.is_none()
    }

    /// True when this track would benefit from an enrichment attempt
    pub fn needs_enrichment(&self) -> bool {
        self.display_incomplete() || self.audio_features.is_none()
    }

    /// Merges a partial record into this one, producing a new value.
    ///
    /// Precedence: an existing field always wins; the incoming value is used
    /// only where this record is explicitly missing one. The identifier is
    /// never replaced.
    pub fn merged_with(&self, partial: TrackMeta) -> TrackMeta {
        TrackMeta {
            spotify_id: self.spotify_id.clone(),
            name: self.name.clone().or(partial.name),
            artist: self.artist.clone().or(partial.artist),
            album_art: self.album_art.clone().or(partial.album_art),
            audio_features: self.audio_features.clone().or(partial.audio_features),
        }
    }
}

/// One like/dislike swipe, joined with the track it refers to.
///
/// Owned and persisted by the storage provider; the engine only ever reads a
/// bounded, newest-first slice of these.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub user_id: UserId,
    pub track: TrackMeta,
    pub liked: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Spotify Web API Types
// ============================================================================

/// Track object from GET /v1/tracks/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub album: Option<SpotifyAlbum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SpotifyAlbum {
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
}

impl From<SpotifyTrack> for TrackMeta {
    fn from(track: SpotifyTrack) -> Self {
        let artist = track.artists.into_iter().next().map(|a| a.name);
        let album_art = track
            .album
            .and_then(|album| album.images.into_iter().next())
            .map(|image| image.url);

        TrackMeta {
            spotify_id: track.id,
            name: Some(track.name),
            artist,
            album_art,
            audio_features: None,
        }
    }
}
