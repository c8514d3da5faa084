/// External collaborator abstractions
///
/// The recommendation pipeline never reaches for global clients; every
/// upstream dependency (identity, storage, metadata enrichment) comes in
/// through one of these traits, injected at construction. Production wires
/// them to Postgres and the Spotify Web API; tests wire mocks and in-memory
/// fakes.
use crate::{
    error::AppResult,
    models::{AudioFeatures, FeedbackRecord, TrackMeta, UserId},
};

pub mod spotify;

/// Outcome of a best-effort enrichment lookup.
///
/// Deliberately not a `Result`: enrichment providers must never let a failure
/// escape their boundary. `Unavailable` covers both "the provider has no data"
/// and "the provider could not be reached", and callers treat the two the
/// same way.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    Enriched(T),
    Unavailable,
}

impl<T> Enrichment<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Enrichment::Enriched(value) => Some(value),
            Enrichment::Unavailable => None,
        }
    }
}

/// Resolves a session token to a user identity.
///
/// Absence of a user is not an error; an unauthenticated caller simply has
/// no identity.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user<'a>(&self, session_token: Option<&'a str>) -> AppResult<Option<UserId>>;
}

/// Read-only view over persisted feedback and the candidate catalog.
///
/// This is the only collaborator whose failures propagate to the caller as
/// request-level errors; the core does not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// The user's most recent feedback, newest first, each record joined
    /// with its track.
    async fn recent_feedback(&self, user_id: UserId, limit: u32) -> AppResult<Vec<FeedbackRecord>>;

    /// A bounded slice of the track catalog in the store's default order.
    /// May include tracks the user has already rated; de-duplication is a
    /// caller concern.
    async fn candidate_pool(&self, limit: u32) -> AppResult<Vec<TrackMeta>>;
}

/// Best-effort track enrichment from an external metadata source
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Display metadata (name, artist, album art) for a track
    async fn fetch_meta(&self, spotify_id: &str) -> Enrichment<TrackMeta>;

    /// Audio-feature record for a track
    async fn fetch_audio_features(&self, spotify_id: &str) -> Enrichment<AudioFeatures>;
}

/// Write path for recording swipes.
///
/// Kept separate from `StorageProvider` so the recommendation core stays
/// strictly read-only; only the feedback route uses this.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FeedbackWriter: Send + Sync {
    async fn record_feedback(
        &self,
        user_id: UserId,
        spotify_id: &str,
        liked: bool,
    ) -> AppResult<()>;
}
