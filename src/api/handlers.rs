use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::TrackMeta;

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub tracks: Vec<TrackResponse>,
}

/// Track shape returned to clients; audio features stay internal
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub spotify_id: String,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub album_art: Option<String>,
}

impl From<TrackMeta> for TrackResponse {
    fn from(track: TrackMeta) -> Self {
        Self {
            spotify_id: track.spotify_id,
            name: track.name,
            artist: track.artist,
            album_art: track.album_art,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub track_spotify_id: String,
    pub liked: bool,
}

/// Pulls the session token out of the Authorization header, if any
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// The sole recommendation entry point.
///
/// Unauthenticated callers get an empty list rather than an error; storage
/// failures surface as 500s from `AppError`.
pub async fn get_recommendations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RecommendationsQuery>,
) -> AppResult<Json<RecommendationsResponse>> {
    let limit = query.limit.unwrap_or(state.default_limit);
    if limit == 0 {
        return Err(AppError::InvalidInput(
            "limit must be a positive integer".to_string(),
        ));
    }

    let token = bearer_token(&headers);
    let tracks = state
        .pipeline
        .get_recommendations(token.as_deref(), limit)
        .await?;

    Ok(Json(RecommendationsResponse {
        tracks: tracks.into_iter().map(TrackResponse::from).collect(),
    }))
}

/// Records a like/dislike swipe for the authenticated user
pub async fn post_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<StatusCode> {
    if request.track_spotify_id.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "track_spotify_id must not be empty".to_string(),
        ));
    }

    let token = bearer_token(&headers);
    let Some(user_id) = state.auth.current_user(token.as_deref()).await? else {
        return Err(AppError::Unauthorized(
            "A valid session is required to record feedback".to_string(),
        ));
    };

    state
        .feedback
        .record_feedback(user_id, &request.track_spotify_id, request.liked)
        .await?;

    Ok(StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_present() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(bearer_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_bearer_token_missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc123"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_track_response_drops_features() {
        let mut track = TrackMeta::new("abc");
        track.name = Some("Song".to_string());
        track.audio_features = Some(Default::default());

        let response = TrackResponse::from(track);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("audio_features").is_none());
        assert_eq!(json["spotify_id"], "abc");
    }
}
