/// Spotify Web API provider
///
/// Implements `MetadataProvider` over the public Spotify endpoints:
/// 1. Token: POST {token_url} with the client-credentials grant
/// 2. Display metadata: GET /tracks/{id}
/// 3. Audio features: GET /audio-features/{id}
///
/// Every failure path (token fetch, transport, non-success status, decode)
/// collapses to `Enrichment::Unavailable` with a warning event; nothing this
/// provider does can fail a recommendation request.
use chrono::{DateTime, Duration, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{AudioFeatures, SpotifyTrack, TrackMeta},
    services::providers::{Enrichment, MetadataProvider},
};

/// Tokens are refreshed this many seconds before their reported expiry
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

pub struct SpotifyProvider {
    http_client: HttpClient,
    client_id: String,
    client_secret: String,
    api_url: String,
    token_url: String,
    token: RwLock<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl SpotifyProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        api_url: String,
        token_url: String,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            client_id,
            client_secret,
            api_url,
            token_url,
            token: RwLock::new(None),
        }
    }

    /// Returns a valid bearer token, refreshing via the client-credentials
    /// grant when the held one is missing or near expiry.
    async fn access_token(&self) -> AppResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting new Spotify access token");

        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "Spotify token endpoint returned status {}",
                status
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        let token = AccessToken {
            value: token_response.access_token,
            expires_at: Utc::now()
                + Duration::seconds(token_response.expires_in - TOKEN_EXPIRY_MARGIN_SECS),
        };

        let value = token.value.clone();
        *self.token.write().await = Some(token);

        Ok(value)
    }

    async fn get_track(&self, spotify_id: &str) -> AppResult<SpotifyTrack> {
        let token = self.access_token().await?;
        let url = format!("{}/tracks/{}", self.api_url, spotify_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Spotify API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn get_audio_features(&self, spotify_id: &str) -> AppResult<AudioFeatures> {
        let token = self.access_token().await?;
        let url = format!("{}/audio-features/{}", self.api_url, spotify_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Spotify API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for SpotifyProvider {
    async fn fetch_meta(&self, spotify_id: &str) -> Enrichment<TrackMeta> {
        match self.get_track(spotify_id).await {
            Ok(track) => {
                tracing::debug!(spotify_id = %spotify_id, "Fetched track metadata");
                Enrichment::Enriched(track.into())
            }
            Err(e) => {
                tracing::warn!(
                    spotify_id = %spotify_id,
                    error = %e,
                    "Track metadata fetch failed"
                );
                Enrichment::Unavailable
            }
        }
    }

    async fn fetch_audio_features(&self, spotify_id: &str) -> Enrichment<AudioFeatures> {
        match self.get_audio_features(spotify_id).await {
            Ok(features) => {
                tracing::debug!(spotify_id = %spotify_id, "Fetched audio features");
                Enrichment::Enriched(features)
            }
            Err(e) => {
                tracing::warn!(
                    spotify_id = %spotify_id,
                    error = %e,
                    "Audio features fetch failed"
                );
                Enrichment::Unavailable
            }
        }
    }
}
