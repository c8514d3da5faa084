//! Recommendation request orchestration.
//!
//! One pipeline instance is shared across requests, but every call is pure
//! given its inputs: the centroid is recomputed fresh, enrichment results
//! live only in the request's candidate values, and nothing is written back.

use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{FeatureVector, FeedbackRecord, TrackMeta},
    services::{
        providers::{AuthProvider, Enrichment, MetadataProvider, StorageProvider},
        recommend,
    },
};

pub struct RecommendationPipeline {
    auth: Arc<dyn AuthProvider>,
    storage: Arc<dyn StorageProvider>,
    metadata: Arc<dyn MetadataProvider>,
    feedback_limit: u32,
    pool_limit: u32,
}

impl RecommendationPipeline {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        storage: Arc<dyn StorageProvider>,
        metadata: Arc<dyn MetadataProvider>,
        feedback_limit: u32,
        pool_limit: u32,
    ) -> Self {
        Self {
            auth,
            storage,
            metadata,
            feedback_limit,
            pool_limit,
        }
    }

    /// Produces the next tracks to present, ranked by preference when a
    /// centroid exists and in the catalog's default order otherwise.
    ///
    /// An unauthenticated caller gets an empty list, not an error. Storage
    /// failures are the only errors that escape.
    pub async fn get_recommendations(
        &self,
        session_token: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<TrackMeta>> {
        let Some(user_id) = self.auth.current_user(session_token).await? else {
            tracing::debug!("No authenticated user, returning empty recommendation list");
            return Ok(Vec::new());
        };

        let feedback = self
            .storage
            .recent_feedback(user_id, self.feedback_limit)
            .await?;
        let (liked, disliked) = partition_feedback(&feedback);

        // Disliked vectors are collected for observability only; the current
        // scoring policy does not consume them.
        tracing::debug!(
            user_id = %user_id,
            feedback_count = feedback.len(),
            liked = liked.len(),
            disliked = disliked.len(),
            dropped = feedback.len() - liked.len() - disliked.len(),
            "Partitioned feedback into vectors"
        );

        let centroid = recommend::average_centroid(&liked);

        let pool = self.storage.candidate_pool(self.pool_limit).await?;
        let pool = self.enrich_pool(pool).await;

        let results = match centroid {
            Some(centroid) => {
                let rankable: Vec<TrackMeta> = pool
                    .into_iter()
                    .filter(|candidate| {
                        recommend::to_vector(candidate.audio_features.as_ref()).is_some()
                    })
                    .collect();

                tracing::info!(
                    user_id = %user_id,
                    rankable = rankable.len(),
                    "Ranking candidates against preference centroid"
                );

                recommend::rank_by_similarity(&centroid, rankable, limit)
            }
            None => {
                tracing::info!(
                    user_id = %user_id,
                    "No preference signal, using fallback ordering"
                );
                recommend::pick_fallback(pool, limit)
            }
        };

        Ok(results)
    }

    /// Best-effort enrichment of candidates that are missing display metadata
    /// or audio features.
    ///
    /// Lookups run concurrently since candidates are independent of each
    /// other; results are merged back by index so the pool keeps its original
    /// order no matter which task settles first. A failed enrichment leaves
    /// the candidate with whatever data it already had.
    async fn enrich_pool(&self, mut pool: Vec<TrackMeta>) -> Vec<TrackMeta> {
        let mut tasks = Vec::new();

        for (index, candidate) in pool.iter().enumerate() {
            if !candidate.needs_enrichment() {
                continue;
            }

            let metadata = Arc::clone(&self.metadata);
            let spotify_id = candidate.spotify_id.clone();
            let needs_meta = candidate.display_incomplete();
            let needs_features = candidate.audio_features.is_none();

            tasks.push(tokio::spawn(async move {
                let meta = if needs_meta {
                    metadata.fetch_meta(&spotify_id).await
                } else {
                    Enrichment::Unavailable
                };
                let features = if needs_features {
                    metadata.fetch_audio_features(&spotify_id).await
                } else {
                    Enrichment::Unavailable
                };
                (index, meta, features)
            }));
        }

        for task in tasks {
            match task.await {
                Ok((index, meta, features)) => {
                    let slot = &mut pool[index];
                    if let Enrichment::Enriched(partial) = meta {
                        *slot = slot.merged_with(partial);
                    }
                    if let Enrichment::Enriched(features) = features {
                        if slot.audio_features.is_none() {
                            slot.audio_features = Some(features);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Enrichment task join error");
                }
            }
        }

        pool
    }
}

/// Vectorizes each feedback record's track and splits the vectors by swipe
/// direction. Records whose tracks lack a complete feature set are silently
/// dropped; they never abort the request.
fn partition_feedback(records: &[FeedbackRecord]) -> (Vec<FeatureVector>, Vec<FeatureVector>) {
    let mut liked = Vec::new();
    let mut disliked = Vec::new();

    for record in records {
        let Some(vector) = recommend::to_vector(record.track.audio_features.as_ref()) else {
            continue;
        };
        if record.liked {
            liked.push(vector);
        } else {
            disliked.push(vector);
        }
    }

    (liked, disliked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{AudioFeatures, UserId, FEATURE_DIMS};
    use crate::services::providers::{
        MockAuthProvider, MockMetadataProvider, MockStorageProvider,
    };
    use chrono::Utc;
    use mockall::predicate::eq;
    use uuid::Uuid;

    fn features(values: [f64; FEATURE_DIMS]) -> AudioFeatures {
        AudioFeatures {
            danceability: Some(values[0]),
            energy: Some(values[1]),
            valence: Some(values[2]),
            tempo: Some(values[3]),
            acousticness: Some(values[4]),
            instrumentalness: Some(values[5]),
            liveness: Some(values[6]),
            speechiness: Some(values[7]),
        }
    }

    fn track(id: &str, values: [f64; FEATURE_DIMS]) -> TrackMeta {
        let mut meta = TrackMeta::new(id);
        meta.name = Some(format!("name-{}", id));
        meta.artist = Some(format!("artist-{}", id));
        meta.album_art = Some(format!("https://img.example/{}", id));
        meta.audio_features = Some(features(values));
        meta
    }

    fn feedback(user_id: UserId, track: TrackMeta, liked: bool) -> FeedbackRecord {
        FeedbackRecord {
            user_id,
            track,
            liked,
            created_at: Utc::now(),
        }
    }

    fn no_enrichment() -> MockMetadataProvider {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_fetch_meta()
            .returning(|_| Enrichment::Unavailable);
        metadata
            .expect_fetch_audio_features()
            .returning(|_| Enrichment::Unavailable);
        metadata
    }

    fn pipeline(
        auth: MockAuthProvider,
        storage: MockStorageProvider,
        metadata: MockMetadataProvider,
    ) -> RecommendationPipeline {
        RecommendationPipeline::new(
            Arc::new(auth),
            Arc::new(storage),
            Arc::new(metadata),
            200,
            200,
        )
    }

    #[tokio::test]
    async fn test_unauthenticated_user_gets_empty_list() {
        let mut auth = MockAuthProvider::new();
        auth.expect_current_user().returning(|_| Ok(None));

        // Storage must never be touched without an identity
        let storage = MockStorageProvider::new();
        let metadata = MockMetadataProvider::new();

        let pipeline = pipeline(auth, storage, metadata);
        let result = pipeline.get_recommendations(None, 20).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_no_feedback_falls_back_to_pool_order() {
        let user_id = Uuid::new_v4();

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        let pool = vec![
            track("one", [0.1; FEATURE_DIMS]),
            track("two", [0.2; FEATURE_DIMS]),
            track("three", [0.3; FEATURE_DIMS]),
        ];

        let mut storage = MockStorageProvider::new();
        storage
            .expect_recent_feedback()
            .with(eq(user_id), eq(200))
            .returning(|_, _| Ok(Vec::new()));
        let pool_clone = pool.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(pool_clone.clone()));

        let pipeline = pipeline(auth, storage, no_enrichment());
        let result = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        assert_eq!(result, pool);
    }

    #[tokio::test]
    async fn test_liked_tracks_drive_ranking() {
        let user_id = Uuid::new_v4();
        let liked_shape = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        // Two likes with identical vectors: centroid equals that vector
        let records = vec![
            feedback(user_id, track("liked-a", liked_shape), true),
            feedback(user_id, track("liked-b", liked_shape), true),
        ];

        let pool = vec![
            track("orthogonal", [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            track("exact-match", liked_shape),
        ];

        let mut storage = MockStorageProvider::new();
        let records_clone = records.clone();
        storage
            .expect_recent_feedback()
            .returning(move |_, _| Ok(records_clone.clone()));
        let pool_clone = pool.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(pool_clone.clone()));

        let pipeline = pipeline(auth, storage, no_enrichment());
        let result = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        assert_eq!(result[0].spotify_id, "exact-match");
        assert_eq!(result[1].spotify_id, "orthogonal");
    }

    #[tokio::test]
    async fn test_feedback_without_features_is_skipped() {
        let user_id = Uuid::new_v4();

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        // The only feedback record has no stored features, so no centroid
        // can be built and the request must fall back, not fail.
        let records = vec![feedback(user_id, TrackMeta::new("bare"), true)];
        let pool = vec![track("one", [0.5; FEATURE_DIMS]), track("two", [0.6; FEATURE_DIMS])];

        let mut storage = MockStorageProvider::new();
        let records_clone = records.clone();
        storage
            .expect_recent_feedback()
            .returning(move |_, _| Ok(records_clone.clone()));
        let pool_clone = pool.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(pool_clone.clone()));

        let pipeline = pipeline(auth, storage, no_enrichment());
        let result = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        assert_eq!(result, pool);
    }

    #[tokio::test]
    async fn test_unvectorizable_candidates_excluded_from_ranking() {
        let user_id = Uuid::new_v4();
        let shape = [0.4; FEATURE_DIMS];

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        let records = vec![feedback(user_id, track("liked", shape), true)];
        let pool = vec![TrackMeta::new("featureless"), track("complete", shape)];

        let mut storage = MockStorageProvider::new();
        let records_clone = records.clone();
        storage
            .expect_recent_feedback()
            .returning(move |_, _| Ok(records_clone.clone()));
        let pool_clone = pool.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(pool_clone.clone()));

        let pipeline = pipeline(auth, storage, no_enrichment());
        let result = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].spotify_id, "complete");
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let user_id = Uuid::new_v4();

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        let mut storage = MockStorageProvider::new();
        storage
            .expect_recent_feedback()
            .returning(|_, _| Err(AppError::Database(sqlx::Error::PoolClosed)));

        let pipeline = pipeline(auth, storage, MockMetadataProvider::new());
        let result = pipeline.get_recommendations(Some("token"), 20).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_enrichment_fills_missing_fields_only() {
        let user_id = Uuid::new_v4();

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        // Candidate knows its name but nothing else
        let mut sparse = TrackMeta::new("sparse");
        sparse.name = Some("Kept Name".to_string());

        let mut storage = MockStorageProvider::new();
        storage
            .expect_recent_feedback()
            .returning(|_, _| Ok(Vec::new()));
        let sparse_clone = sparse.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(vec![sparse_clone.clone()]));

        let mut metadata = MockMetadataProvider::new();
        metadata.expect_fetch_meta().returning(|id| {
            let mut partial = TrackMeta::new(id);
            partial.name = Some("Provider Name".to_string());
            partial.artist = Some("Provider Artist".to_string());
            partial.album_art = Some("https://img.example/p".to_string());
            Enrichment::Enriched(partial)
        });
        metadata
            .expect_fetch_audio_features()
            .returning(|_| Enrichment::Enriched(features([0.5; FEATURE_DIMS])));

        let pipeline = pipeline(auth, storage, metadata);
        let result = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, Some("Kept Name".to_string()));
        assert_eq!(result[0].artist, Some("Provider Artist".to_string()));
        assert_eq!(result[0].audio_features, Some(features([0.5; FEATURE_DIMS])));
    }

    #[tokio::test]
    async fn test_enrichment_failure_is_non_fatal() {
        let user_id = Uuid::new_v4();

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        let sparse = TrackMeta::new("sparse");

        let mut storage = MockStorageProvider::new();
        storage
            .expect_recent_feedback()
            .returning(|_, _| Ok(Vec::new()));
        let sparse_clone = sparse.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(vec![sparse_clone.clone()]));

        let pipeline = pipeline(auth, storage, no_enrichment());
        let result = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        // Candidate passes through untouched in the fallback list
        assert_eq!(result, vec![sparse]);
    }

    #[tokio::test]
    async fn test_enrichment_preserves_pool_order() {
        let user_id = Uuid::new_v4();

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        let pool: Vec<TrackMeta> = (0..8).map(|i| TrackMeta::new(format!("t{}", i))).collect();

        let mut storage = MockStorageProvider::new();
        storage
            .expect_recent_feedback()
            .returning(|_, _| Ok(Vec::new()));
        let pool_clone = pool.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(pool_clone.clone()));

        let mut metadata = MockMetadataProvider::new();
        metadata.expect_fetch_meta().returning(|id| {
            let mut partial = TrackMeta::new(id);
            partial.name = Some(format!("enriched-{}", id));
            partial.artist = Some("a".to_string());
            partial.album_art = Some("b".to_string());
            Enrichment::Enriched(partial)
        });
        metadata
            .expect_fetch_audio_features()
            .returning(|_| Enrichment::Unavailable);

        let pipeline = pipeline(auth, storage, metadata);
        let result = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        let ids: Vec<&str> = result.iter().map(|t| t.spotify_id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7"]);
        assert_eq!(result[3].name, Some("enriched-t3".to_string()));
    }

    #[tokio::test]
    async fn test_repeated_calls_return_same_ordering() {
        let user_id = Uuid::new_v4();
        let shape = [0.3, 0.9, 0.2, 110.0, 0.1, 0.4, 0.6, 0.5];

        let mut auth = MockAuthProvider::new();
        auth.expect_current_user()
            .returning(move |_| Ok(Some(user_id)));

        let records = vec![feedback(user_id, track("liked", shape), true)];
        let pool = vec![
            track("c1", [0.2, 0.8, 0.3, 100.0, 0.2, 0.5, 0.5, 0.4]),
            track("c2", [0.9, 0.1, 0.7, 70.0, 0.8, 0.1, 0.2, 0.9]),
            track("c3", shape),
        ];

        let mut storage = MockStorageProvider::new();
        let records_clone = records.clone();
        storage
            .expect_recent_feedback()
            .returning(move |_, _| Ok(records_clone.clone()));
        let pool_clone = pool.clone();
        storage
            .expect_candidate_pool()
            .returning(move |_| Ok(pool_clone.clone()));

        let pipeline = pipeline(auth, storage, no_enrichment());
        let first = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();
        let second = pipeline
            .get_recommendations(Some("token"), 20)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].spotify_id, "c3");
    }
}
