//! Feedback-driven recommendation scoring.
//!
//! Pure functions only: vectors in, ordering out. All similarity math depends
//! on the canonical feature order defined by `AudioFeatures::components`, so
//! every vector produced here is comparable with every other.

use crate::models::{AudioFeatures, FeatureVector, TrackMeta, FEATURE_DIMS};

/// Converts an audio-feature record into a dense vector.
///
/// Returns `None` when the record is absent, when any of the eight feature
/// keys is missing, or when a stored value is not a finite number. Partial
/// vectors are never produced.
pub fn to_vector(features: Option<&AudioFeatures>) -> Option<FeatureVector> {
    let features = features?;
    let mut values = Vec::with_capacity(FEATURE_DIMS);
    for component in features.components() {
        match component {
            Some(value) if value.is_finite() => values.push(value),
            _ => return None,
        }
    }
    Some(FeatureVector(values))
}

/// Element-wise arithmetic mean of the given vectors.
///
/// Returns `None` on empty input: "no signal yet" is distinct from a zero
/// centroid. Dimensionality is taken from the first vector rather than
/// hard-coded, so the feature set can grow without touching this function.
pub fn average_centroid(vectors: &[FeatureVector]) -> Option<FeatureVector> {
    let first = vectors.first()?;
    let mut sums = vec![0.0; first.len()];
    for vector in vectors {
        for (sum, value) in sums.iter_mut().zip(vector.as_slice()) {
            *sum += value;
        }
    }
    let count = vectors.len() as f64;
    Some(FeatureVector(sums.into_iter().map(|s| s / count).collect()))
}

/// Cosine similarity between two vectors.
///
/// A zero norm turns the divisor into 1 instead of producing NaN; a zero
/// vector is then simply similar-to-nothing (score 0), which is the intended
/// degenerate-case policy.
pub fn cosine_similarity(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        dot
    } else {
        dot / denom
    }
}

/// Orders candidates by descending cosine similarity to the centroid and
/// returns the first `limit` of them. Ties keep their input order (stable
/// sort); the score itself is a sort key only and is not returned.
///
/// Precondition: every candidate carries a complete audio-feature record.
/// The caller filters; a candidate that fails to vectorize here is a contract
/// violation and panics rather than silently ranking on NaN.
pub fn rank_by_similarity(
    centroid: &FeatureVector,
    candidates: Vec<TrackMeta>,
    limit: usize,
) -> Vec<TrackMeta> {
    let mut scored: Vec<(f64, TrackMeta)> = candidates
        .into_iter()
        .map(|candidate| {
            let vector = to_vector(candidate.audio_features.as_ref())
                .expect("ranker requires candidates with complete audio features");
            (cosine_similarity(centroid, &vector), candidate)
        })
        .collect();

    // Vec::sort_by is stable, which is what guarantees the tie-break
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate)
        .collect()
}

/// Ordering used when no preference centroid exists yet: the first `limit`
/// candidates exactly as supplied. No shuffling, no weighting.
pub fn pick_fallback(candidates: Vec<TrackMeta>, limit: usize) -> Vec<TrackMeta> {
    candidates.into_iter().take(limit).collect()
}
