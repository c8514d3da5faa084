use std::sync::Arc;

use crate::services::providers::{AuthProvider, FeedbackWriter};
use crate::services::RecommendationPipeline;

/// Shared application state
///
/// Everything here is an injected collaborator behind an `Arc`; handlers
/// never construct clients of their own.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RecommendationPipeline>,
    pub auth: Arc<dyn AuthProvider>,
    pub feedback: Arc<dyn FeedbackWriter>,
    pub default_limit: usize,
}

impl AppState {
    pub fn new(
        pipeline: Arc<RecommendationPipeline>,
        auth: Arc<dyn AuthProvider>,
        feedback: Arc<dyn FeedbackWriter>,
        default_limit: usize,
    ) -> Self {
        Self {
            pipeline,
            auth,
            feedback,
            default_limit,
        }
    }
}
