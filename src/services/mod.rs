pub mod pipeline;
pub mod providers;
pub mod recommend;

pub use pipeline::RecommendationPipeline;
