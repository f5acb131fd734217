use serde::{Deserialize, Serialize};

/// A recommended post as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostGet {
    pub id: i64,
    pub text: String,
    pub topic: String,
}

/// Response body of `GET /post/recommendations/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub exp_group: String,
    pub model_used: String,
    pub recommended_posts: Vec<PostGet>,
}
