/// Recommendation Service Library
///
/// Serves personalized post recommendations. Each user is deterministically
/// bucketed into a control or test group, the group's model scores every
/// post the user has not liked, and the top-scored posts are returned.
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{PostGet, RecommendationResponse};
pub use services::RecommendationService;
