pub mod recommendation;

pub use recommendation::{
    get_recommendations, parse_reference_time, RecommendationHandlerState, RecommendationQuery,
};
