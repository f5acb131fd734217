//! Recommendation services
//!
//! Experiment bucketing, model loading, feature tables and the assembler
//! that turns them into a ranked post list.

pub mod assembler;
pub mod experiment;
pub mod features;
pub mod model;
pub mod recommendation;

pub use assembler::{assemble, top_n, RecommendationRequest, ScoredPost};
pub use experiment::{Bucketer, ExperimentGroup};
pub use features::{FeatureSnapshot, FeatureSource, FeatureTable, FeatureValue, LikedPost};
pub use model::{Classifier, FsModelLoader, LoadedModel, ModelLoader, OnnxClassifier};
pub use recommendation::RecommendationService;
