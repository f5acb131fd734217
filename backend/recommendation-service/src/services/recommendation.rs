//! Recommendation pipeline
//!
//! bucketing -> model loading -> feature loading -> assembly

use crate::error::Result;
use crate::metrics;
use crate::models::RecommendationResponse;
use crate::services::assembler::{assemble, RecommendationRequest};
use crate::services::experiment::Bucketer;
use crate::services::features::FeatureSource;
use crate::services::model::ModelLoader;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub struct RecommendationService {
    bucketer: Bucketer,
    models: Arc<dyn ModelLoader>,
    features: Arc<dyn FeatureSource>,
}

impl RecommendationService {
    pub fn new(
        bucketer: Bucketer,
        models: Arc<dyn ModelLoader>,
        features: Arc<dyn FeatureSource>,
    ) -> Self {
        Self {
            bucketer,
            models,
            features,
        }
    }

    pub async fn recommend(&self, request: RecommendationRequest) -> Result<RecommendationResponse> {
        let group = self.bucketer.assign(&request.user_id);
        info!("User {} belongs to group {}", request.user_id, group);

        let result = self.run(group.as_str(), request).await;
        match &result {
            Ok(_) => metrics::record_recommendation(group.as_str(), "success"),
            Err(e) => {
                error!(user_id = request.user_id, exp_group = %group, "Recommendation failed: {}", e);
                metrics::record_recommendation(group.as_str(), "error");
            }
        }

        result.map(|(model_used, recommended_posts)| RecommendationResponse {
            exp_group: group.to_string(),
            model_used,
            recommended_posts,
        })
    }

    async fn run(
        &self,
        group: &str,
        request: RecommendationRequest,
    ) -> Result<(String, Vec<crate::models::PostGet>)> {
        let total = Instant::now();

        let models = Arc::clone(&self.models);
        let label = group.to_string();
        let started = Instant::now();
        let model = tokio::task::spawn_blocking(move || models.load(&label)).await??;
        metrics::observe_stage("load_model", started.elapsed());

        let snapshot = self.features.load_features().await?;

        let classifier = Arc::clone(&model.classifier);
        let started = Instant::now();
        let posts =
            tokio::task::spawn_blocking(move || assemble(&request, snapshot, classifier.as_ref()))
                .await??;
        metrics::observe_stage("score", started.elapsed());
        metrics::observe_stage("total", total.elapsed());

        Ok((model.group.to_string(), posts))
    }
}
