//! Recommendation assembly
//!
//! Turns one feature snapshot into the ranked post list for a single user:
//! key-join of user and post features, temporal context, scoring, liked-post
//! exclusion, top-N selection.

use crate::error::{AppError, Result};
use crate::models::PostGet;
use crate::services::features::{FeatureSnapshot, FeatureTable, FeatureValue};
use crate::services::model::Classifier;
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const USER_ID_COLUMN: &str = "user_id";
pub const POST_ID_COLUMN: &str = "post_id";
pub const HOUR_COLUMN: &str = "hour";
pub const MONTH_COLUMN: &str = "month";

/// Post columns that never reach the model
const NON_MODEL_POST_COLUMNS: [&str; 3] = ["index", "text", "topic"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationRequest {
    pub user_id: i64,
    pub time: NaiveDateTime,
    pub limit: usize,
}

/// `(hour, month)` of the reference time
pub fn temporal_features(time: &NaiveDateTime) -> (u32, u32) {
    (time.hour(), time.month())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPost {
    pub post_id: i64,
    pub score: f32,
}

/// Rank posts for one user and return the top `limit` with display metadata
pub fn assemble(
    request: &RecommendationRequest,
    mut snapshot: FeatureSnapshot,
    classifier: &dyn Classifier,
) -> Result<Vec<PostGet>> {
    snapshot.user_features.fill_missing();
    snapshot.post_features.fill_missing();

    let user_row = user_feature_row(&snapshot.user_features, request.user_id)?;
    let post_ids = post_ids(&snapshot.post_features)?;
    let metadata = display_metadata(&snapshot.post_features, &post_ids);

    let mut frame = join_features(&snapshot.post_features, &user_row, request);
    frame.fill_missing();

    let scores = classifier.predict_proba(&frame)?;
    if scores.len() != post_ids.len() {
        return Err(AppError::Inference(format!(
            "Classifier returned {} scores for {} posts",
            scores.len(),
            post_ids.len()
        )));
    }

    let liked: HashSet<i64> = snapshot
        .liked_posts
        .iter()
        .filter(|like| like.user_id == request.user_id)
        .map(|like| like.post_id)
        .collect();

    let candidates: Vec<ScoredPost> = post_ids
        .iter()
        .zip(scores)
        .filter(|(post_id, _)| !liked.contains(*post_id))
        .map(|(&post_id, score)| ScoredPost { post_id, score })
        .collect();

    let ranked = top_n(candidates, request.limit);

    debug!(
        user_id = request.user_id,
        scored = post_ids.len(),
        excluded = liked.len(),
        returned = ranked.len(),
        "Assembled recommendations"
    );

    Ok(ranked
        .into_iter()
        .filter_map(|scored| metadata.get(&scored.post_id).cloned())
        .collect())
}

/// Highest scores first; equal scores fall back to ascending `post_id`.
/// NaN scores rank below every number.
pub fn top_n(mut candidates: Vec<ScoredPost>, limit: usize) -> Vec<ScoredPost> {
    candidates.sort_by(|a, b| {
        rank_key(b.score)
            .total_cmp(&rank_key(a.score))
            .then(a.post_id.cmp(&b.post_id))
    });
    candidates.truncate(limit);
    candidates
}

fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        // folds -0.0 into 0.0 so zero scores tie
        score + 0.0
    }
}

/// The requesting user's columns, without `user_id`
fn user_feature_row(
    user_features: &FeatureTable,
    user_id: i64,
) -> Result<Vec<(String, FeatureValue)>> {
    let id_idx = user_features.column_index(USER_ID_COLUMN).ok_or_else(|| {
        AppError::Database(format!("user feature table has no {} column", USER_ID_COLUMN))
    })?;

    let row = user_features
        .rows
        .iter()
        .find(|row| row.get(id_idx).and_then(FeatureValue::as_i64) == Some(user_id))
        .ok_or_else(|| AppError::NotFound(format!("User {} has no feature row", user_id)))?;

    Ok(user_features
        .columns
        .iter()
        .zip(row.iter())
        .enumerate()
        .filter(|(i, _)| *i != id_idx)
        .map(|(_, (name, value))| (name.clone(), value.clone()))
        .collect())
}

fn post_ids(post_features: &FeatureTable) -> Result<Vec<i64>> {
    let id_idx = post_features.column_index(POST_ID_COLUMN).ok_or_else(|| {
        AppError::Database(format!("post feature table has no {} column", POST_ID_COLUMN))
    })?;

    post_features
        .rows
        .iter()
        .map(|row| {
            row.get(id_idx).and_then(FeatureValue::as_i64).ok_or_else(|| {
                AppError::Database(format!("post row without an integer {}", POST_ID_COLUMN))
            })
        })
        .collect()
}

/// `post_id -> (id, text, topic)`
fn display_metadata(post_features: &FeatureTable, post_ids: &[i64]) -> HashMap<i64, PostGet> {
    let text_idx = post_features.column_index("text");
    let topic_idx = post_features.column_index("topic");
    let cell = |row: &[FeatureValue], idx: Option<usize>| {
        idx.and_then(|i| row.get(i))
            .map(ToString::to_string)
            .unwrap_or_default()
    };

    post_ids
        .iter()
        .zip(post_features.rows.iter())
        .map(|(&id, row)| {
            (
                id,
                PostGet {
                    id,
                    text: cell(row.as_slice(), text_idx),
                    topic: cell(row.as_slice(), topic_idx),
                },
            )
        })
        .collect()
}

/// Post model features with the user's row broadcast onto every post,
/// followed by `hour` and `month`
fn join_features(
    post_features: &FeatureTable,
    user_row: &[(String, FeatureValue)],
    request: &RecommendationRequest,
) -> FeatureTable {
    let kept: Vec<usize> = post_features
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !NON_MODEL_POST_COLUMNS.contains(&name.as_str()))
        .map(|(i, _)| i)
        .collect();

    let mut columns: Vec<String> = kept
        .iter()
        .map(|&i| post_features.columns[i].clone())
        .collect();

    let user_cells: Vec<&(String, FeatureValue)> = user_row
        .iter()
        .filter(|(name, _)| {
            let collides = columns.contains(name)
                || name == HOUR_COLUMN
                || name == MONTH_COLUMN;
            if collides {
                debug!(column = %name, "Skipping user column shadowed by post/context column");
            }
            !collides
        })
        .collect();
    columns.extend(user_cells.iter().map(|(name, _)| name.clone()));

    let (hour, month) = temporal_features(&request.time);
    columns.push(HOUR_COLUMN.to_string());
    columns.push(MONTH_COLUMN.to_string());

    let rows = post_features
        .rows
        .iter()
        .map(|row| {
            let mut joined: Vec<FeatureValue> = kept
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or(FeatureValue::Missing))
                .collect();
            joined.extend(user_cells.iter().map(|(_, value)| value.clone()));
            joined.push(FeatureValue::Int(hour as i64));
            joined.push(FeatureValue::Int(month as i64));
            joined
        })
        .collect();

    FeatureTable { columns, rows }
}
