/// Recommendation API Handlers
///
/// GET /post/recommendations/?id=<user>&time=<timestamp>&limit=<n>
use actix_web::{get, web, HttpResponse};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::services::{RecommendationRequest, RecommendationService};

/// Query parameters for GET /post/recommendations/
#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    /// User ID to recommend for
    pub id: i64,

    /// Reference time; only its hour and month feed the model
    pub time: String,

    /// Number of posts to return (default: 10)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// Handler state for recommendation service
pub struct RecommendationHandlerState {
    pub service: Arc<RecommendationService>,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse the `time` query parameter.
///
/// Accepts RFC 3339 (offset dropped, local wall clock kept), ISO-8601
/// without offset, or a bare date meaning midnight.
pub fn parse_reference_time(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AppError::BadRequest(format!("Invalid time: {}", raw)))
}

/// GET /post/recommendations/
#[get("/post/recommendations/")]
pub async fn get_recommendations(
    query: web::Query<RecommendationQuery>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let time = parse_reference_time(&query.time)?;

    debug!(
        "Getting recommendations for user: {}, time: {}, limit: {}",
        query.id, time, query.limit
    );

    let response = state
        .service
        .recommend(RecommendationRequest {
            user_id: query.id,
            time,
            limit: query.limit,
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_iso_without_offset() {
        let t = parse_reference_time("2021-12-20T14:03:51").unwrap();
        assert_eq!(t.hour(), 14);
        assert_eq!(t.to_string(), "2021-12-20 14:03:51");
    }

    #[test]
    fn test_parse_fractional_seconds_and_space_separator() {
        let t = parse_reference_time("2021-12-20 14:03:51.250").unwrap();
        assert_eq!(t.hour(), 14);
        assert_eq!(t.minute(), 3);
    }

    #[test]
    fn test_parse_rfc3339_keeps_local_wall_clock() {
        let t = parse_reference_time("2021-12-20T14:03:51+03:00").unwrap();
        assert_eq!(t.hour(), 14);
    }

    #[test]
    fn test_parse_minute_precision() {
        let t = parse_reference_time("2021-06-01T08:15").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (8, 15, 0));
    }

    #[test]
    fn test_parse_bare_date_is_midnight() {
        let t = parse_reference_time("2021-12-20").unwrap();
        assert_eq!(t.hour(), 0);
        assert_eq!(t.to_string(), "2021-12-20 00:00:00");
    }

    #[test]
    fn test_parse_garbage_is_bad_request() {
        for raw in ["", "yesterday", "2021-13-40T25:00:00", "1639999999"] {
            let err = parse_reference_time(raw).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{raw}");
        }
    }

    #[test]
    fn test_query_default_limit() {
        let q = parse_query("id=200&time=2021-12-20T14:03:51");
        assert_eq!(q.limit, 10);
        assert_eq!(q.id, 200);
    }

    fn parse_query(raw: &str) -> RecommendationQuery {
        web::Query::<RecommendationQuery>::from_query(raw)
            .unwrap()
            .into_inner()
    }
}
