//! Feature Repository
//!
//! Bulk-loads the liked-post pairs and the user/post feature tables from
//! PostgreSQL. Each query is streamed and grouped into pages so a single
//! fetch never buffers more than `page_size` decoded rows at a time.

use crate::error::{AppError, Result};
use crate::metrics;
use crate::services::features::{
    FeatureSnapshot, FeatureSource, FeatureTable, FeatureValue, LikedPost,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgConnection, PgPool, Row, TypeInfo, ValueRef};
use std::time::Instant;
use tracing::{info, warn};

const LIKED_POSTS_QUERY: &str = r#"
    SELECT DISTINCT post_id::BIGINT AS post_id, user_id::BIGINT AS user_id
    FROM public.feed_data
    WHERE action = 'like'
"#;

const USER_FEATURES_QUERY: &str = "SELECT * FROM public.user_data";

const POST_FEATURES_QUERY: &str = "SELECT * FROM public.posts_info_features";

pub struct PgFeatureRepo {
    pool: PgPool,
    page_size: usize,
    service_name: String,
}

impl PgFeatureRepo {
    pub fn new(pool: PgPool, page_size: usize, service_name: impl Into<String>) -> Self {
        Self {
            pool,
            page_size: page_size.max(1),
            service_name: service_name.into(),
        }
    }

    async fn load_liked_posts(&self, conn: &mut PgConnection) -> Result<Vec<LikedPost>> {
        let mut liked = Vec::new();
        let mut pages = sqlx::query_as::<_, LikedPost>(LIKED_POSTS_QUERY)
            .fetch(&mut *conn)
            .try_chunks(self.page_size);

        while let Some(page) = pages.try_next().await.map_err(|e| AppError::from(e.1))? {
            info!("Got chunk: {}", page.len());
            liked.extend(page);
        }

        Ok(liked)
    }

    async fn load_table(&self, conn: &mut PgConnection, query: &str) -> Result<FeatureTable> {
        let mut table = FeatureTable::default();
        let mut pages = sqlx::query(query)
            .fetch(&mut *conn)
            .try_chunks(self.page_size);

        while let Some(page) = pages.try_next().await.map_err(|e| AppError::from(e.1))? {
            info!("Got chunk: {}", page.len());
            table.extend(decode_page(&page)?);
        }

        Ok(table)
    }
}

#[async_trait]
impl FeatureSource for PgFeatureRepo {
    async fn load_features(&self) -> Result<FeatureSnapshot> {
        let start = Instant::now();

        // Held for the whole load; returned to the pool on drop.
        let mut conn = db_pool::acquire_with_metrics(&self.pool, &self.service_name).await?;

        info!("Loading liked posts");
        let liked_posts = self.load_liked_posts(&mut conn).await?;

        info!("Loading user features");
        let user_features = self.load_table(&mut conn, USER_FEATURES_QUERY).await?;

        info!("Loading posts features");
        let post_features = self.load_table(&mut conn, POST_FEATURES_QUERY).await?;

        if post_features.is_empty() {
            warn!("posts_info_features returned no rows");
        }

        metrics::observe_stage("load_features", start.elapsed());
        info!(
            liked_posts = liked_posts.len(),
            users = user_features.len(),
            posts = post_features.len(),
            "Feature snapshot loaded"
        );

        Ok(FeatureSnapshot {
            liked_posts,
            user_features,
            post_features,
        })
    }
}

fn decode_page(rows: &[PgRow]) -> Result<FeatureTable> {
    let Some(first) = rows.first() else {
        return Ok(FeatureTable::default());
    };

    let mut table = FeatureTable::new(
        first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    );

    for row in rows {
        let cells = (0..row.len())
            .map(|idx| decode_cell(row, idx))
            .collect::<Result<Vec<_>>>()?;
        table.rows.push(cells);
    }

    Ok(table)
}

fn decode_cell(row: &PgRow, idx: usize) -> Result<FeatureValue> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(FeatureValue::Missing);
    }

    let column = &row.columns()[idx];
    let value = match column.type_info().name() {
        "INT2" => FeatureValue::Int(row.try_get::<i16, _>(idx)? as i64),
        "INT4" => FeatureValue::Int(row.try_get::<i32, _>(idx)? as i64),
        "INT8" => FeatureValue::Int(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => FeatureValue::Float(row.try_get::<f32, _>(idx)? as f64),
        "FLOAT8" => FeatureValue::Float(row.try_get::<f64, _>(idx)?),
        "BOOL" => FeatureValue::Bool(row.try_get::<bool, _>(idx)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => FeatureValue::Text(row.try_get::<String, _>(idx)?),
        other => {
            return Err(AppError::Database(format!(
                "Unsupported type {} for column {}",
                other,
                column.name()
            )))
        }
    };

    Ok(value)
}
