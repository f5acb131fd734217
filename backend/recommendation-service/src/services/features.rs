//! In-memory feature tables
//!
//! Rows loaded from `user_data` and `posts_info_features` carry whatever
//! columns the store exposes, so cells are dynamically typed.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Rendering of the missing-value sentinel
pub const MISSING: &str = "NA";

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Missing,
}

impl FeatureValue {
    pub fn is_missing(&self) -> bool {
        match self {
            FeatureValue::Missing => true,
            FeatureValue::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FeatureValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FeatureValue::Int(v) => Some(*v as f32),
            FeatureValue::Float(v) if !v.is_nan() => Some(*v as f32),
            FeatureValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            FeatureValue::Text(s) => s.trim().parse::<f32>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) if v.is_nan() => f.write_str(MISSING),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Bool(v) => write!(f, "{}", v),
            FeatureValue::Text(s) => f.write_str(s),
            FeatureValue::Missing => f.write_str(MISSING),
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl<T: Into<FeatureValue>> From<Option<T>> for FeatureValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FeatureValue::Missing)
    }
}

/// Column-named table of feature cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FeatureValue>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace every missing cell (NULL or NaN) with the uniform sentinel
    pub fn fill_missing(&mut self) {
        for cell in self.rows.iter_mut().flatten() {
            if cell.is_missing() {
                *cell = FeatureValue::Missing;
            }
        }
    }

    /// Append rows from a page that shares this table's columns
    pub fn extend(&mut self, page: FeatureTable) {
        if self.columns.is_empty() {
            self.columns = page.columns;
        }
        self.rows.extend(page.rows);
    }
}

/// A historical like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct LikedPost {
    pub post_id: i64,
    pub user_id: i64,
}

/// Everything the assembler needs, loaded fresh per request
#[derive(Debug, Clone, Default)]
pub struct FeatureSnapshot {
    pub liked_posts: Vec<LikedPost>,
    pub user_features: FeatureTable,
    pub post_features: FeatureTable,
}

/// Source of the three feature tables
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn load_features(&self) -> Result<FeatureSnapshot>;
}
