// ============================================
// Classifier loading and inference
// ============================================
//
// Each experiment group has its own artifact directory under the model
// base path:
//
//   {base}/model_control/model.onnx
//   {base}/model_control/features.json
//   {base}/model_test/...
//
// `features.json` lists the model inputs in order. Categorical inputs
// carry the vocabulary used at export time.

use crate::error::{AppError, Result};
use crate::services::experiment::ExperimentGroup;
use crate::services::features::{FeatureTable, FeatureValue, MISSING};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_onnx::prelude::*;
use tracing::{debug, info};

pub const MODEL_FILE: &str = "model.onnx";
pub const MANIFEST_FILE: &str = "features.json";

/// Encoding of categorical values absent from the vocabulary
const UNKNOWN_CATEGORY: f32 = -1.0;

/// Type alias for the optimized tract model
type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Positive-class probability for every row of a feature frame
pub trait Classifier: Send + Sync {
    fn predict_proba(&self, frame: &FeatureTable) -> Result<Vec<f32>>;
}

/// Loads the classifier bound to an experiment group
pub trait ModelLoader: Send + Sync {
    /// `group` must be `"control"` or `"test"`
    fn load(&self, group: &str) -> Result<LoadedModel>;
}

pub struct LoadedModel {
    pub group: ExperimentGroup,
    pub classifier: Arc<dyn Classifier>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    #[default]
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FeatureKind,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Input layout expected by an exported model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub features: Vec<FeatureSpec>,
}

impl ModelManifest {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ModelLoad(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let manifest: ModelManifest = serde_json::from_str(&raw).map_err(|e| {
            AppError::ModelLoad(format!("Invalid manifest {}: {}", path.display(), e))
        })?;

        if manifest.features.is_empty() {
            return Err(AppError::ModelLoad(format!(
                "Manifest {} declares no features",
                path.display()
            )));
        }

        Ok(manifest)
    }

    /// Encode a frame into a row-major `f32` matrix in manifest order
    ///
    /// Columns missing from the frame encode like missing cells.
    pub fn encode(&self, frame: &FeatureTable) -> Vec<Vec<f32>> {
        let positions: HashMap<&str, usize> = frame
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let lookups: Vec<(&FeatureSpec, Option<usize>)> = self
            .features
            .iter()
            .map(|spec| (spec, positions.get(spec.name.as_str()).copied()))
            .collect();

        frame
            .rows
            .iter()
            .map(|row| {
                lookups
                    .iter()
                    .map(|(spec, idx)| {
                        let cell = idx.and_then(|i| row.get(i));
                        encode_cell(spec, cell)
                    })
                    .collect()
            })
            .collect()
    }
}

fn encode_cell(spec: &FeatureSpec, cell: Option<&FeatureValue>) -> f32 {
    match spec.kind {
        FeatureKind::Numeric => cell.and_then(FeatureValue::as_f32).unwrap_or(f32::NAN),
        FeatureKind::Categorical => {
            let label = match cell {
                Some(value) => value.to_string(),
                None => MISSING.to_string(),
            };
            spec.categories
                .iter()
                .position(|c| *c == label)
                .map(|i| i as f32)
                .unwrap_or(UNKNOWN_CATEGORY)
        }
    }
}

/// Gradient-boosting classifier exported to ONNX, run with tract
pub struct OnnxClassifier {
    model: TractModel,
    manifest: ModelManifest,
    model_path: PathBuf,
}

impl OnnxClassifier {
    /// Load `model.onnx` and `features.json` from an artifact directory
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = ModelManifest::from_path(&dir.join(MANIFEST_FILE))?;

        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(AppError::ModelLoad(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let model = Self::load_tract_model(&model_path, manifest.features.len()).map_err(|e| {
            AppError::ModelLoad(format!(
                "Failed to load ONNX model {}: {}",
                model_path.display(),
                e
            ))
        })?;

        info!(
            "ONNX model loaded from {} ({} features)",
            model_path.display(),
            manifest.features.len()
        );

        Ok(Self {
            model,
            manifest,
            model_path,
        })
    }

    fn load_tract_model(model_path: &Path, input_dim: usize) -> anyhow::Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_path(model_path)?
            .with_input_fact(0, f32::fact([1, input_dim]).into())?
            .into_optimized()?
            .into_runnable()?;

        Ok(model)
    }

    fn score_row(&self, values: &[f32]) -> Result<f32> {
        let input = Tensor::from_shape(&[1, values.len()], values)
            .map_err(|e| AppError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| AppError::Inference(format!("Tract inference failed: {}", e)))?;

        // Boosting exports emit (label, probabilities); the first f32 output
        // holds the class probabilities.
        for output in outputs.iter() {
            if let Ok(view) = output.to_array_view::<f32>() {
                let probs: Vec<f32> = view.iter().copied().collect();
                return positive_class(&probs);
            }
        }

        Err(AppError::Inference(
            "Model produced no f32 probability output".to_string(),
        ))
    }
}

/// Positive-class probability clamped to `[0, 1]`; NaN is rejected
fn positive_class(probs: &[f32]) -> Result<f32> {
    let p = match probs {
        [p] => *p,
        [_, p] => *p,
        other => {
            return Err(AppError::Inference(format!(
                "Expected 1 or 2 probabilities per row, got {}",
                other.len()
            )))
        }
    };

    if p.is_nan() {
        return Err(AppError::Inference(
            "Model produced a NaN probability".to_string(),
        ));
    }

    Ok(p.clamp(0.0, 1.0))
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, frame: &FeatureTable) -> Result<Vec<f32>> {
        let encoded = self.manifest.encode(frame);
        let scores = encoded
            .iter()
            .map(|row| self.score_row(row))
            .collect::<Result<Vec<f32>>>()?;

        debug!("Scored {} rows with {}", scores.len(), self.model_path.display());
        Ok(scores)
    }
}

/// Reads group artifacts from `{base_path}/model_{group}`
#[derive(Debug, Clone)]
pub struct FsModelLoader {
    base_path: PathBuf,
}

impl FsModelLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn model_dir(&self, group: ExperimentGroup) -> PathBuf {
        self.base_path.join(group.model_dir_name())
    }
}

impl ModelLoader for FsModelLoader {
    fn load(&self, group: &str) -> Result<LoadedModel> {
        let group: ExperimentGroup = group.parse()?;
        let dir = self.model_dir(group);

        let classifier = OnnxClassifier::load(&dir)?;

        Ok(LoadedModel {
            group,
            classifier: Arc::new(classifier),
        })
    }
}
