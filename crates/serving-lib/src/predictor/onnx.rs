//! ONNX model inference using tract
//!
//! Runs exported ONNX models through tract-onnx. The output of a
//! classification model is read as a per-class score row; a regression
//! model's first output value is the prediction.

use super::native::softmax;
use super::{argmax, numeric_row, Model, Predictor, ProbabilisticModel};
use crate::models::{FeatureValue, Label};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Task the ONNX graph was exported for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnnxTask {
    Classification,
    #[default]
    Regression,
}

/// Sidecar metadata stored next to an ONNX artifact as `<artifact>.meta.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnnxMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub task: OnnxTask,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<Label>>,
    /// Apply softmax to the raw output scores
    #[serde(default)]
    pub softmax: bool,
}

/// ONNX-backed model
pub struct OnnxModel {
    plan: TractModel,
    feature_names: Option<Vec<String>>,
    task: OnnxTask,
    classes: Vec<Label>,
    softmax: bool,
}

impl OnnxModel {
    /// Parse and optimize an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8], metadata: OnnxMetadata) -> Result<Self> {
        let classes = match (metadata.task, metadata.classes) {
            (OnnxTask::Classification, Some(classes)) if classes.len() >= 2 => classes,
            (OnnxTask::Classification, _) => {
                anyhow::bail!("classification metadata must list at least 2 classes")
            }
            (OnnxTask::Regression, _) => Vec::new(),
        };

        let mut model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?;
        if let Some(names) = &metadata.feature_names {
            model = model
                .with_input_fact(0, f32::fact([1, names.len()]).into())
                .context("Failed to set input shape")?;
        }
        let plan = model
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self {
            plan,
            feature_names: metadata.feature_names,
            task: metadata.task,
            classes,
            softmax: metadata.softmax,
        })
    }

    /// Wrap the model in its capability variant
    pub fn into_predictor(self) -> Predictor {
        match self.task {
            OnnxTask::Classification => Predictor::classifier_with_proba(self),
            OnnxTask::Regression => Predictor::regressor(self),
        }
    }

    /// Run the graph on a single row and return the flattened first output
    fn run(&self, row: &[FeatureValue]) -> Result<Vec<f32>> {
        let start = Instant::now();
        let data: Vec<f32> = numeric_row(row)?.into_iter().map(|v| v as f32).collect();
        let width = data.len();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, width), data)
            .context("Failed to build input tensor")?
            .into();

        let result = self.plan.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let values: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms", SLOW_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }
        Ok(values)
    }
}

impl Model for OnnxModel {
    fn kind(&self) -> &str {
        match self.task {
            OnnxTask::Classification => "onnx_classifier",
            OnnxTask::Regression => "onnx_regressor",
        }
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, row: &[FeatureValue]) -> Result<Label> {
        match self.task {
            OnnxTask::Regression => {
                let values = self.run(row)?;
                let value = values.first().context("Model produced an empty output")?;
                Ok(Label::Float(*value as f64))
            }
            OnnxTask::Classification => {
                let proba = self.predict_proba(row)?;
                let idx = argmax(&proba).context("Model produced an empty output")?;
                self.classes
                    .get(idx)
                    .cloned()
                    .with_context(|| format!("class index {} out of range", idx))
            }
        }
    }
}

impl ProbabilisticModel for OnnxModel {
    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, row: &[FeatureValue]) -> Result<Vec<f64>> {
        let scores: Vec<f64> = self.run(row)?.into_iter().map(f64::from).collect();
        if scores.len() != self.classes.len() {
            anyhow::bail!(
                "Model output has {} values, expected {}",
                scores.len(),
                self.classes.len()
            );
        }
        Ok(if self.softmax { softmax(&scores) } else { scores })
    }
}
