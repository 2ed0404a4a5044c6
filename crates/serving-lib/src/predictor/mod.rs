//! Predictor abstraction
//!
//! A loaded model is one of three capability variants, resolved once at
//! load time:
//! - `ClassifierWithProba`: labels plus a per-class probability row
//! - `ClassifierOnly`: labels only
//! - `Regressor`: a numeric prediction

mod native;
mod onnx;

pub use native::{LinearRegression, LogisticRegression, NativeModelSpec, NearestCentroid};
pub use onnx::{OnnxMetadata, OnnxModel, OnnxTask};

use crate::models::{FeatureValue, Label};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared interface of every loaded model
pub trait Model: Send + Sync {
    /// Short name of the model family, e.g. `logistic_regression`
    fn kind(&self) -> &str;

    /// Ordered feature names the model expects, when known
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// Whether text feature values can be passed to the model
    fn accepts_text(&self) -> bool {
        false
    }

    /// Predict a single label for one row
    fn predict(&self, row: &[FeatureValue]) -> Result<Label>;
}

/// Classifier that can also report class probabilities
pub trait ProbabilisticModel: Model {
    /// Class labels, in the column order of `predict_proba`
    fn classes(&self) -> &[Label];

    /// Probability of each class for one row
    fn predict_proba(&self, row: &[FeatureValue]) -> Result<Vec<f64>>;
}

/// A loaded model tagged with its capabilities
#[derive(Clone)]
pub enum Predictor {
    ClassifierWithProba(Arc<dyn ProbabilisticModel>),
    ClassifierOnly(Arc<dyn Model>),
    Regressor(Arc<dyn Model>),
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("capability", &self.capability())
            .field("kind", &self.kind())
            .finish()
    }
}

impl Predictor {
    pub fn classifier_with_proba(model: impl ProbabilisticModel + 'static) -> Self {
        Predictor::ClassifierWithProba(Arc::new(model))
    }

    pub fn classifier_only(model: impl Model + 'static) -> Self {
        Predictor::ClassifierOnly(Arc::new(model))
    }

    pub fn regressor(model: impl Model + 'static) -> Self {
        Predictor::Regressor(Arc::new(model))
    }

    /// Name of the capability variant
    pub fn capability(&self) -> &'static str {
        match self {
            Predictor::ClassifierWithProba(_) => "classifier_with_proba",
            Predictor::ClassifierOnly(_) => "classifier_only",
            Predictor::Regressor(_) => "regressor",
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Predictor::ClassifierWithProba(m) => m.kind(),
            Predictor::ClassifierOnly(m) | Predictor::Regressor(m) => m.kind(),
        }
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        match self {
            Predictor::ClassifierWithProba(m) => m.feature_names(),
            Predictor::ClassifierOnly(m) | Predictor::Regressor(m) => m.feature_names(),
        }
    }

    pub fn accepts_text(&self) -> bool {
        match self {
            Predictor::ClassifierWithProba(m) => m.accepts_text(),
            Predictor::ClassifierOnly(m) | Predictor::Regressor(m) => m.accepts_text(),
        }
    }

    pub fn predict(&self, row: &[FeatureValue]) -> Result<Label> {
        match self {
            Predictor::ClassifierWithProba(m) => m.predict(row),
            Predictor::ClassifierOnly(m) | Predictor::Regressor(m) => m.predict(row),
        }
    }

    /// Probability summary for one row; `None` when the model has no
    /// probability capability
    pub fn probabilities(&self, row: &[FeatureValue]) -> Option<Result<Option<ProbabilityOutput>>> {
        match self {
            Predictor::ClassifierWithProba(m) => Some(
                m.predict_proba(row)
                    .and_then(|proba| ProbabilityOutput::summarize(m.classes().len(), &proba)),
            ),
            Predictor::ClassifierOnly(_) | Predictor::Regressor(_) => None,
        }
    }
}

/// Probability output attached to a prediction response
#[derive(Debug, Clone, PartialEq)]
pub enum ProbabilityOutput {
    /// Probability of the positive (second) class
    Binary(f64),
    /// Class index (as string) to probability, covering all classes
    Multiclass(BTreeMap<String, f64>),
}

impl ProbabilityOutput {
    /// Derive the response form from a probability row.
    ///
    /// Exactly two classes give the scalar form, more than two the per-class
    /// map. A single-class model yields nothing.
    pub fn summarize(class_count: usize, proba: &[f64]) -> Result<Option<Self>> {
        match class_count {
            0 | 1 => Ok(None),
            2 => {
                let positive = proba.get(1).copied().ok_or_else(|| {
                    anyhow::anyhow!("expected 2 probabilities, got {}", proba.len())
                })?;
                Ok(Some(ProbabilityOutput::Binary(positive)))
            }
            n => {
                if proba.len() != n {
                    anyhow::bail!("expected {} probabilities, got {}", n, proba.len());
                }
                let map = proba
                    .iter()
                    .enumerate()
                    .map(|(idx, p)| (idx.to_string(), *p))
                    .collect();
                Ok(Some(ProbabilityOutput::Multiclass(map)))
            }
        }
    }
}

/// Convert a row to numbers, naming any text values
pub(crate) fn numeric_row(row: &[FeatureValue]) -> Result<Vec<f64>> {
    row.iter()
        .enumerate()
        .map(|(idx, v)| {
            v.as_f64()
                .ok_or_else(|| anyhow::anyhow!("feature at position {} is not numeric", idx))
        })
        .collect()
}

/// Index of the largest value; ties resolve to the first
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (idx, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((idx, v)),
        })
        .map(|(idx, _)| idx)
}
