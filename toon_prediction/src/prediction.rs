use crate::error::PredictError;
use serde::Serialize;

/// One classification outcome. `probabilities` is indexed identically to the
/// model's label vocabulary; `class_index` points at its maximum entry, ties
/// broken by the lowest index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub class_index: usize,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    pub fn confidence(&self) -> f32 {
        self.probabilities[self.class_index]
    }
}

pub(crate) fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|score| (score - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|exp| exp / total).collect()
}

pub(crate) fn decode_probabilities(
    probabilities: Vec<f32>,
    labels: &[String],
) -> Result<Prediction, PredictError> {
    let (class_index, _) = probabilities
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        .ok_or_else(|| {
            PredictError::InferenceFailure("empty probability distribution".to_string())
        })?;

    Ok(Prediction {
        label: labels[class_index].clone(),
        class_index,
        probabilities,
    })
}
