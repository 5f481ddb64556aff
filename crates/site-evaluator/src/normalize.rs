//! Global min-max normalization and weighting
//!
//! Two phases over the whole candidate set:
//!
//! 1. [`compute_ranges`] reads every candidate's raw scores and builds the
//!    global ranges.
//! 2. [`apply_weights`] rewrites every candidate's normalized and weighted
//!    fields from those ranges.
//!
//! | Input                 | Formula                       | `min == max`            |
//! |-----------------------|-------------------------------|-------------------------|
//! | static infrastructure | `(raw − min) / (max − min)`   | 1 if raw > 0, else 0    |
//! | mobile infrastructure | `(max − raw) / (max − min)`   | 1 for any duration      |
//! | census                | `(raw − min) / (max − min)`   | 1 if raw > 0, else 0    |
//!
//! Results are clamped to [0, 1]. An unavailable mobile score is always 0.

use crate::candidate::{Candidate, RawScore};
use crate::weights::Weights;
use crate::EvaluationModel;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How infrastructure ranges are shared between layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeScope {
    /// One range per infrastructure layer
    #[default]
    PerLayer,
    /// A single range over all infrastructure layers
    Pooled,
}

/// Observed `[min, max]` of a set of values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(ValueRange { min: v, max: v }),
            Some(r) => Some(r.include(v)),
        })
    }

    pub fn include(self, value: f64) -> Self {
        ValueRange {
            min: self.min.min(value),
            max: self.max.max(value),
        }
    }

    pub fn merge(self, other: ValueRange) -> Self {
        self.include(other.min).include(other.max)
    }

    pub fn is_degenerate(&self) -> bool {
        self.max == self.min
    }
}

/// Larger is better
pub fn min_max(raw: f64, range: ValueRange) -> f64 {
    if range.is_degenerate() {
        return if raw > 0.000000000 { 1.000000000 } else { 0.000000000 };
    }
    ((raw - range.min) / (range.max - range.min)).clamp(0.000000000, 1.000000000)
}

/// Smaller is better; unavailable scores normalize to 0
pub fn inverted_min_max(raw: RawScore, range: Option<ValueRange>) -> f64 {
    let (RawScore::Value(duration), Some(range)) = (raw, range) else {
        return 0.000000000;
    };
    if range.is_degenerate() {
        return 1.000000000;
    }
    ((range.max - duration) / (range.max - range.min)).clamp(0.000000000, 1.000000000)
}

/// Ranges observed across the candidate set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalRanges {
    /// Per infrastructure layer; identical entries when pooled
    pub infrastructure: Vec<Option<ValueRange>>,
    /// Per census variable; a missing raw value counts as 0
    pub census: Vec<Option<ValueRange>>,
}

/// Phase one: collect ranges from every candidate
pub fn compute_ranges(
    candidates: &[Candidate],
    layers: usize,
    variables: usize,
    scope: RangeScope,
) -> GlobalRanges {
    let mut infrastructure: Vec<Option<ValueRange>> = (0..layers)
        .map(|slot| {
            ValueRange::from_values(
                candidates
                    .iter()
                    .filter_map(|c| c.infrastructure().get(slot))
                    .filter_map(|e| e.raw_score.value())
                    .filter(|v| v.is_finite()),
            )
        })
        .collect();

    if scope == RangeScope::Pooled {
        let pooled = infrastructure
            .iter()
            .flatten()
            .copied()
            .reduce(ValueRange::merge);
        infrastructure = vec![pooled; layers];
    }

    let census = (0..variables)
        .map(|slot| {
            ValueRange::from_values(
                candidates
                    .iter()
                    .filter_map(|c| c.census().get(slot))
                    .map(|e| e.raw_value.unwrap_or(0.000000000)),
            )
        })
        .collect();

    GlobalRanges {
        infrastructure,
        census,
    }
}

/// Phase two: write normalized and weighted scores on every candidate
pub fn apply_weights(
    candidates: &mut [Candidate],
    model: EvaluationModel,
    weights: &Weights,
    ranges: &GlobalRanges,
) {
    for candidate in candidates.iter_mut() {
        for (slot, weight) in weights.infrastructure.iter().enumerate() {
            let range = ranges.infrastructure.get(slot).copied().flatten();
            let Some(entry) = candidate.infrastructure_mut(slot) else {
                continue;
            };
            let normalized = match model {
                EvaluationModel::Static => match (entry.raw_score, range) {
                    (RawScore::Value(raw), Some(range)) if raw.is_finite() => min_max(raw, range),
                    _ => 0.000000000,
                },
                EvaluationModel::Mobile => inverted_min_max(entry.raw_score, range),
            };
            entry.normalized_score = normalized;
            entry.weighted_score = normalized * weight;
        }

        for (slot, weight) in weights.census.iter().enumerate() {
            let range = ranges.census.get(slot).copied().flatten();
            let Some(entry) = candidate.census_mut(slot) else {
                continue;
            };
            match (entry.raw_value, range) {
                (Some(raw), Some(range)) => {
                    entry.set_weighted_score(min_max(raw, range) * weight);
                }
                _ => entry.clear_weighted_score(),
            }
        }
    }
}

/// Both phases; returns the ranges used
pub fn normalize_and_weight(
    candidates: &mut [Candidate],
    model: EvaluationModel,
    weights: &Weights,
    scope: RangeScope,
) -> GlobalRanges {
    let ranges = compute_ranges(
        candidates,
        weights.infrastructure.len(),
        weights.census.len(),
        scope,
    );
    debug!("Global ranges: {:?}", ranges);
    apply_weights(candidates, model, weights, &ranges);
    ranges
}
