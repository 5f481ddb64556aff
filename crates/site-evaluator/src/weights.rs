//! Weight parsing and validation
//!
//! Infrastructure and census weights are supplied as comma-separated
//! strings. Together they must sum to 1.0 within
//! [`WEIGHT_SUM_TOLERANCE`]; a sum within tolerance is rescaled so the
//! returned weights sum to exactly 1.0.

use crate::{EvaluationError, Result, WeightKind};
use serde::Serialize;
use tracing::debug;

/// Allowed deviation of the combined weight sum from 1.0 (9 decimal precision)
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001000000;

/// Validated weights, in layer / variable order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weights {
    pub infrastructure: Vec<f64>,
    pub census: Vec<f64>,
}

impl Weights {
    pub fn total(&self) -> f64 {
        self.infrastructure.iter().chain(&self.census).sum()
    }
}

/// Parse a comma-separated list of numbers; blank input is an empty list
pub fn parse_list(input: &str) -> Result<Vec<f64>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    input
        .split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    EvaluationError::MalformedInput(format!("'{}' is not a number", token))
                })
        })
        .collect()
}

/// Parse, check and normalise both weight lists
pub fn validate_weights(
    infrastructure: &str,
    census: &str,
    infrastructure_count: usize,
    census_count: usize,
) -> Result<Weights> {
    let infra = parse_list(infrastructure)?;
    let census = parse_list(census)?;

    check_count(WeightKind::Infrastructure, &infra, infrastructure_count)?;
    check_count(WeightKind::Census, &census, census_count)?;

    let total: f64 = infra.iter().chain(&census).sum();
    if (total - 1.000000000).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EvaluationError::WeightSum { total });
    }

    let weights = if total == 1.000000000 {
        Weights {
            infrastructure: infra,
            census,
        }
    } else {
        debug!("Rescaling weights by 1/{:.6}", total);
        let scale = 1.000000000 / total;
        Weights {
            infrastructure: infra.iter().map(|w| w * scale).collect(),
            census: census.iter().map(|w| w * scale).collect(),
        }
    };

    Ok(weights)
}

fn check_count(kind: WeightKind, weights: &[f64], expected: usize) -> Result<()> {
    if weights.len() != expected {
        return Err(EvaluationError::CountMismatch {
            kind,
            expected,
            actual: weights.len(),
        });
    }
    Ok(())
}

/// Parse the signed critical-zone score list, one per zone layer
pub fn parse_zone_scores(input: &str, zone_layers: usize) -> Result<Vec<f64>> {
    let scores = parse_list(input)?;
    if scores.len() != zone_layers {
        return Err(EvaluationError::MissingRequiredLayer(format!(
            "{} critical zone scores for {} critical zone layers",
            scores.len(),
            zone_layers
        )));
    }
    Ok(scores)
}
