//! Census aggregation
//!
//! A candidate takes its raw demographic values from the first census unit
//! whose geometry intersects the candidate point.

use crate::candidate::Candidate;
use crate::features::{FieldValue, Layer};
use crate::geometry::GeometryService;
use crate::progress::ProgressSink;
use crate::CandidateError;
use tracing::debug;

/// Field names never treated as census variables (case-insensitive)
const IDENTIFIER_FIELDS: [&str; 2] = ["id", "fid"];

/// Numeric variables of a census layer, in field order.
///
/// Taken from the first feature: every numeric field except identifiers.
pub fn numeric_variables(layer: &Layer) -> Vec<String> {
    let Some(first) = layer.features.first() else {
        return Vec::new();
    };

    first
        .fields()
        .filter(|(name, _)| {
            !IDENTIFIER_FIELDS
                .iter()
                .any(|id| name.eq_ignore_ascii_case(id))
        })
        .filter(|(_, value)| matches!(value, FieldValue::Number(_)))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Attaches census values to candidates
pub struct CensusAggregator<'a> {
    pub geometry: &'a dyn GeometryService,
    pub layer: &'a Layer,
    pub variables: &'a [String],
}

impl CensusAggregator<'_> {
    /// Copy values from the first intersecting unit into the candidate.
    ///
    /// Returns whether an intersecting unit was found. Non-numeric values
    /// leave that variable without a raw value.
    pub fn attach(
        &self,
        candidate: &mut Candidate,
        sink: &dyn ProgressSink,
    ) -> std::result::Result<bool, CandidateError> {
        self.geometry.as_point(&candidate.geometry)?;

        let mut unit = None;
        for feature in self.layer.iter() {
            let Some(geom) = feature.geometry.as_ref() else {
                continue;
            };
            match self.geometry.intersects(geom, &candidate.geometry) {
                Ok(true) => {
                    unit = Some(feature);
                    break;
                }
                Ok(false) => {}
                Err(e) => sink.warn(&format!(
                    "{} feature {}: {}",
                    self.layer.name, feature.fid, e
                )),
            }
        }

        let Some(unit) = unit else {
            debug!("{}: no intersecting census unit", candidate.id);
            return Ok(false);
        };

        for (slot, variable) in self.variables.iter().enumerate() {
            let value = match unit.field(variable) {
                Some(value) => value,
                None => continue,
            };
            match value.as_f64() {
                Some(v) => candidate.set_census_raw(slot, Some(v)),
                None => sink.info(&format!(
                    "Could not convert census value {:?} of {} to number",
                    value, variable
                )),
            }
        }
        Ok(true)
    }
}
