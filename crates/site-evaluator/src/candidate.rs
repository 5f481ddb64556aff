//! Candidate site record
//!
//! A [`Candidate`] carries one fixed-schema slot per infrastructure layer,
//! census variable and zone layer, resolved from the [`ScoringSchema`] at
//! construction time. Slot index equals the position of the layer (or
//! variable) in the run configuration, which is also the output order.

use crate::features::Feature;
use crate::geometry::GeometryError;
use crate::{CandidateError, EvaluationModel};
use geo::Geometry;
use serde::Serialize;

/// Field spellings accepted for the candidate identifier
pub const ID_FIELDS: [&str; 3] = ["Id", "ID", "id"];

/// Field spellings accepted for the candidate name
pub const NAME_FIELDS: [&str; 3] = ["Name", "name", "NAME"];

/// Raw infrastructure measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawScore {
    Value(f64),
    /// No usable measurement (mobile: every feature pair failed)
    Unavailable,
}

impl RawScore {
    pub fn value(&self) -> Option<f64> {
        match self {
            RawScore::Value(v) => Some(*v),
            RawScore::Unavailable => None,
        }
    }
}

/// Per-layer infrastructure scores for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfrastructureEntry {
    pub layer: String,
    pub count: usize,
    pub raw_score: RawScore,
    pub normalized_score: f64,
    pub weighted_score: f64,
    /// Sum of valid durations in seconds (mobile only)
    pub total_duration_s: Option<f64>,
    /// Outage costs of positively scored features (static only)
    pub outage_costs: Vec<f64>,
}

impl InfrastructureEntry {
    fn new(layer: &str, model: EvaluationModel) -> Self {
        let (raw_score, total_duration_s) = match model {
            EvaluationModel::Static => (RawScore::Value(0.0), None),
            EvaluationModel::Mobile => (RawScore::Unavailable, Some(0.0)),
        };
        Self {
            layer: layer.to_string(),
            count: 0,
            raw_score,
            normalized_score: 0.0,
            weighted_score: 0.0,
            total_duration_s,
            outage_costs: Vec::new(),
        }
    }

    pub fn outage_cost_total(&self) -> f64 {
        self.outage_costs.iter().sum()
    }
}

/// Per-variable census scores for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CensusEntry {
    pub variable: String,
    pub raw_value: Option<f64>,
    weighted_score: Option<f64>,
}

impl CensusEntry {
    pub fn weighted_score(&self) -> Option<f64> {
        self.weighted_score
    }

    /// Store a weighted score; refused when there is no raw value
    pub fn set_weighted_score(&mut self, score: f64) -> bool {
        if self.raw_value.is_none() {
            return false;
        }
        self.weighted_score = Some(score);
        true
    }

    pub fn clear_weighted_score(&mut self) {
        self.weighted_score = None;
    }
}

/// Signed critical-zone modifier for one zone layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneModifier {
    pub layer: String,
    pub modifier: f64,
}

/// Aggregated candidate scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreTotals {
    pub infrastructure: f64,
    pub census: f64,
    pub zones: f64,
    pub final_score: f64,
    /// Static model only
    pub outage_cost_savings: Option<f64>,
}

/// Layer and variable names of one run, in configuration order
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSchema {
    pub model: EvaluationModel,
    pub infrastructure: Vec<String>,
    pub census: Vec<String>,
    pub zones: Vec<String>,
}

impl ScoringSchema {
    pub fn new(model: EvaluationModel) -> Self {
        Self {
            model,
            infrastructure: Vec::new(),
            census: Vec::new(),
            zones: Vec::new(),
        }
    }

    pub fn with_infrastructure<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.infrastructure = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_census<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.census = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_zones<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.zones = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A candidate site under evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Position in the input layer
    pub seq: usize,
    pub id: String,
    pub name: String,
    pub geometry: Geometry<f64>,
    /// Static model buffer; mobile candidates share the coverage area
    pub service_area: Option<Geometry<f64>>,
    model: EvaluationModel,
    infrastructure: Vec<InfrastructureEntry>,
    census: Vec<CensusEntry>,
    zones: Vec<ZoneModifier>,
    totals: Option<ScoreTotals>,
}

impl Candidate {
    pub fn new(
        seq: usize,
        id: impl Into<String>,
        name: impl Into<String>,
        geometry: Geometry<f64>,
        schema: &ScoringSchema,
    ) -> Self {
        Self {
            seq,
            id: id.into(),
            name: name.into(),
            geometry,
            service_area: None,
            model: schema.model,
            infrastructure: schema
                .infrastructure
                .iter()
                .map(|layer| InfrastructureEntry::new(layer, schema.model))
                .collect(),
            census: schema
                .census
                .iter()
                .map(|variable| CensusEntry {
                    variable: variable.clone(),
                    raw_value: None,
                    weighted_score: None,
                })
                .collect(),
            zones: schema
                .zones
                .iter()
                .map(|layer| ZoneModifier {
                    layer: layer.clone(),
                    modifier: 0.0,
                })
                .collect(),
            totals: None,
        }
    }

    /// Build from an input feature, resolving id and name from the
    /// accepted field spellings
    pub fn from_feature(
        seq: usize,
        feature: &Feature,
        schema: &ScoringSchema,
    ) -> std::result::Result<Self, CandidateError> {
        let geometry = feature.geometry.clone().ok_or(GeometryError::Empty)?;

        let id = feature
            .first_field(&ID_FIELDS)
            .and_then(|v| v.display())
            .unwrap_or_else(|| feature.fid.to_string());
        let name = feature
            .first_field(&NAME_FIELDS)
            .and_then(|v| v.display())
            .unwrap_or_else(|| format!("Candidate {}", id));

        Ok(Self::new(seq, id, name, geometry, schema))
    }

    pub fn model(&self) -> EvaluationModel {
        self.model
    }

    pub fn infrastructure(&self) -> &[InfrastructureEntry] {
        &self.infrastructure
    }

    pub fn census(&self) -> &[CensusEntry] {
        &self.census
    }

    pub fn zones(&self) -> &[ZoneModifier] {
        &self.zones
    }

    /// Mutable slot for an infrastructure layer; invalidates totals
    pub fn infrastructure_mut(&mut self, layer: usize) -> Option<&mut InfrastructureEntry> {
        self.totals = None;
        self.infrastructure.get_mut(layer)
    }

    /// Mutable slot for a census variable; invalidates totals
    pub fn census_mut(&mut self, variable: usize) -> Option<&mut CensusEntry> {
        self.totals = None;
        self.census.get_mut(variable)
    }

    pub fn set_census_raw(&mut self, variable: usize, value: Option<f64>) {
        if let Some(entry) = self.census_mut(variable) {
            entry.raw_value = value;
            if value.is_none() {
                entry.clear_weighted_score();
            }
        }
    }

    pub fn set_zone_modifier(&mut self, layer: usize, modifier: f64) {
        self.totals = None;
        if let Some(zone) = self.zones.get_mut(layer) {
            zone.modifier = modifier;
        }
    }

    /// Totals, present only after aggregation
    pub fn totals(&self) -> Option<&ScoreTotals> {
        self.totals.as_ref()
    }

    pub fn set_totals(&mut self, totals: ScoreTotals) {
        self.totals = Some(totals);
    }

    pub fn final_score(&self) -> std::result::Result<f64, CandidateError> {
        self.totals
            .map(|t| t.final_score)
            .ok_or_else(|| CandidateError::NotFinalized(self.id.clone()))
    }
}
