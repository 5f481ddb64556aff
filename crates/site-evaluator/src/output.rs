//! Output attribute schema and records
//!
//! Field order is positional and fixed:
//!
//! ```text
//! id, name,
//! per infrastructure layer: _Cnt, _Raw, _Fnl, [_Cost static],
//! TotalInfra, [TotalCost static],
//! per census variable: _Val, _Scr,
//! per zone layer: _Scr,
//! TotalZones, TotalDemo, FinalScore
//! ```
//!
//! Layer prefixes are truncated to 10 characters, census and zone
//! prefixes to 8, so names stay within shapefile limits.

use crate::candidate::{Candidate, ScoringSchema};
use crate::pipeline::EvaluationReport;
use crate::weights::Weights;
use crate::{CandidateError, EvaluationModel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

const INFRA_PREFIX_LEN: usize = 10;
const CENSUS_PREFIX_LEN: usize = 8;
const ZONE_PREFIX_LEN: usize = 8;

/// Spaces become underscores, anything else non-alphanumeric is dropped
pub fn safe_field_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Real,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputField {
    pub name: String,
    pub alias: String,
    pub kind: FieldKind,
}

impl OutputField {
    fn new(name: impl Into<String>, alias: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            kind,
        }
    }
}

/// One output value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

impl From<Option<f64>> for AttributeValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => AttributeValue::Real(v),
            _ => AttributeValue::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSchema {
    pub fields: Vec<OutputField>,
}

/// Truncated, collision-free prefix for a layer or variable
fn prefix(name: &str, len: usize, used: &mut HashSet<String>) -> String {
    let safe = safe_field_name(name);
    let base: String = safe.chars().take(len).collect();
    let mut candidate = base.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        let suffix = n.to_string();
        let keep = len.saturating_sub(suffix.len());
        candidate = base.chars().take(keep).collect::<String>() + &suffix;
        n += 1;
    }
    candidate
}

impl OutputSchema {
    pub fn for_schema(schema: &ScoringSchema) -> Self {
        let with_costs = schema.model.tracks_outage_costs();
        let mut fields = vec![
            OutputField::new("id", "Id", FieldKind::Text),
            OutputField::new("name", "Name", FieldKind::Text),
        ];

        let mut used = HashSet::new();
        for layer in &schema.infrastructure {
            let short = prefix(layer, INFRA_PREFIX_LEN, &mut used);
            fields.push(OutputField::new(
                format!("{}_Cnt", short),
                format!("{} Count", layer),
                FieldKind::Integer,
            ));
            fields.push(OutputField::new(
                format!("{}_Raw", short),
                format!("{} Raw Score", layer),
                FieldKind::Real,
            ));
            fields.push(OutputField::new(
                format!("{}_Fnl", short),
                format!("{} Final Score", layer),
                FieldKind::Real,
            ));
            if with_costs {
                fields.push(OutputField::new(
                    format!("{}_Cost", short),
                    format!("{} Outage Cost", layer),
                    FieldKind::Real,
                ));
            }
        }
        fields.push(OutputField::new("TotalInfra", "Total Infrastructure Score", FieldKind::Real));
        if with_costs {
            fields.push(OutputField::new(
                "TotalCost",
                "Total Outage Cost Savings",
                FieldKind::Real,
            ));
        }

        let mut used = HashSet::new();
        for variable in &schema.census {
            let short = prefix(variable, CENSUS_PREFIX_LEN, &mut used);
            fields.push(OutputField::new(
                format!("{}_Val", short),
                format!("{} Value", variable),
                FieldKind::Real,
            ));
            fields.push(OutputField::new(
                format!("{}_Scr", short),
                format!("{} Score", variable),
                FieldKind::Real,
            ));
        }

        // Census and zone fields share the `_Scr` suffix
        for layer in &schema.zones {
            let short = prefix(layer, ZONE_PREFIX_LEN, &mut used);
            fields.push(OutputField::new(
                format!("{}_Scr", short),
                format!("{} Score", layer),
                FieldKind::Real,
            ));
        }

        fields.push(OutputField::new("TotalZones", "Total Zones Score", FieldKind::Real));
        fields.push(OutputField::new("TotalDemo", "Total Demographic Score", FieldKind::Real));
        fields.push(OutputField::new("FinalScore", "Final Score", FieldKind::Real));

        Self { fields }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Attribute values of one finalized candidate, in schema order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OutputRecord {
    pub values: Vec<AttributeValue>,
}

impl OutputRecord {
    pub fn from_candidate(candidate: &Candidate) -> std::result::Result<Self, CandidateError> {
        let totals = *candidate
            .totals()
            .ok_or_else(|| CandidateError::NotFinalized(candidate.id.clone()))?;
        let with_costs = candidate.model().tracks_outage_costs();

        let mut values = vec![
            AttributeValue::Text(candidate.id.clone()),
            AttributeValue::Text(candidate.name.clone()),
        ];

        for entry in candidate.infrastructure() {
            values.push(AttributeValue::Integer(entry.count as i64));
            values.push(entry.raw_score.value().into());
            values.push(AttributeValue::Real(entry.weighted_score));
            if with_costs {
                values.push(AttributeValue::Real(entry.outage_cost_total()));
            }
        }
        values.push(AttributeValue::Real(totals.infrastructure));
        if with_costs {
            values.push(totals.outage_cost_savings.into());
        }

        for entry in candidate.census() {
            values.push(entry.raw_value.into());
            values.push(entry.weighted_score().into());
        }

        for zone in candidate.zones() {
            values.push(AttributeValue::Real(zone.modifier));
        }
        values.push(AttributeValue::Real(totals.zones));
        values.push(AttributeValue::Real(totals.census));
        values.push(AttributeValue::Real(totals.final_score));

        Ok(Self { values })
    }

    /// Record as a JSON object keyed by field name, in field order
    pub fn to_json(&self, schema: &OutputSchema) -> serde_json::Value {
        let object: serde_json::Map<String, serde_json::Value> = schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(field, value)| {
                let json = match value {
                    AttributeValue::Integer(i) => serde_json::Value::from(*i),
                    AttributeValue::Real(r) => serde_json::Value::from(*r),
                    AttributeValue::Text(s) => serde_json::Value::from(s.as_str()),
                    AttributeValue::Null => serde_json::Value::Null,
                };
                (field.name.clone(), json)
            })
            .collect();
        serde_json::Value::Object(object)
    }
}

/// Run summary written beside the records
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub mode: EvaluationModel,
    pub weights: Weights,
    pub input_candidates: usize,
    pub scored_candidates: usize,
    pub skipped_candidates: usize,
    pub score_failures: usize,
    pub cancelled: bool,
    pub generated_at: DateTime<Utc>,
}

/// The `{fields, records, metadata}` result document
#[derive(Debug, Clone, Serialize)]
pub struct ResultDocument {
    pub fields: Vec<OutputField>,
    pub records: Vec<serde_json::Value>,
    pub metadata: RunMetadata,
}

impl ResultDocument {
    pub fn from_report(report: &EvaluationReport, generated_at: DateTime<Utc>) -> Self {
        Self {
            fields: report.output_schema.fields.clone(),
            records: report
                .records
                .iter()
                .map(|r| r.to_json(&report.output_schema))
                .collect(),
            metadata: RunMetadata {
                mode: report.model,
                weights: report.weights.clone(),
                input_candidates: report.input_count,
                scored_candidates: report.candidates.len(),
                skipped_candidates: report.input_count - report.candidates.len(),
                score_failures: report.score_failures,
                cancelled: report.cancelled,
                generated_at,
            },
        }
    }
}
