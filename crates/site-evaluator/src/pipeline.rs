//! Evaluation pipeline
//!
//! ```text
//! setup      validate weights and zone scores, build candidates   0-20%
//! collect    per candidate: infrastructure -> census -> zones    20-80%
//! ---------- barrier: every candidate collected ----------
//! normalize  global ranges, weighted scores, final totals        80-90%
//! output     positional records                                  90-100%
//! ```
//!
//! Setup failures abort the run. Failures scoped to one candidate or one
//! measurement are reported to the sink and the run continues.

use crate::aggregate::finalize_scores;
use crate::candidate::{Candidate, ScoringSchema};
use crate::census::{numeric_variables, CensusAggregator};
use crate::features::Layer;
use crate::geometry::GeometryService;
use crate::infrastructure::{InfrastructureEvaluator, MobileEvaluator, StaticEvaluator};
use crate::normalize::{normalize_and_weight, GlobalRanges, RangeScope};
use crate::output::{OutputRecord, OutputSchema};
use crate::progress::{band, CancellationToken, ProgressSink};
use crate::weights::{parse_zone_scores, validate_weights, Weights};
use crate::zones::ZoneEvaluator;
use crate::{DistanceMethod, EvaluationError, EvaluationModel, Result};
use geo::Geometry;
use road_network::RoutingService;
use tracing::{debug, info};

const SETUP_END: f64 = 20.000000000;
const COLLECT_END: f64 = 80.000000000;
const NORMALIZE_END: f64 = 90.000000000;
const OUTPUT_END: f64 = 100.000000000;

/// Model-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ModelParameters {
    Static {
        /// Service-area radius in meters
        buffer_m: f64,
        distance_method: DistanceMethod,
    },
    Mobile {
        /// Shared coverage area (first feature of the coverage layer)
        coverage_area: Option<Geometry<f64>>,
    },
}

impl ModelParameters {
    pub fn model(&self) -> EvaluationModel {
        match self {
            ModelParameters::Static { .. } => EvaluationModel::Static,
            ModelParameters::Mobile { .. } => EvaluationModel::Mobile,
        }
    }
}

/// Run parameters as supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub model: ModelParameters,
    /// Comma-separated, one per infrastructure layer
    pub infrastructure_weights: String,
    /// Comma-separated, one per census variable
    pub census_weights: String,
    /// Comma-separated signed scores, one per zone layer
    pub zone_scores: String,
    pub range_scope: RangeScope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CensusInput {
    pub layer: Layer,
    /// Explicit variables; `None` derives them from the layer
    pub variables: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationInputs {
    pub candidates: Layer,
    pub infrastructure: Vec<Layer>,
    pub census: Option<CensusInput>,
    pub zones: Vec<Layer>,
    pub parameters: Parameters,
}

/// External collaborators used by a run
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub geometry: &'a dyn GeometryService,
    pub routing: &'a dyn RoutingService,
    pub sink: &'a dyn ProgressSink,
    pub cancel: Option<&'a CancellationToken>,
}

impl Services<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub model: EvaluationModel,
    pub schema: ScoringSchema,
    pub weights: Weights,
    pub ranges: GlobalRanges,
    /// Scored candidates, in input order
    pub candidates: Vec<Candidate>,
    pub output_schema: OutputSchema,
    pub records: Vec<OutputRecord>,
    /// Features in the candidate layer
    pub input_count: usize,
    /// Candidates dropped during setup
    pub skipped: usize,
    pub cancelled: bool,
    /// Candidates whose final score was forced to 0
    pub score_failures: usize,
}

impl EvaluationReport {
    /// Candidates ordered by descending final score
    pub fn ranked(&self) -> Vec<&Candidate> {
        let mut ranked: Vec<&Candidate> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| {
            let fa = a.final_score().unwrap_or(f64::NEG_INFINITY);
            let fb = b.final_score().unwrap_or(f64::NEG_INFINITY);
            fb.total_cmp(&fa)
        });
        ranked
    }
}

/// Setup-time validation results
struct Setup {
    schema: ScoringSchema,
    weights: Weights,
    zone_scores: Vec<f64>,
}

fn validate_setup(inputs: &EvaluationInputs, sink: &dyn ProgressSink) -> Result<Setup> {
    if inputs.candidates.is_empty() {
        return Err(EvaluationError::MissingRequiredLayer(
            "no candidate sites".to_string(),
        ));
    }
    if inputs.infrastructure.is_empty() {
        return Err(EvaluationError::MissingRequiredLayer(
            "no infrastructure layers".to_string(),
        ));
    }

    match &inputs.parameters.model {
        ModelParameters::Static { buffer_m, .. } if !buffer_m.is_finite() || *buffer_m <= 0.0 => {
            return Err(EvaluationError::InvalidParameter(format!(
                "buffer distance must be greater than 0 (got {} m)",
                buffer_m
            )));
        }
        ModelParameters::Mobile { coverage_area: None } => {
            return Err(EvaluationError::MissingRequiredLayer(
                "mobile evaluation requires a coverage area".to_string(),
            ));
        }
        _ => {}
    }

    let variables = match &inputs.census {
        Some(census) => {
            let variables = census
                .variables
                .clone()
                .unwrap_or_else(|| numeric_variables(&census.layer));
            if variables.is_empty() {
                sink.warn("No numeric census variables found in census layer");
            }
            variables
        }
        None => Vec::new(),
    };

    let weights = validate_weights(
        &inputs.parameters.infrastructure_weights,
        &inputs.parameters.census_weights,
        inputs.infrastructure.len(),
        variables.len(),
    )?;
    let zone_scores = parse_zone_scores(&inputs.parameters.zone_scores, inputs.zones.len())?;

    let schema = ScoringSchema::new(inputs.parameters.model.model())
        .with_infrastructure(inputs.infrastructure.iter().map(|l| l.name.clone()))
        .with_census(variables)
        .with_zones(inputs.zones.iter().map(|l| l.name.clone()));

    Ok(Setup {
        schema,
        weights,
        zone_scores,
    })
}

/// Run a complete evaluation
pub fn evaluate(inputs: &EvaluationInputs, services: &Services<'_>) -> Result<EvaluationReport> {
    let sink = services.sink;
    let model = inputs.parameters.model.model();
    sink.info(&format!("Starting {} evaluation", model));
    sink.set_progress(0.000000000);

    let Setup {
        schema,
        weights,
        zone_scores,
    } = validate_setup(inputs, sink)?;

    sink.info(&format!(
        "{} infrastructure layers, {} census variables, {} critical zone layers",
        schema.infrastructure.len(),
        schema.census.len(),
        schema.zones.len()
    ));

    // Setup: candidates and their service areas
    let input_count = inputs.candidates.len();
    let mut candidates = Vec::with_capacity(input_count);
    let mut skipped = 0;
    for (seq, feature) in inputs.candidates.iter().enumerate() {
        let built = Candidate::from_feature(seq, feature, &schema).and_then(|mut c| {
            if let ModelParameters::Static { buffer_m, .. } = &inputs.parameters.model {
                c.service_area = Some(services.geometry.buffer(&c.geometry, *buffer_m)?);
            }
            Ok(c)
        });
        match built {
            Ok(c) => candidates.push(c),
            Err(e) => {
                skipped += 1;
                sink.error(&format!(
                    "Error creating candidate from feature {}: {}",
                    feature.fid, e
                ));
            }
        }
        sink.set_progress(band(0.0, SETUP_END, seq + 1, input_count));
    }
    sink.info(&format!("Created {} candidates ({} skipped)", candidates.len(), skipped));

    let evaluator: Box<dyn InfrastructureEvaluator + '_> = match &inputs.parameters.model {
        ModelParameters::Static {
            buffer_m,
            distance_method,
        } => {
            sink.info(&format!("Distance method: {}", distance_method));
            Box::new(StaticEvaluator {
                geometry: services.geometry,
                routing: services.routing,
                buffer_m: *buffer_m,
                method: *distance_method,
            })
        }
        ModelParameters::Mobile { coverage_area } => {
            let coverage_area = coverage_area.as_ref().ok_or_else(|| {
                EvaluationError::MissingRequiredLayer("coverage area".to_string())
            })?;
            Box::new(MobileEvaluator {
                geometry: services.geometry,
                routing: services.routing,
                coverage_area,
            })
        }
    };

    let census = inputs.census.as_ref().filter(|_| !schema.census.is_empty()).map(|c| {
        CensusAggregator {
            geometry: services.geometry,
            layer: &c.layer,
            variables: &schema.census,
        }
    });
    let zones = ZoneEvaluator {
        geometry: services.geometry,
        layers: &inputs.zones,
        scores: &zone_scores,
    };

    // Collect raw measurements, one candidate at a time
    let total = candidates.len();
    let mut collected = Vec::with_capacity(total);
    let mut cancelled = false;
    for (done, mut candidate) in candidates.into_iter().enumerate() {
        if services.cancelled() {
            cancelled = true;
            sink.warn(&format!(
                "Evaluation cancelled after {} of {} candidates",
                done, total
            ));
            break;
        }

        for (slot, layer) in inputs.infrastructure.iter().enumerate() {
            if let Err(e) = evaluator.evaluate(&mut candidate, slot, layer, sink) {
                sink.error(&format!(
                    "Error evaluating {} for candidate {}: {}",
                    layer.name, candidate.id, e
                ));
            }
        }

        if let Some(census) = &census {
            if let Err(e) = census.attach(&mut candidate, sink) {
                sink.error(&format!(
                    "Error processing census data for candidate {}: {}",
                    candidate.id, e
                ));
            }
        }

        zones.apply(&mut candidate, sink);

        collected.push(candidate);
        sink.set_progress(band(SETUP_END, COLLECT_END, done + 1, total));
    }

    // Barrier: every collected candidate has all raw measurements
    let mut candidates = collected;
    info!("Normalizing scores across {} candidates", candidates.len());
    let scope = inputs.parameters.range_scope;
    let ranges = normalize_and_weight(&mut candidates, model, &weights, scope);
    let score_failures = finalize_scores(&mut candidates, sink);
    sink.set_progress(NORMALIZE_END);

    let output_schema = OutputSchema::for_schema(&schema);
    let mut records = Vec::with_capacity(candidates.len());
    let scored = candidates.len();
    for (i, candidate) in candidates.iter().enumerate() {
        match OutputRecord::from_candidate(candidate) {
            Ok(record) => records.push(record),
            Err(e) => sink.error(&format!("Error writing candidate {}: {}", candidate.id, e)),
        }
        sink.set_progress(band(NORMALIZE_END, OUTPUT_END, i + 1, scored));
    }
    debug!("{} output records", records.len());

    sink.info(&format!(
        "Evaluation complete: {} of {} candidates scored",
        scored, input_count
    ));
    sink.set_progress(OUTPUT_END);

    Ok(EvaluationReport {
        model,
        schema,
        weights,
        ranges,
        candidates,
        output_schema,
        records,
        input_count,
        skipped,
        cancelled,
        score_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use crate::geometry::GeodesicGeometry;
    use crate::progress::RecordingSink;
    use geo::point;
    use road_network::{LonLat, RouteSummary, RoutingError};

    struct Offline;

    impl RoutingService for Offline {
        fn route(&self, start: LonLat, end: LonLat) -> road_network::Result<RouteSummary> {
            Err(RoutingError::NoRoute(start, end))
        }
    }

    fn inputs(model: ModelParameters) -> EvaluationInputs {
        EvaluationInputs {
            candidates: Layer::new(
                "sites",
                vec![Feature::new(0, Some(point!(x: -66.1, y: 18.4).into()))],
            ),
            infrastructure: vec![Layer::new(
                "Hospitals",
                vec![Feature::new(0, Some(point!(x: -66.1, y: 18.401).into()))],
            )],
            census: None,
            zones: vec![],
            parameters: Parameters {
                model,
                infrastructure_weights: "1.0".to_string(),
                census_weights: String::new(),
                zone_scores: String::new(),
                range_scope: RangeScope::PerLayer,
            },
        }
    }

    fn straight_line(buffer_m: f64) -> ModelParameters {
        ModelParameters::Static {
            buffer_m,
            distance_method: DistanceMethod::StraightLine,
        }
    }

    fn run(inputs: &EvaluationInputs, sink: &RecordingSink) -> Result<EvaluationReport> {
        let geometry = GeodesicGeometry::default();
        let services = Services {
            geometry: &geometry,
            routing: &Offline,
            sink,
            cancel: None,
        };
        evaluate(inputs, &services)
    }

    #[test]
    fn test_setup_errors() {
        let sink = RecordingSink::new();

        let mut bad = inputs(straight_line(0.0));
        assert!(matches!(run(&bad, &sink), Err(EvaluationError::InvalidParameter(_))));

        bad = inputs(ModelParameters::Mobile { coverage_area: None });
        assert!(matches!(run(&bad, &sink), Err(EvaluationError::MissingRequiredLayer(_))));

        bad = inputs(straight_line(1000.0));
        bad.infrastructure.clear();
        bad.parameters.infrastructure_weights.clear();
        assert!(matches!(run(&bad, &sink), Err(EvaluationError::MissingRequiredLayer(_))));

        bad = inputs(straight_line(1000.0));
        bad.candidates.features.clear();
        assert!(matches!(run(&bad, &sink), Err(EvaluationError::MissingRequiredLayer(_))));

        bad = inputs(straight_line(1000.0));
        bad.zones.push(Layer::new("Flood", vec![]));
        assert!(matches!(run(&bad, &sink), Err(EvaluationError::MissingRequiredLayer(_))));

        bad = inputs(straight_line(1000.0));
        bad.parameters.infrastructure_weights = "one".to_string();
        assert!(matches!(run(&bad, &sink), Err(EvaluationError::MalformedInput(_))));
    }

    #[test]
    fn test_progress_is_monotonic_and_complete() {
        let sink = RecordingSink::new();
        let report = run(&inputs(straight_line(1000.0)), &sink).unwrap();

        let progress = sink.progress();
        assert_eq!(progress.first(), Some(&0.0));
        assert_eq!(progress.last(), Some(&100.0));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(report.records.len(), 1);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_candidate_without_geometry_is_skipped() {
        let sink = RecordingSink::new();
        let mut with_bad = inputs(straight_line(1000.0));
        with_bad.candidates.features.push(Feature::new(1, None));

        let report = run(&with_bad, &sink).unwrap();
        assert_eq!(report.input_count, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.candidates.len(), 1);
    }

    #[test]
    fn test_cancelled_before_collection() {
        let geometry = GeodesicGeometry::default();
        let sink = RecordingSink::new();
        let token = CancellationToken::new();
        token.cancel();
        let services = Services {
            geometry: &geometry,
            routing: &Offline,
            sink: &sink,
            cancel: Some(&token),
        };

        let report = evaluate(&inputs(straight_line(1000.0)), &services).unwrap();
        assert!(report.cancelled);
        assert!(report.candidates.is_empty());
        assert!(report.records.is_empty());
    }
}
