//! End-to-end evaluation runs with in-memory routing

use geo::{point, polygon, Geometry};
use road_network::{LonLat, RouteSummary, RoutingError, RoutingService};
use site_evaluator::candidate::RawScore;
use site_evaluator::config::RunConfig;
use site_evaluator::output::{AttributeValue, ResultDocument};
use site_evaluator::pipeline::{CensusInput, ModelParameters};
use site_evaluator::progress::Level;
use site_evaluator::{
    evaluate, CancellationToken, DistanceMethod, EvaluationError, EvaluationInputs,
    EvaluationReport, Feature, GeodesicGeometry, Layer, Parameters, RangeScope, RecordingSink,
    Services,
};
use std::fs;

/// One degree of latitude in meters on the evaluation sphere
const METERS_PER_DEGREE: f64 = 111_194.926_644_559;

/// Durations looked up by origin longitude; anything else is unroutable
struct DurationsByOrigin(Vec<(f64, f64)>);

impl RoutingService for DurationsByOrigin {
    fn route(&self, start: LonLat, end: LonLat) -> road_network::Result<RouteSummary> {
        self.0
            .iter()
            .find(|(lon, _)| (lon - start.lon).abs() < 1e-9)
            .map(|(_, secs)| RouteSummary {
                distance_m: secs * 10.0,
                duration_s: *secs,
            })
            .ok_or(RoutingError::NoRoute(start, end))
    }
}

/// Cancels the run from inside the first routing call
struct CancelOnFirstCall(CancellationToken);

impl RoutingService for CancelOnFirstCall {
    fn route(&self, _start: LonLat, _end: LonLat) -> road_network::Result<RouteSummary> {
        self.0.cancel();
        Ok(RouteSummary {
            distance_m: 100.0,
            duration_s: 10.0,
        })
    }
}

fn site(fid: u64, id: &str, lon: f64, lat: f64) -> Feature {
    Feature::new(fid, Some(point!(x: lon, y: lat).into())).with_field("Id", id)
}

fn north_of(lon: f64, lat: f64, meters: f64) -> Geometry<f64> {
    point!(x: lon, y: lat + meters / METERS_PER_DEGREE).into()
}

fn params(model: ModelParameters, infra: &str, census: &str, zones: &str) -> Parameters {
    Parameters {
        model,
        infrastructure_weights: infra.to_string(),
        census_weights: census.to_string(),
        zone_scores: zones.to_string(),
        range_scope: RangeScope::PerLayer,
    }
}

fn straight_line(buffer_m: f64) -> ModelParameters {
    ModelParameters::Static {
        buffer_m,
        distance_method: DistanceMethod::StraightLine,
    }
}

fn run_with(
    inputs: &EvaluationInputs,
    routing: &dyn RoutingService,
    sink: &RecordingSink,
    cancel: Option<&CancellationToken>,
) -> Result<EvaluationReport, EvaluationError> {
    let geometry = GeodesicGeometry::default();
    let services = Services {
        geometry: &geometry,
        routing,
        sink,
        cancel,
    };
    evaluate(inputs, &services)
}

fn scenario_a() -> EvaluationInputs {
    EvaluationInputs {
        candidates: Layer::new(
            "sites",
            vec![
                site(0, "1", -66.1, 18.4),
                site(1, "2", -66.0, 18.4),
            ],
        ),
        infrastructure: vec![Layer::new(
            "Hospitals",
            vec![Feature::new(0, Some(north_of(-66.1, 18.4, 400.0)))
                .with_field("outage_cos", 5000.0)],
        )],
        census: None,
        zones: vec![],
        parameters: params(straight_line(1000.0), "1.0", "", ""),
    }
}

#[test]
fn test_static_single_layer_scenario() {
    let sink = RecordingSink::new();
    let report = run_with(&scenario_a(), &DurationsByOrigin(vec![]), &sink, None).unwrap();

    assert_eq!(report.candidates.len(), 2);
    let first = &report.candidates[0];
    let second = &report.candidates[1];

    let raw = first.infrastructure()[0].raw_score.value().unwrap();
    assert!((raw - 600.0).abs() < 0.5, "raw: {}", raw);
    assert_eq!(second.infrastructure()[0].raw_score, RawScore::Value(0.0));

    assert_eq!(first.infrastructure()[0].normalized_score, 1.0);
    assert_eq!(second.infrastructure()[0].normalized_score, 0.0);

    let t1 = first.totals().unwrap();
    let t2 = second.totals().unwrap();
    assert_eq!(t1.infrastructure, 1.0);
    assert_eq!(t1.final_score, 1.0);
    assert_eq!(t2.final_score, 0.0);
    assert_eq!(t1.outage_cost_savings, Some(5000.0));
    assert_eq!(t2.outage_cost_savings, Some(0.0));
}

#[test]
fn test_weight_validation_scenario() {
    let sink = RecordingSink::new();
    let census = CensusInput {
        layer: Layer::new(
            "tracts",
            vec![Feature::new(
                0,
                Some(
                    polygon![
                        (x: -67.0, y: 18.0),
                        (x: -65.0, y: 18.0),
                        (x: -65.0, y: 19.0),
                        (x: -67.0, y: 19.0),
                        (x: -67.0, y: 18.0),
                    ]
                    .into(),
                ),
            )
            .with_field("pop", 1000.0)],
        ),
        variables: None,
    };

    let mut inputs = scenario_a();
    inputs.infrastructure.push(Layer::new("Fire", vec![]));
    inputs.census = Some(census);
    inputs.parameters = params(straight_line(1000.0), "0.3,0.3", "0.4", "");

    let report = run_with(&inputs, &DurationsByOrigin(vec![]), &sink, None).unwrap();
    assert_eq!(report.weights.infrastructure, vec![0.3, 0.3]);
    assert_eq!(report.weights.census, vec![0.4]);

    inputs.parameters = params(straight_line(1000.0), "0.5,0.5", "0.5", "");
    assert!(matches!(
        run_with(&inputs, &DurationsByOrigin(vec![]), &sink, None),
        Err(EvaluationError::WeightSum { .. })
    ));
}

#[test]
fn test_mobile_duration_scenario() {
    let coverage: Geometry<f64> = polygon![
        (x: -67.0, y: 18.0),
        (x: -65.0, y: 18.0),
        (x: -65.0, y: 19.0),
        (x: -67.0, y: 19.0),
        (x: -67.0, y: 18.0),
    ]
    .into();

    let inputs = EvaluationInputs {
        candidates: Layer::new(
            "units",
            vec![
                site(0, "U1", -66.1, 18.4),
                site(1, "U2", -66.2, 18.4),
                site(2, "U3", -66.3, 18.4),
            ],
        ),
        infrastructure: vec![Layer::new(
            "Shelters",
            vec![Feature::new(0, Some(point!(x: -66.15, y: 18.45).into()))],
        )],
        census: None,
        zones: vec![],
        parameters: params(
            ModelParameters::Mobile {
                coverage_area: Some(coverage),
            },
            "1",
            "",
            "",
        ),
    };

    let routing = DurationsByOrigin(vec![(-66.1, 100.0), (-66.2, 300.0)]);
    let sink = RecordingSink::new();
    let report = run_with(&inputs, &routing, &sink, None).unwrap();

    let normalized: Vec<f64> = report
        .candidates
        .iter()
        .map(|c| c.infrastructure()[0].normalized_score)
        .collect();
    assert_eq!(normalized, vec![1.0, 0.0, 0.0]);

    let third = &report.candidates[2];
    assert_eq!(third.infrastructure()[0].raw_score, RawScore::Unavailable);
    assert_eq!(third.infrastructure()[0].count, 0);
    assert_eq!(third.infrastructure()[0].total_duration_s, Some(0.0));
    assert_eq!(third.totals().unwrap().outage_cost_savings, None);

    // Unavailable raw score is written as null
    assert_eq!(report.records[2].values[3], AttributeValue::Null);
    assert!(!sink.messages_at(Level::Warn).is_empty());
}

#[test]
fn test_critical_zones_modify_final_score() {
    let flood: Geometry<f64> = polygon![
        (x: -66.15, y: 18.35),
        (x: -66.05, y: 18.35),
        (x: -66.05, y: 18.45),
        (x: -66.15, y: 18.45),
        (x: -66.15, y: 18.35),
    ]
    .into();

    let mut inputs = scenario_a();
    inputs.zones = vec![Layer::new("Flood", vec![Feature::new(0, Some(flood))])];
    inputs.parameters.zone_scores = "-2.5".to_string();

    let sink = RecordingSink::new();
    let report = run_with(&inputs, &DurationsByOrigin(vec![]), &sink, None).unwrap();

    let first = report.candidates[0].totals().unwrap();
    let second = report.candidates[1].totals().unwrap();
    assert_eq!(first.zones, -2.5);
    assert_eq!(first.final_score, 1.0 - 2.5);
    assert_eq!(second.zones, 0.0);
    assert_eq!(second.final_score, 0.0);

    let ranked: Vec<&str> = report.ranked().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ranked, vec!["2", "1"]);
}

#[test]
fn test_cancellation_between_candidates() {
    let token = CancellationToken::new();
    let routing = CancelOnFirstCall(token.clone());

    let mut inputs = scenario_a();
    inputs.parameters.model = ModelParameters::Static {
        buffer_m: 1000.0,
        distance_method: DistanceMethod::Road,
    };

    let sink = RecordingSink::new();
    let report = run_with(&inputs, &routing, &sink, Some(&token)).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.candidates.len(), 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.candidates[0].id, "1");
    assert!(report.candidates[0].totals().is_some());
}

#[test]
fn test_run_from_config_files() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| fs::write(dir.path().join(name), body).unwrap();

    write(
        "sites.geojson",
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-66.1, 18.4]},
             "properties": {"ID": 10, "Name": "Depot A"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-66.0, 18.4]},
             "properties": {"ID": 11, "Name": "Depot B"}}
        ]}"#,
    );
    write(
        "hospitals.geojson",
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-66.1, 18.403]},
             "properties": {"outage_cos": 750}}
        ]}"#,
    );
    write(
        "tracts.geojson",
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[
                [-66.2,18.3],[-66.05,18.3],[-66.05,18.5],[-66.2,18.5],[-66.2,18.3]
             ]]},
             "properties": {"fid": 1, "pop": 2000, "label": "west"}},
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[
                [-66.05,18.3],[-65.9,18.3],[-65.9,18.5],[-66.05,18.5],[-66.05,18.3]
             ]]},
             "properties": {"fid": 2, "pop": 500, "label": "east"}}
        ]}"#,
    );
    write(
        "run.json",
        r#"{
            "model": {"mode": "static", "buffer_km": 1.0, "distance_method": "straight_line"},
            "candidates": {"path": "sites.geojson"},
            "infrastructure": [{"path": "hospitals.geojson", "name": "Hospitals"}],
            "infrastructure_weights": "0.6",
            "census": {"path": "tracts.geojson"},
            "census_weights": "0.4"
        }"#,
    );

    let config = RunConfig::from_file(dir.path().join("run.json")).unwrap();
    let inputs = config.load_inputs().unwrap();
    assert_eq!(
        inputs.parameters.model,
        ModelParameters::Static {
            buffer_m: 1000.0,
            distance_method: DistanceMethod::StraightLine
        }
    );

    let sink = RecordingSink::new();
    let report = run_with(&inputs, &DurationsByOrigin(vec![]), &sink, None).unwrap();
    assert_eq!(report.schema.census, vec!["pop".to_string()]);

    let a = report.candidates[0].totals().unwrap();
    let b = report.candidates[1].totals().unwrap();
    assert!((a.final_score - 1.0).abs() < 1e-9, "final: {}", a.final_score);
    assert_eq!(b.final_score, 0.0);

    let document = ResultDocument::from_report(&report, chrono::Utc::now());
    let json = serde_json::to_value(&document).unwrap();
    assert_eq!(json["records"][0]["id"], "10");
    assert_eq!(json["records"][0]["name"], "Depot A");
    assert_eq!(json["records"][0]["Hospitals_Cost"], 750.0);
    assert_eq!(json["records"][1]["pop_Val"], 500.0);
    assert_eq!(json["metadata"]["scored_candidates"], 2);
    assert_eq!(json["metadata"]["cancelled"], false);
    assert_eq!(json["fields"][2]["name"], "Hospitals_Cnt");
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        RunConfig::from_file(dir.path().join("absent.json")),
        Err(EvaluationError::Io(_))
    ));

    let bad = dir.path().join("bad.json");
    fs::write(&bad, r#"{"model": {"mode": "static"}}"#).unwrap();
    assert!(matches!(RunConfig::from_file(&bad), Err(EvaluationError::Config(_))));
}
