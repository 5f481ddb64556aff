//! Infrastructure evaluators
//!
//! Each evaluator fills one candidate's slot for one infrastructure layer
//! with a count and a raw score:
//!
//! - [`StaticEvaluator`]: features inside the candidate buffer contribute
//!   `max(0, buffer − distance)`; distance is by road (falling back to
//!   great circle per pair) or great circle.
//! - [`MobileEvaluator`]: features inside the shared coverage area
//!   contribute their travel time; the raw score is the sum of valid
//!   durations, or [`RawScore::Unavailable`] when none are valid.

use crate::candidate::{Candidate, RawScore};
use crate::features::{Feature, Layer};
use crate::geometry::{GeometryError, GeometryResult, GeometryService};
use crate::progress::ProgressSink;
use crate::{CandidateError, DistanceMethod};
use geo::Geometry;
use road_network::RoutingService;
use tracing::debug;

/// Field names carrying a feature's outage cost
pub const OUTAGE_COST_FIELDS: [&str; 2] = ["outage_cos", "outage_cost"];

type CandidateResult<T> = std::result::Result<T, CandidateError>;

/// Fills a candidate's raw measurement for one infrastructure layer
pub trait InfrastructureEvaluator {
    fn evaluate(
        &self,
        candidate: &mut Candidate,
        slot: usize,
        layer: &Layer,
        sink: &dyn ProgressSink,
    ) -> CandidateResult<()>;
}

/// Per-feature static contribution in meters
pub fn proximity_score(buffer_m: f64, distance_m: f64) -> f64 {
    (buffer_m - distance_m).max(0.000000000)
}

/// A usable travel time is finite and strictly positive
pub fn valid_duration(duration_s: f64) -> bool {
    duration_s.is_finite() && duration_s > 0.000000000
}

/// Outage cost of a feature, if present and numeric
pub fn outage_cost(feature: &Feature) -> Option<f64> {
    OUTAGE_COST_FIELDS
        .iter()
        .find_map(|name| feature.numeric(name))
}

/// Static deployment: buffer-and-distance scoring
pub struct StaticEvaluator<'a> {
    pub geometry: &'a dyn GeometryService,
    pub routing: &'a dyn RoutingService,
    pub buffer_m: f64,
    pub method: DistanceMethod,
}

impl StaticEvaluator<'_> {
    fn distance(
        &self,
        from: &Geometry<f64>,
        to: &Geometry<f64>,
        layer: &str,
        sink: &dyn ProgressSink,
    ) -> GeometryResult<f64> {
        let straight_line = || self.geometry.distance_m(from, to);
        match self.method {
            DistanceMethod::StraightLine => straight_line(),
            DistanceMethod::Road => {
                let start = self.geometry.lonlat(from)?;
                let end = self.geometry.lonlat(to)?;
                match self.routing.road_distance(start, end) {
                    Ok(d) if d.is_finite() && d >= 0.0 => Ok(d),
                    Ok(d) => {
                        sink.warn(&format!(
                            "{}: road distance {} unusable, using Haversine",
                            layer, d
                        ));
                        straight_line()
                    }
                    Err(e) => {
                        sink.warn(&format!(
                            "{}: road distance calculation failed: {}, using Haversine",
                            layer, e
                        ));
                        straight_line()
                    }
                }
            }
        }
    }
}

impl InfrastructureEvaluator for StaticEvaluator<'_> {
    fn evaluate(
        &self,
        candidate: &mut Candidate,
        slot: usize,
        layer: &Layer,
        sink: &dyn ProgressSink,
    ) -> CandidateResult<()> {
        let buffer = candidate
            .service_area
            .clone()
            .ok_or(GeometryError::Empty)?;
        self.geometry.as_point(&candidate.geometry)?;

        let mut count = 0;
        let mut total = 0.000000000;
        let mut costs = Vec::new();

        for feature in layer.iter() {
            let Some(geom) = feature.geometry.as_ref() else {
                continue;
            };
            match self.geometry.intersects(&buffer, geom) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    sink.warn(&format!("{} feature {}: {}", layer.name, feature.fid, e));
                    continue;
                }
            }
            let distance = match self.distance(&candidate.geometry, geom, &layer.name, sink) {
                Ok(d) => d,
                Err(e) => {
                    sink.warn(&format!("{} feature {}: {}", layer.name, feature.fid, e));
                    continue;
                }
            };

            count += 1;
            let score = proximity_score(self.buffer_m, distance);

            if score > 0.0 {
                match outage_cost(feature) {
                    Some(cost) => costs.push(cost),
                    None if OUTAGE_COST_FIELDS.iter().any(|f| feature.has_field(f)) => {
                        debug!(
                            "{} feature {}: non-numeric outage cost dropped",
                            layer.name, feature.fid
                        );
                    }
                    None => {}
                }
            }
            total += score;
        }

        debug!(
            "{} / {}: {} features in buffer, raw score {:.3}",
            candidate.id, layer.name, count, total
        );

        if let Some(entry) = candidate.infrastructure_mut(slot) {
            entry.count = count;
            entry.raw_score = RawScore::Value(total);
            entry.outage_costs.extend(costs);
        }
        Ok(())
    }
}

/// Mobile deployment: travel-time scoring within a shared coverage area
pub struct MobileEvaluator<'a> {
    pub geometry: &'a dyn GeometryService,
    pub routing: &'a dyn RoutingService,
    pub coverage_area: &'a Geometry<f64>,
}

impl InfrastructureEvaluator for MobileEvaluator<'_> {
    fn evaluate(
        &self,
        candidate: &mut Candidate,
        slot: usize,
        layer: &Layer,
        sink: &dyn ProgressSink,
    ) -> CandidateResult<()> {
        let origin = self.geometry.lonlat(&candidate.geometry)?;

        let mut count = 0;
        let mut total = 0.000000000;

        for feature in layer.iter() {
            let Some(geom) = feature.geometry.as_ref() else {
                continue;
            };
            match self.geometry.intersects(self.coverage_area, geom) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    sink.warn(&format!("{} feature {}: {}", layer.name, feature.fid, e));
                    continue;
                }
            }

            let duration = self
                .geometry
                .lonlat(geom)
                .map_err(CandidateError::from)
                .and_then(|target| {
                    self.routing
                        .eta(origin, target)
                        .map_err(CandidateError::from)
                });

            match duration {
                Ok(d) if valid_duration(d) => {
                    count += 1;
                    total += d;
                }
                Ok(d) => {
                    sink.warn(&format!(
                        "{} feature {}: invalid ETA {} from {}",
                        layer.name, feature.fid, d, candidate.id
                    ));
                }
                Err(e) => {
                    sink.warn(&format!(
                        "{} feature {}: ETA from {} failed: {}",
                        layer.name, feature.fid, candidate.id, e
                    ));
                }
            }
        }

        if let Some(entry) = candidate.infrastructure_mut(slot) {
            entry.count = count;
            if count > 0 {
                entry.raw_score = RawScore::Value(total);
                entry.total_duration_s = Some(total);
            } else {
                entry.raw_score = RawScore::Unavailable;
                entry.total_duration_s = Some(0.000000000);
            }
        }

        if count == 0 {
            sink.warn(&format!(
                "{} / {}: no valid ETA measurements",
                candidate.id, layer.name
            ));
        } else {
            debug!(
                "{} / {}: {} reachable features, total {:.1}s",
                candidate.id, layer.name, count, total
            );
        }
        Ok(())
    }
}
