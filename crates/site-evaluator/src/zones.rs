//! Critical-zone modifiers
//!
//! For each zone layer the candidate point is tested against the layer's
//! features in order; the first intersecting feature assigns that layer's
//! signed score, otherwise the modifier is 0. Modifiers are added to the
//! final score as-is.

use crate::candidate::Candidate;
use crate::features::Layer;
use crate::geometry::GeometryService;
use crate::progress::ProgressSink;
use tracing::debug;

pub struct ZoneEvaluator<'a> {
    pub geometry: &'a dyn GeometryService,
    pub layers: &'a [Layer],
    /// One signed score per zone layer
    pub scores: &'a [f64],
}

impl ZoneEvaluator<'_> {
    /// Modifier for one zone layer
    pub fn modifier(&self, candidate: &Candidate, slot: usize, sink: &dyn ProgressSink) -> f64 {
        let (Some(layer), Some(score)) = (self.layers.get(slot), self.scores.get(slot)) else {
            return 0.000000000;
        };

        for feature in layer.iter() {
            let Some(geom) = feature.geometry.as_ref() else {
                continue;
            };
            match self.geometry.intersects(&candidate.geometry, geom) {
                Ok(true) => {
                    debug!(
                        "{} intersects {} (feature {}), applying score {}",
                        candidate.id, layer.name, feature.fid, score
                    );
                    return *score;
                }
                Ok(false) => {}
                Err(e) => sink.warn(&format!(
                    "{}: zone test against {} feature {} failed: {}",
                    candidate.id, layer.name, feature.fid, e
                )),
            }
        }
        0.000000000
    }

    /// Assign a modifier for every zone layer
    pub fn apply(&self, candidate: &mut Candidate, sink: &dyn ProgressSink) {
        for slot in 0..self.layers.len() {
            let modifier = self.modifier(candidate, slot, sink);
            candidate.set_zone_modifier(slot, modifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ScoringSchema;
    use crate::features::Feature;
    use crate::geometry::GeodesicGeometry;
    use crate::progress::RecordingSink;
    use crate::EvaluationModel;
    use geo::{point, polygon, Geometry};

    fn square(x0: f64, y0: f64) -> Geometry<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + 1.0, y: y0),
            (x: x0 + 1.0, y: y0 + 1.0),
            (x: x0, y: y0 + 1.0),
            (x: x0, y: y0),
        ]
        .into()
    }

    #[test]
    fn test_first_match_not_cumulative() {
        let geometry = GeodesicGeometry::default();
        let layers = vec![
            Layer::new(
                "Flood",
                vec![
                    Feature::new(0, Some(square(0.0, 0.0))),
                    Feature::new(1, Some(square(0.0, 0.0))),
                ],
            ),
            Layer::new("Priority", vec![Feature::new(0, Some(square(5.0, 5.0)))]),
        ];
        let scores = vec![-2.0, 3.0];
        let schema = ScoringSchema::new(EvaluationModel::Static).with_zones(["Flood", "Priority"]);
        let mut candidate = Candidate::new(0, "1", "Site", point!(x: 0.5, y: 0.5).into(), &schema);

        let zones = ZoneEvaluator {
            geometry: &geometry,
            layers: &layers,
            scores: &scores,
        };
        zones.apply(&mut candidate, &RecordingSink::new());

        let modifiers: Vec<f64> = candidate.zones().iter().map(|z| z.modifier).collect();
        assert_eq!(modifiers, vec![-2.0, 0.0]);
    }

    #[test]
    fn test_buffer_is_not_used() {
        let geometry = GeodesicGeometry::default();
        let layers = vec![Layer::new("Priority", vec![Feature::new(0, Some(square(0.0, 0.0)))])];
        let scores = vec![4.0];
        let schema = ScoringSchema::new(EvaluationModel::Static).with_zones(["Priority"]);

        // Point just outside the zone; its buffer would overlap
        let mut candidate =
            Candidate::new(0, "1", "Site", point!(x: 1.001, y: 0.5).into(), &schema);
        candidate.service_area = Some(geometry.buffer(&candidate.geometry, 5_000.0).unwrap());

        let zones = ZoneEvaluator {
            geometry: &geometry,
            layers: &layers,
            scores: &scores,
        };
        zones.apply(&mut candidate, &RecordingSink::new());
        assert_eq!(candidate.zones()[0].modifier, 0.0);
    }
}
