//! Final score aggregation
//!
//! `final = Σ weighted infrastructure + Σ weighted census + Σ zone modifiers`
//!
//! Outage-cost savings (static model) are reported beside the final score
//! and never added to it.

use crate::candidate::{Candidate, ScoreTotals};
use crate::progress::ProgressSink;
use crate::CandidateError;

/// Totals derived from a candidate's stored per-layer scores
pub fn compute_totals(candidate: &Candidate) -> std::result::Result<ScoreTotals, CandidateError> {
    let infrastructure: f64 = candidate
        .infrastructure()
        .iter()
        .map(|e| e.weighted_score)
        .sum();
    let census: f64 = candidate
        .census()
        .iter()
        .filter_map(|e| e.weighted_score())
        .sum();
    let zones: f64 = candidate.zones().iter().map(|z| z.modifier).sum();

    for (component, value) in [
        ("infrastructure", infrastructure),
        ("census", census),
        ("zone", zones),
    ] {
        if !value.is_finite() {
            return Err(CandidateError::NonFinite {
                candidate: candidate.id.clone(),
                component,
            });
        }
    }

    let outage_cost_savings = candidate.model().tracks_outage_costs().then(|| {
        candidate
            .infrastructure()
            .iter()
            .filter(|e| e.weighted_score > 0.000000000)
            .map(|e| e.outage_cost_total())
            .sum()
    });

    Ok(ScoreTotals {
        infrastructure,
        census,
        zones,
        final_score: infrastructure + census + zones,
        outage_cost_savings,
    })
}

/// Store totals on every candidate.
///
/// A candidate whose totals cannot be computed is reported and gets a
/// final score of 0. Returns the number of such candidates.
pub fn finalize_scores(candidates: &mut [Candidate], sink: &dyn ProgressSink) -> usize {
    let mut failed = 0;
    for candidate in candidates.iter_mut() {
        let totals = match compute_totals(candidate) {
            Ok(totals) => totals,
            Err(e) => {
                failed += 1;
                sink.error(&format!(
                    "Error calculating final score for candidate {}: {}",
                    candidate.id, e
                ));
                let with_costs = candidate.model().tracks_outage_costs();
                ScoreTotals {
                    infrastructure: 0.000000000,
                    census: 0.000000000,
                    zones: 0.000000000,
                    final_score: 0.000000000,
                    outage_cost_savings: with_costs.then_some(0.000000000),
                }
            }
        };
        candidate.set_totals(totals);
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ScoringSchema;
    use crate::progress::{Level, RecordingSink};
    use crate::EvaluationModel;
    use geo::point;

    fn scored(model: EvaluationModel) -> Candidate {
        let schema = ScoringSchema::new(model)
            .with_infrastructure(["Hospitals", "Fire"])
            .with_census(["pop"])
            .with_zones(["Flood"]);
        let mut c = Candidate::new(0, "7", "Site", point!(x: 0.0, y: 0.0).into(), &schema);

        let hospitals = c.infrastructure_mut(0).unwrap();
        hospitals.weighted_score = 0.3;
        hospitals.outage_costs = vec![100.0, 50.0];
        let fire = c.infrastructure_mut(1).unwrap();
        fire.weighted_score = 0.0;
        fire.outage_costs = vec![1_000.0];

        c.set_census_raw(0, Some(1200.0));
        c.census_mut(0).unwrap().set_weighted_score(0.2);
        c.set_zone_modifier(0, -1.0);
        c
    }

    #[test]
    fn test_totals_and_outage_savings() {
        let totals = compute_totals(&scored(EvaluationModel::Static)).unwrap();
        assert!((totals.infrastructure - 0.3).abs() < 1e-12);
        assert!((totals.census - 0.2).abs() < 1e-12);
        assert_eq!(totals.zones, -1.0);
        assert!((totals.final_score - -0.5).abs() < 1e-12);
        assert_eq!(totals.outage_cost_savings, Some(150.0));
    }

    #[test]
    fn test_mobile_has_no_outage_savings() {
        let totals = compute_totals(&scored(EvaluationModel::Mobile)).unwrap();
        assert_eq!(totals.outage_cost_savings, None);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut cs = vec![scored(EvaluationModel::Static)];
        let sink = RecordingSink::new();
        finalize_scores(&mut cs, &sink);
        let first = cs[0].final_score().unwrap();
        finalize_scores(&mut cs, &sink);
        assert_eq!(cs[0].final_score().unwrap(), first);
    }

    #[test]
    fn test_non_finite_sets_zero() {
        let mut c = scored(EvaluationModel::Static);
        c.infrastructure_mut(0).unwrap().weighted_score = f64::NAN;
        let mut cs = vec![c];
        let sink = RecordingSink::new();

        assert_eq!(finalize_scores(&mut cs, &sink), 1);
        assert_eq!(cs[0].final_score().unwrap(), 0.0);
        assert_eq!(sink.messages_at(Level::Error).len(), 1);
    }
}
