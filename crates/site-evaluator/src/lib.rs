//! Energy Storage Site Evaluator
//!
//! Scores candidate sites for energy storage deployment from three
//! evidence sources: proximity to critical infrastructure, census
//! demographics, and membership in critical zones.
//!
//! # Scoring Model
//!
//! ```text
//! Final = Σ wᵢ·norm(Infraᵢ) + Σ wⱼ·norm(Censusⱼ) + Σ Zoneₖ
//! ```
//!
//! | Term     | Normalized | Weighted | Notes |
//! |----------|------------|----------|-------|
//! | Infraᵢ   | global min-max | yes | static: Σ(buffer − distance); mobile: Σ ETA, inverted |
//! | Censusⱼ  | global min-max | yes | raw value of the intersecting census unit |
//! | Zoneₖ    | no         | no       | signed modifier on first intersecting feature |
//!
//! All infrastructure and census weights together must sum to 1.0.
//!
//! # Deployment Models
//!
//! - **Static**: fixed sites with a service-area buffer; distance by road
//!   network or great circle. Tracks outage-cost savings as a side metric.
//! - **Mobile**: units sharing one coverage area; scored by travel time
//!   from the routing backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod aggregate;
pub mod candidate;
pub mod census;
pub mod config;
pub mod features;
pub mod geometry;
pub mod infrastructure;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod weights;
pub mod zones;

pub use candidate::{Candidate, RawScore, ScoreTotals, ScoringSchema};
pub use features::{Feature, FieldValue, Layer};
pub use geometry::{GeodesicGeometry, GeometryService};
pub use normalize::RangeScope;
pub use pipeline::{evaluate, EvaluationInputs, EvaluationReport, Parameters, Services};
pub use progress::{CancellationToken, ProgressSink, RecordingSink, TracingSink};
pub use weights::{validate_weights, Weights};

/// Kilometers to meters (9 decimal precision)
pub const METERS_PER_KM: f64 = 1000.000000000;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error(
        "Number of {kind} weights ({actual}) does not match number of {kind} inputs ({expected})"
    )]
    CountMismatch {
        kind: WeightKind,
        expected: usize,
        actual: usize,
    },
    #[error("Total of all weights ({total}) must equal 1.0 (infrastructure and census combined)")]
    WeightSum { total: f64 },
    #[error("Missing required layer: {0}")]
    MissingRequiredLayer(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Recoverable failure scoped to one candidate or one measurement
#[derive(Error, Debug)]
pub enum CandidateError {
    #[error("geometry error: {0}")]
    Geometry(#[from] geometry::GeometryError),
    #[error("routing error: {0}")]
    Routing(#[from] road_network::RoutingError),
    #[error("candidate {0} has not been finalized")]
    NotFinalized(String),
    #[error("non-finite {component} score for candidate {candidate}")]
    NonFinite {
        candidate: String,
        component: &'static str,
    },
}

/// Which weight list a count mismatch refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightKind {
    Infrastructure,
    Census,
}

impl fmt::Display for WeightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightKind::Infrastructure => write!(f, "infrastructure"),
            WeightKind::Census => write!(f, "census"),
        }
    }
}

/// Deployment model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationModel {
    /// Fixed sites with a per-candidate service buffer
    Static,
    /// Mobile units within a shared coverage area
    Mobile,
}

impl EvaluationModel {
    /// Only the static model tracks outage-cost savings
    pub fn tracks_outage_costs(&self) -> bool {
        matches!(self, EvaluationModel::Static)
    }
}

impl fmt::Display for EvaluationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationModel::Static => write!(f, "Static Energy Storage"),
            EvaluationModel::Mobile => write!(f, "Mobile Energy Storage"),
        }
    }
}

/// Distance strategy for the static model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMethod {
    /// Road network distance, falling back to straight line per pair
    #[default]
    Road,
    /// Great-circle distance
    StraightLine,
}

impl fmt::Display for DistanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMethod::Road => write!(f, "Road"),
            DistanceMethod::StraightLine => write!(f, "Haversine"),
        }
    }
}
