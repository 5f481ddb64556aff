//! JSON run configuration
//!
//! ```json
//! {
//!   "model": {"mode": "static", "buffer_km": 5.0, "distance_method": "road"},
//!   "candidates": {"path": "sites.geojson"},
//!   "infrastructure": [{"path": "hospitals.geojson", "name": "Hospitals"}],
//!   "infrastructure_weights": "0.6",
//!   "census": {"path": "tracts.geojson", "variables": ["pop"]},
//!   "census_weights": "0.4",
//!   "critical_zones": [{"path": "flood.geojson"}],
//!   "critical_zone_scores": "-2",
//!   "routing": {"base_url": "http://127.0.0.1:5001"}
//! }
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use crate::loader::{load_layer, load_required_layer};
use crate::normalize::RangeScope;
use crate::pipeline::{CensusInput, EvaluationInputs, ModelParameters, Parameters};
use crate::{DistanceMethod, EvaluationError, EvaluationModel, Result, METERS_PER_KM};
use road_network::OsrmConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A GeoJSON layer reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub path: PathBuf,
    /// Display name; defaults to the file stem
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    /// Variables to score; all numeric fields when absent
    #[serde(default)]
    pub variables: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModelConfig {
    Static {
        /// Service-area radius in kilometers
        buffer_km: f64,
        #[serde(default)]
        distance_method: DistanceMethod,
    },
    Mobile {
        /// Layer whose first feature is the shared coverage area
        coverage_area: LayerSpec,
    },
}

impl ModelConfig {
    pub fn model(&self) -> EvaluationModel {
        match self {
            ModelConfig::Static { .. } => EvaluationModel::Static,
            ModelConfig::Mobile { .. } => EvaluationModel::Mobile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub candidates: LayerSpec,
    pub infrastructure: Vec<LayerSpec>,
    #[serde(default)]
    pub infrastructure_weights: String,
    #[serde(default)]
    pub census: Option<CensusSpec>,
    #[serde(default)]
    pub census_weights: String,
    #[serde(default)]
    pub critical_zones: Vec<LayerSpec>,
    #[serde(default)]
    pub critical_zone_scores: String,
    #[serde(default)]
    pub routing: OsrmConfig,
    #[serde(default)]
    pub range_scope: RangeScope,
    /// Segments approximating each buffer circle
    #[serde(default)]
    pub buffer_segments: Option<usize>,
}

impl RunConfig {
    /// Parse a config file and resolve its relative paths
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading run configuration from {:?}", path);

        let text = fs::read_to_string(path)?;
        let mut config: RunConfig = serde_json::from_str(&text)
            .map_err(|e| EvaluationError::Config(format!("{}: {}", path.display(), e)))?;

        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    /// Prefix every relative layer path with `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        resolve(&mut self.candidates.path);
        self.infrastructure.iter_mut().for_each(|l| resolve(&mut l.path));
        self.critical_zones.iter_mut().for_each(|l| resolve(&mut l.path));
        if let Some(census) = &mut self.census {
            resolve(&mut census.path);
        }
        if let ModelConfig::Mobile { coverage_area } = &mut self.model {
            resolve(&mut coverage_area.path);
        }
    }

    /// Load every referenced layer into evaluation inputs
    pub fn load_inputs(&self) -> Result<EvaluationInputs> {
        let candidates = load_required_layer(
            &self.candidates.path,
            self.candidates.name.as_deref(),
            "Candidates",
        )?;

        let infrastructure = self
            .infrastructure
            .iter()
            .map(|spec| load_layer(&spec.path, spec.name.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        let census = match &self.census {
            Some(spec) => Some(CensusInput {
                layer: load_layer(&spec.path, spec.name.as_deref())?,
                variables: spec.variables.clone(),
            }),
            None => None,
        };

        let zones = self
            .critical_zones
            .iter()
            .map(|spec| load_layer(&spec.path, spec.name.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        let model = match &self.model {
            ModelConfig::Static {
                buffer_km,
                distance_method,
            } => ModelParameters::Static {
                buffer_m: buffer_km * METERS_PER_KM,
                distance_method: *distance_method,
            },
            ModelConfig::Mobile { coverage_area } => {
                let layer = load_layer(&coverage_area.path, coverage_area.name.as_deref())?;
                ModelParameters::Mobile {
                    coverage_area: layer.first_geometry().cloned(),
                }
            }
        };

        Ok(EvaluationInputs {
            candidates,
            infrastructure,
            census,
            zones,
            parameters: Parameters {
                model,
                infrastructure_weights: self.infrastructure_weights.clone(),
                census_weights: self.census_weights.clone(),
                zone_scores: self.critical_zone_scores.clone(),
                range_scope: self.range_scope,
            },
        })
    }
}
