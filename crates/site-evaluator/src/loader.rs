//! Layer loading from GeoJSON files

use crate::features::{Feature, FieldValue, Layer};
use crate::{EvaluationError, Result};
use geojson::GeoJson;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Layer name derived from the file stem
pub fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layer".to_string())
}

/// Load a GeoJSON layer; `name` defaults to the file stem
pub fn load_layer(path: impl AsRef<Path>, name: Option<&str>) -> Result<Layer> {
    let path = path.as_ref();
    info!("Loading layer from {:?}", path);

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let geojson = GeoJson::from_reader(reader)?;

    let name = name.map(str::to_string).unwrap_or_else(|| layer_name(path));
    layer_from_geojson(name, geojson)
}

/// Convert parsed GeoJSON into a layer.
///
/// Features whose geometry cannot be converted keep their attributes and
/// have no geometry.
pub fn layer_from_geojson(name: impl Into<String>, geojson: GeoJson) -> Result<Layer> {
    let name = name.into();
    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            geometry: Some(geometry),
            ..Default::default()
        }],
    };

    let mut layer = Vec::with_capacity(features.len());
    let mut without_geometry = 0;

    for (i, raw) in features.into_iter().enumerate() {
        let geometry = match raw.geometry {
            Some(g) => match geo::Geometry::<f64>::try_from(g) {
                Ok(g) => Some(g),
                Err(e) => {
                    warn!("{} feature {}: unusable geometry: {}", name, i, e);
                    None
                }
            },
            None => None,
        };
        if geometry.is_none() {
            without_geometry += 1;
        }

        let mut feature = Feature::new(i as u64, geometry);
        if let Some(properties) = raw.properties {
            for (key, value) in properties {
                feature.set_field(key, FieldValue::from_json(&value));
            }
        }
        layer.push(feature);
    }

    info!(
        "Loaded {} features into '{}' ({} without geometry)",
        layer.len(),
        name,
        without_geometry
    );

    Ok(Layer::new(name, layer))
}

/// Load a layer that must contain at least one feature
pub fn load_required_layer(
    path: impl AsRef<Path>,
    name: Option<&str>,
    role: &str,
) -> Result<Layer> {
    let layer = load_layer(path, name)?;
    if layer.is_empty() {
        return Err(EvaluationError::MissingRequiredLayer(format!(
            "{} layer '{}' has no features",
            role, layer.name
        )));
    }
    Ok(layer)
}
