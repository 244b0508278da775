use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use geojson::{GeoJson, Value as GeoJsonValue};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::{GridError, Result};

/// Parallel coordinate/value arrays read from a point file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSamples {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Vec<f64>,
}

impl PointSamples {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// Load point samples from a GeoJSON FeatureCollection file
pub fn load_points(file_path: &Path, value_property: &str) -> Result<PointSamples> {
    info!("Loading file: {}", file_path.display());
    let file = File::open(file_path)?;
    read_points(BufReader::new(file), value_property)
}

/// Read `Point` features carrying a numeric `value_property`.
///
/// Features without geometry or with non-point geometry are skipped with a
/// warning. A point feature whose property is missing or not numeric is an
/// error, since dropping it would silently change the grid.
pub fn read_points<R: Read>(reader: R, value_property: &str) -> Result<PointSamples> {
    let geojson = GeoJson::from_reader(reader)?;
    let GeoJson::FeatureCollection(fc) = geojson else {
        return Err(GridError::invalid_feature(0, "expected a FeatureCollection"));
    };

    let total_features = fc.features.len();
    debug!("Found {} features in file", total_features);

    let mut samples = PointSamples::default();
    let mut skipped = 0;
    for (index, feature) in fc.features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            skipped += 1;
            continue;
        };
        let GeoJsonValue::Point(position) = &geometry.value else {
            skipped += 1;
            continue;
        };
        if position.len() < 2 {
            return Err(GridError::invalid_feature(index, "point has fewer than two coordinates"));
        }

        let value = match feature.property(value_property) {
            Some(JsonValue::Number(n)) => n.as_f64(),
            _ => None,
        }
        .ok_or_else(|| {
            GridError::invalid_feature(index, format!("missing numeric property '{}'", value_property))
        })?;

        // GeoJSON positions are [lon, lat]
        samples.longitudes.push(position[0]);
        samples.latitudes.push(position[1]);
        samples.values.push(value);
    }

    if skipped > 0 {
        warn!("Skipped {} of {} features without point geometry", skipped, total_features);
    }
    info!("Loaded {} point samples", samples.len());

    Ok(samples)
}
