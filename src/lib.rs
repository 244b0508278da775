use std::path::Path;

pub mod error;
pub mod loader;
pub mod point_set;
pub mod projection;
pub mod resampler;

pub use error::{GridError, Result};
pub use loader::PointSamples;
pub use point_set::{distance, GeoPointSet, EARTH_RADIUS_M};
pub use projection::{project, zone_for_longitude, Hemisphere, UtmProjection, UtmZone};
pub use resampler::{
    Aggregation, CancelFlag, GridResampler, ProjectedGrid, ResampleOptions, DEFAULT_NODATA,
};

pub enum InputFormat {
    GeoJSON,
}

pub fn process_file(path: &Path, format: InputFormat, value_property: &str) -> Result<GeoPointSet> {
    let samples = match format {
        InputFormat::GeoJSON => loader::load_points(path, value_property)?,
    };
    GeoPointSet::new(samples.latitudes, samples.longitudes, samples.values)
}

/// Build a point set and mean-aggregate it onto a grid in one call.
///
/// `resolution` in meters; `None` uses the point set's estimate.
pub fn grid_points(
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    values: Vec<f64>,
    resolution: Option<f64>,
) -> Result<ProjectedGrid> {
    let points = GeoPointSet::new(latitudes, longitudes, values)?;
    points.resample(resolution.unwrap_or_else(|| points.estimated_resolution()))
}
