//! Error types for point gridding.

use thiserror::Error;

/// Errors raised while building a point set or resampling it onto a grid.
#[derive(Error, Debug)]
pub enum GridError {
    /// Latitude, longitude and value inputs have different lengths.
    #[error("input lengths differ: {latitudes} latitudes, {longitudes} longitudes, {values} values")]
    ShapeMismatch {
        latitudes: usize,
        longitudes: usize,
        values: usize,
    },

    /// No samples, or a bounding box with zero extent.
    #[error("degenerate input: {reason}")]
    DegenerateInput { reason: String },

    /// A coordinate is non-finite or outside the geographic range.
    #[error("invalid coordinate at index {index}: lat={lat}, lon={lon}")]
    InvalidCoordinate { index: usize, lat: f64, lon: f64 },

    /// A sample value is NaN or infinite.
    #[error("non-finite value at index {index}: {value}")]
    NonFiniteValue { index: usize, value: f64 },

    /// The projection is undefined or unreliable at this coordinate.
    #[error("cannot project lat={lat}, lon={lon}: {reason}")]
    ProjectionDomain { lat: f64, lon: f64, reason: String },

    /// Resolution must be a positive finite number of meters.
    #[error("invalid resolution {0}: must be a positive number of meters")]
    InvalidResolution(f64),

    /// Resampling options are inconsistent.
    #[error("invalid resample options: {0}")]
    InvalidOptions(String),

    /// The requested resolution would allocate an unreasonably large grid.
    #[error("grid of {rows}x{cols} cells exceeds the limit of {limit} cells")]
    GridTooLarge { rows: usize, cols: usize, limit: usize },

    /// Resampling was cancelled between batches.
    #[error("resampling cancelled during {stage} after {processed} of {total}")]
    Cancelled {
        stage: &'static str,
        processed: usize,
        total: usize,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("geojson error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A GeoJSON feature could not be read as a point sample.
    #[error("feature {index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
}

impl GridError {
    /// Create a DegenerateInput error.
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateInput {
            reason: reason.into(),
        }
    }

    /// Create a ProjectionDomain error.
    pub fn projection_domain(lat: f64, lon: f64, reason: impl Into<String>) -> Self {
        Self::ProjectionDomain {
            lat,
            lon,
            reason: reason.into(),
        }
    }

    /// Create an InvalidFeature error.
    pub fn invalid_feature(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidFeature {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type for gridding operations.
pub type Result<T> = std::result::Result<T, GridError>;
