//! Scattered geographic samples and their derived geometry.
//!
//! A [`GeoPointSet`] owns parallel latitude/longitude/value arrays and
//! computes everything the resampler needs exactly once: the geographic
//! bounding box and its centre, the projected zone, the projected samples
//! and their envelope, and a default resolution estimated from sample
//! density.

use geo::algorithm::bounding_rect::BoundingRect;
use geo::{coord, Coord, MultiPoint, Point, Rect};
use tracing::info;

use crate::error::{GridError, Result};
use crate::projection::{UtmProjection, UtmZone};
use crate::resampler::{GridResampler, ProjectedGrid, ResampleOptions};

/// Mean earth radius of the haversine sphere model, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points given in degrees.
pub fn distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let phi_a = lat_a.to_radians();
    let phi_b = lat_b.to_radians();
    let d_phi = (lat_b - lat_a).to_radians();
    let d_lambda = (lon_b - lon_a).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Immutable set of point samples in degrees with derived grid metadata.
#[derive(Debug, Clone)]
pub struct GeoPointSet {
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    values: Vec<f64>,
    // Geographic bounding box, x = longitude, y = latitude
    bounds: Rect<f64>,
    zone: UtmZone,
    // Samples projected into `zone`, same order as the inputs
    projected: Vec<Coord<f64>>,
    projected_bounds: Rect<f64>,
    estimated_resolution: f64,
}

impl GeoPointSet {
    /// Build a point set from three equal-length sequences.
    ///
    /// Latitudes and longitudes are in degrees. Fails if the lengths
    /// differ, if there are no samples, if all latitudes or all longitudes
    /// are identical, or if any coordinate cannot be projected.
    pub fn new<La, Lo, V>(latitudes: La, longitudes: Lo, values: V) -> Result<Self>
    where
        La: IntoIterator<Item = f64>,
        Lo: IntoIterator<Item = f64>,
        V: IntoIterator<Item = f64>,
    {
        let latitudes: Vec<f64> = latitudes.into_iter().collect();
        let longitudes: Vec<f64> = longitudes.into_iter().collect();
        let values: Vec<f64> = values.into_iter().collect();

        if latitudes.len() != longitudes.len() || latitudes.len() != values.len() {
            return Err(GridError::ShapeMismatch {
                latitudes: latitudes.len(),
                longitudes: longitudes.len(),
                values: values.len(),
            });
        }
        if latitudes.is_empty() {
            return Err(GridError::degenerate("no samples"));
        }

        for (index, ((&lat, &lon), &value)) in latitudes
            .iter()
            .zip(longitudes.iter())
            .zip(values.iter())
            .enumerate()
        {
            let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
            let lon_ok = lon.is_finite() && (-180.0..=180.0).contains(&lon);
            if !lat_ok || !lon_ok {
                return Err(GridError::InvalidCoordinate { index, lat, lon });
            }
            if !value.is_finite() {
                return Err(GridError::NonFiniteValue { index, value });
            }
        }

        let bounds = envelope(
            longitudes
                .iter()
                .zip(latitudes.iter())
                .map(|(&x, &y)| coord! { x: x, y: y }),
        )?;
        if bounds.height() == 0.0 {
            return Err(GridError::degenerate(format!(
                "all {} latitudes equal {}",
                latitudes.len(),
                bounds.min().y
            )));
        }
        if bounds.width() == 0.0 {
            return Err(GridError::degenerate(format!(
                "all {} longitudes equal {}",
                longitudes.len(),
                bounds.min().x
            )));
        }

        let center = bounds.center();
        let zone = UtmZone::containing(center.y, center.x);
        let projection = UtmProjection::new(zone)?;
        let projected = latitudes
            .iter()
            .zip(longitudes.iter())
            .map(|(&lat, &lon)| projection.forward(lat, lon))
            .collect::<Result<Vec<_>>>()?;
        let projected_bounds = envelope(projected.iter().copied())?;

        let (min_lat, min_lon) = (bounds.min().y, bounds.min().x);
        let (max_lat, max_lon) = (bounds.max().y, bounds.max().x);
        let width = distance(min_lat, min_lon, min_lat, max_lon);
        let height = distance(min_lat, min_lon, max_lat, min_lon);
        let estimated_resolution = ((width * height) / values.len() as f64).sqrt();
        if !(estimated_resolution.is_finite() && estimated_resolution > 0.0) {
            return Err(GridError::degenerate(format!(
                "bounding box spans {:.3} m x {:.3} m, cannot estimate a resolution",
                width, height
            )));
        }

        info!(
            samples = values.len(),
            zone = %zone,
            estimated_resolution_m = estimated_resolution,
            "Built point set"
        );

        Ok(Self {
            latitudes,
            longitudes,
            values,
            bounds,
            zone,
            projected,
            projected_bounds,
            estimated_resolution,
        })
    }

    /// Build a point set from row-major 2D inputs.
    ///
    /// All three inputs are flattened row by row, so a sample keeps its
    /// position across the three arrays regardless of how rows are split.
    pub fn from_rows<R>(latitudes: &[R], longitudes: &[R], values: &[R]) -> Result<Self>
    where
        R: AsRef<[f64]>,
    {
        let flatten = |rows: &[R]| -> Vec<f64> {
            rows.iter().flat_map(|row| row.as_ref().iter().copied()).collect()
        };
        Self::new(flatten(latitudes), flatten(longitudes), flatten(values))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn min_lat(&self) -> f64 {
        self.bounds.min().y
    }

    pub fn max_lat(&self) -> f64 {
        self.bounds.max().y
    }

    pub fn min_lon(&self) -> f64 {
        self.bounds.min().x
    }

    pub fn max_lon(&self) -> f64 {
        self.bounds.max().x
    }

    pub fn mid_lat(&self) -> f64 {
        (self.min_lat() + self.max_lat()) / 2.0
    }

    pub fn mid_lon(&self) -> f64 {
        (self.min_lon() + self.max_lon()) / 2.0
    }

    /// Geographic bounding box with longitude on x and latitude on y.
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    pub fn projected(&self) -> &[Coord<f64>] {
        &self.projected
    }

    pub fn projected_bounds(&self) -> Rect<f64> {
        self.projected_bounds
    }

    pub fn min_projected(&self) -> Coord<f64> {
        self.projected_bounds.min()
    }

    pub fn max_projected(&self) -> Coord<f64> {
        self.projected_bounds.max()
    }

    /// Edge length in meters of a square cell holding one sample on average.
    pub fn estimated_resolution(&self) -> f64 {
        self.estimated_resolution
    }

    /// Mean-aggregate the samples onto a grid at `resolution` meters.
    pub fn resample(&self, resolution: f64) -> Result<ProjectedGrid> {
        GridResampler::new(self, ResampleOptions::default()).resample(resolution)
    }

    /// Resample at the estimated resolution.
    pub fn resample_estimated(&self) -> Result<ProjectedGrid> {
        self.resample(self.estimated_resolution)
    }
}

fn envelope(coords: impl Iterator<Item = Coord<f64>>) -> Result<Rect<f64>> {
    let points: MultiPoint<f64> = coords.map(Point::from).collect();
    points
        .bounding_rect()
        .ok_or_else(|| GridError::degenerate("no samples"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Hemisphere;

    fn sample_set() -> GeoPointSet {
        GeoPointSet::new(
            vec![10.0, 12.0, 11.0, 10.5],
            vec![20.0, 22.0, 21.5, 20.5],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap()
    }

    #[test]
    fn test_distance_same_point_is_zero() {
        assert_eq!(distance(45.0, 7.0, 45.0, 7.0), 0.0);
        assert_eq!(distance(-33.9, 151.2, -33.9, 151.2), 0.0);
    }

    #[test]
    fn test_distance_one_degree_at_equator() {
        let d = distance(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() / 111_195.0 < 0.01, "d = {}", d);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let ab = distance(51.5, -0.12, 48.85, 2.35);
        let ba = distance(48.85, 2.35, 51.5, -0.12);
        assert!((ab - ba).abs() < 1e-6);
        // London to Paris is about 343 km
        assert!((ab - 343_500.0).abs() < 5_000.0, "ab = {}", ab);
    }

    #[test]
    fn test_distance_antipodal() {
        let d = distance(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn test_bounds_and_midpoint() {
        let set = sample_set();
        assert_eq!(set.min_lat(), 10.0);
        assert_eq!(set.max_lat(), 12.0);
        assert_eq!(set.min_lon(), 20.0);
        assert_eq!(set.max_lon(), 22.0);
        assert_eq!(set.mid_lat(), 11.0);
        assert_eq!(set.mid_lon(), 21.0);
    }

    #[test]
    fn test_zone_from_true_midpoint() {
        // max - min / 2 would give 22 - 10 = 12 -> zone 32; the midpoint 21 is zone 34
        let set = sample_set();
        assert_eq!(set.zone().number, 34);
        assert_eq!(set.zone().hemisphere, Hemisphere::North);
    }

    #[test]
    fn test_southern_hemisphere() {
        let set = GeoPointSet::new(vec![-30.0, -20.0], vec![140.0, 150.0], vec![0.0, 1.0]).unwrap();
        assert_eq!(set.zone().hemisphere, Hemisphere::South);
        assert_eq!(set.zone().number, 55);
    }

    #[test]
    fn test_estimated_resolution() {
        let set = sample_set();
        let width = distance(10.0, 20.0, 10.0, 22.0);
        let height = distance(10.0, 20.0, 12.0, 20.0);
        let expected = (width * height / 4.0).sqrt();
        assert!((set.estimated_resolution() - expected).abs() < 1e-6);
        assert!(set.estimated_resolution() > 100_000.0);
    }

    #[test]
    fn test_projected_bounds_contain_all_samples() {
        let set = sample_set();
        let bounds = set.projected_bounds();
        for c in set.projected() {
            assert!(c.x >= bounds.min().x && c.x <= bounds.max().x);
            assert!(c.y >= bounds.min().y && c.y <= bounds.max().y);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let err = GeoPointSet::new(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0], vec![1.0, 2.0]).unwrap_err();
        match err {
            GridError::ShapeMismatch {
                latitudes,
                longitudes,
                values,
            } => {
                assert_eq!((latitudes, longitudes, values), (3, 3, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let err = GeoPointSet::new(Vec::new(), Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, GridError::DegenerateInput { .. }));
    }

    #[test]
    fn test_zero_extent_latitude() {
        let err = GeoPointSet::new(vec![5.0, 5.0], vec![1.0, 2.0], vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, GridError::DegenerateInput { .. }));
        assert!(err.to_string().contains("latitudes"));
    }

    #[test]
    fn test_zero_extent_longitude() {
        let err = GeoPointSet::new(vec![5.0, 6.0], vec![1.0, 1.0], vec![0.0, 0.0]).unwrap_err();
        assert!(err.to_string().contains("longitudes"));
    }

    #[test]
    fn test_invalid_coordinate() {
        let err = GeoPointSet::new(vec![5.0, 95.0], vec![1.0, 2.0], vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, GridError::InvalidCoordinate { index: 1, .. }));
    }

    #[test]
    fn test_non_finite_value() {
        let err = GeoPointSet::new(vec![5.0, 6.0], vec![1.0, 2.0], vec![0.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, GridError::NonFiniteValue { index: 1, .. }));
    }

    #[test]
    fn test_polar_input_fails_projection() {
        let err = GeoPointSet::new(vec![80.0, 89.0], vec![0.0, 2.0], vec![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, GridError::ProjectionDomain { .. }));
    }

    #[test]
    fn test_wide_longitude_span_is_rejected() {
        // Midpoint 50°E picks zone 39; 0°E is 51° from its central meridian
        let err = GeoPointSet::new(vec![0.0, 10.0, 5.0], vec![0.0, 100.0, 50.0], vec![1.0, 2.0, 3.0])
            .unwrap_err();
        assert!(matches!(err, GridError::ProjectionDomain { .. }));
    }

    #[test]
    fn test_from_rows_preserves_alignment() {
        let lat = [vec![1.0, 2.0], vec![3.0, 4.0]];
        let lon = [vec![10.0, 11.0], vec![12.0, 13.0]];
        let val = [vec![0.1, 0.2], vec![0.3, 0.4]];
        let set = GeoPointSet::from_rows(&lat, &lon, &val).unwrap();
        assert_eq!(set.latitudes(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(set.longitudes(), &[10.0, 11.0, 12.0, 13.0]);
        assert_eq!(set.values(), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_from_rows_flattened_length_mismatch() {
        let lat = [vec![1.0, 2.0, 3.0]];
        let lon = [vec![10.0], vec![11.0, 12.0]];
        let val = [vec![0.1, 0.2]];
        let err = GeoPointSet::from_rows(&lat, &lon, &val).unwrap_err();
        assert!(matches!(err, GridError::ShapeMismatch { values: 2, .. }));
    }
}
