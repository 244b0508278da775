//! UTM-style zoning and the WGS84 to UTM forward projection.
//!
//! A point set picks one zone from the centre of its bounding box and
//! projects every sample into that zone, including samples that would
//! nominally fall into a neighbouring zone.

use std::fmt;

use geo::{coord, Coord};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::Serialize;

use crate::error::{GridError, Result};

const WGS84_LONLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Latitudes beyond this are too close to the poles for a reliable result.
pub const MAX_PROJECTABLE_LATITUDE: f64 = 85.0;
/// Samples farther than this from the zone's central meridian are refused.
pub const MAX_MERIDIAN_OFFSET: f64 = 30.0;

pub const ZONE_WIDTH_DEGREES: f64 = 6.0;
pub const ZONE_COUNT: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    // The equator counts as North
    pub fn from_latitude(lat: f64) -> Self {
        if lat < 0.0 {
            Hemisphere::South
        } else {
            Hemisphere::North
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
        }
    }
}

/// Zone index for a longitude in degrees: `floor((lon + 180) / 6) + 1`,
/// clamped to 1..=60 so that 180° stays in the last zone.
pub fn zone_for_longitude(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / ZONE_WIDTH_DEGREES).floor() + 1.0;
    zone.clamp(1.0, ZONE_COUNT as f64) as u8
}

/// A projected zone: longitudinal band number plus hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UtmZone {
    pub number: u8,
    pub hemisphere: Hemisphere,
}

impl UtmZone {
    pub fn new(number: u8, hemisphere: Hemisphere) -> Result<Self> {
        if number == 0 || number > ZONE_COUNT {
            return Err(GridError::InvalidOptions(format!(
                "zone {} outside 1..={}",
                number, ZONE_COUNT
            )));
        }
        Ok(Self { number, hemisphere })
    }

    pub fn containing(lat: f64, lon: f64) -> Self {
        Self {
            number: zone_for_longitude(lon),
            hemisphere: Hemisphere::from_latitude(lat),
        }
    }

    /// Central meridian of the zone in degrees.
    pub fn central_meridian(&self) -> f64 {
        (self.number as f64 - 1.0) * ZONE_WIDTH_DEGREES - 180.0 + ZONE_WIDTH_DEGREES / 2.0
    }

    /// EPSG code of the WGS84 / UTM zone (326zz north, 327zz south).
    pub fn epsg(&self) -> u32 {
        let base = match self.hemisphere {
            Hemisphere::North => 32600,
            Hemisphere::South => 32700,
        };
        base + self.number as u32
    }

    pub fn proj_string(&self) -> String {
        match self.hemisphere {
            Hemisphere::North => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", self.number),
            Hemisphere::South => {
                format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs", self.number)
            }
        }
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.hemisphere.letter())
    }
}

/// Forward projection from WGS84 lon/lat into one UTM zone.
pub struct UtmProjection {
    zone: UtmZone,
    source: Proj,
    target: Proj,
}

impl fmt::Debug for UtmProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtmProjection")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl UtmProjection {
    pub fn new(zone: UtmZone) -> Result<Self> {
        let source = Proj::from_proj_string(WGS84_LONLAT).map_err(|e| {
            GridError::InvalidOptions(format!("failed to create WGS84 projection: {:?}", e))
        })?;
        let target = Proj::from_proj_string(&zone.proj_string()).map_err(|e| {
            GridError::InvalidOptions(format!("failed to create projection for zone {}: {:?}", zone, e))
        })?;
        Ok(Self { zone, source, target })
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    /// Project a latitude/longitude in degrees to easting/northing in meters.
    pub fn forward(&self, lat: f64, lon: f64) -> Result<Coord<f64>> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(GridError::projection_domain(lat, lon, "non-finite coordinate"));
        }
        if lat.abs() > MAX_PROJECTABLE_LATITUDE {
            return Err(GridError::projection_domain(
                lat,
                lon,
                format!("latitude beyond ±{}° is too close to a pole", MAX_PROJECTABLE_LATITUDE),
            ));
        }

        // Offset from the central meridian, wrapped into [-180, 180)
        let central = self.zone.central_meridian();
        let offset = (lon - central + 180.0).rem_euclid(360.0) - 180.0;
        if offset.abs() > MAX_MERIDIAN_OFFSET {
            return Err(GridError::projection_domain(
                lat,
                lon,
                format!("{:.3}° from the central meridian of zone {}", offset.abs(), self.zone),
            ));
        }

        let mut point = ((central + offset).to_radians(), lat.to_radians(), 0.0);
        transform(&self.source, &self.target, &mut point)
            .map_err(|e| GridError::projection_domain(lat, lon, format!("transform failed: {:?}", e)))?;

        if !point.0.is_finite() || !point.1.is_finite() {
            return Err(GridError::projection_domain(lat, lon, "projection produced a non-finite result"));
        }

        Ok(coord! { x: point.0, y: point.1 })
    }
}

/// Project one coordinate into the given zone.
pub fn project(lat: f64, lon: f64, zone: UtmZone) -> Result<Coord<f64>> {
    UtmProjection::new(zone)?.forward(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_for_longitude() {
        assert_eq!(zone_for_longitude(0.0), 31);
        assert_eq!(zone_for_longitude(-180.0), 1);
        assert_eq!(zone_for_longitude(179.9), 60);
        assert_eq!(zone_for_longitude(180.0), 60);
        assert_eq!(zone_for_longitude(-0.1), 30);
    }

    #[test]
    fn test_hemisphere_from_latitude() {
        assert_eq!(Hemisphere::from_latitude(-0.5), Hemisphere::South);
        assert_eq!(Hemisphere::from_latitude(0.0), Hemisphere::North);
        assert_eq!(Hemisphere::from_latitude(45.0), Hemisphere::North);
    }

    #[test]
    fn test_central_meridian_and_epsg() {
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        assert_eq!(zone.central_meridian(), 3.0);
        assert_eq!(zone.epsg(), 32631);
        assert_eq!(zone.to_string(), "31N");

        let zone = UtmZone::new(1, Hemisphere::South).unwrap();
        assert_eq!(zone.central_meridian(), -177.0);
        assert_eq!(zone.epsg(), 32701);
    }

    #[test]
    fn test_invalid_zone_number() {
        assert!(UtmZone::new(0, Hemisphere::North).is_err());
        assert!(UtmZone::new(61, Hemisphere::North).is_err());
    }

    #[test]
    fn test_central_meridian_on_equator() {
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        let p = project(0.0, 3.0, zone).unwrap();
        assert!((p.x - 500_000.0).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn test_known_utm_coordinate() {
        // 0°N 0°E in zone 31N is 166021.44 E, 0 N
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        let p = project(0.0, 0.0, zone).unwrap();
        assert!((p.x - 166_021.443).abs() < 0.01, "x = {}", p.x);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn test_southern_false_northing() {
        let zone = UtmZone::new(31, Hemisphere::South).unwrap();
        let p = project(-10.0, 3.0, zone).unwrap();
        assert!(p.y < 10_000_000.0);
        assert!(p.y > 8_800_000.0);
        assert!((p.x - 500_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_northing_increases_with_latitude() {
        let tm = UtmProjection::new(UtmZone::new(33, Hemisphere::North).unwrap()).unwrap();
        let low = tm.forward(40.0, 15.0).unwrap();
        let high = tm.forward(41.0, 15.0).unwrap();
        // One degree of latitude is roughly 111 km
        assert!((high.y - low.y - 111_000.0).abs() < 1_000.0);
    }

    #[test]
    fn test_pole_is_rejected() {
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        let err = project(89.9, 3.0, zone).unwrap_err();
        assert!(matches!(err, GridError::ProjectionDomain { .. }));
    }

    #[test]
    fn test_far_from_meridian_is_rejected() {
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        assert!(project(10.0, 100.0, zone).is_err());
        // Just past the limit on either side
        assert!(project(0.0, 33.5, zone).is_err());
        assert!(project(0.0, -27.5, zone).is_err());
        assert!(project(10.0, f64::NAN, zone).is_err());
    }

    #[test]
    fn test_offset_wraps_across_antimeridian() {
        let zone = UtmZone::new(60, Hemisphere::North).unwrap();
        let east = project(10.0, 179.0, zone).unwrap();
        let west = project(10.0, -179.0, zone).unwrap();
        assert!(west.x > east.x);
    }

    #[test]
    fn test_far_from_meridian_matches_reference() {
        // Reference eastings/northings from the 6th-order Krüger series
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        let p = project(0.0, 23.0, zone).unwrap();
        assert!((p.x - 2_772_454.379).abs() < 0.05, "x = {}", p.x);
        assert!(p.y.abs() < 1e-6);

        let p = project(45.0, 23.0, zone).unwrap();
        assert!((p.x - 2_075_750.235).abs() < 0.05, "x = {}", p.x);
        assert!((p.y - 5_181_473.169).abs() < 0.05, "y = {}", p.y);
    }

    #[test]
    fn test_meridian_offset_limit_is_accepted() {
        let zone = UtmZone::new(31, Hemisphere::South).unwrap();
        let p = project(-30.0, 33.0, zone).unwrap();
        assert!((p.x - 3_458_646.330).abs() < 0.05, "x = {}", p.x);
        assert!((p.y - 6_269_926.103).abs() < 0.05, "y = {}", p.y);
    }

    #[test]
    fn test_proj_string() {
        let zone = UtmZone::new(33, Hemisphere::South).unwrap();
        assert_eq!(zone.proj_string(), "+proj=utm +zone=33 +south +datum=WGS84 +units=m +no_defs");
    }
}
