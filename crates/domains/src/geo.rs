//! Great-circle geometry for clustering reports.

use crate::error::{AppError, Result};
use crate::models::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Rejects non-finite or out-of-range coordinates.
pub fn validate_coordinate(point: Coordinate) -> Result<()> {
    let Coordinate { latitude, longitude } = point;
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(AppError::ValidationError(
            "coordinates must be finite numbers".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::ValidationError(format!(
            "latitude {latitude} must be within [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::ValidationError(format!(
            "longitude {longitude} must be within [-180, 180]"
        )));
    }
    Ok(())
}

/// Haversine distance between two points, in meters.
///
/// Callers validate both points first; NaN in means NaN out.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (dlng / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Axis-aligned service area. Bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Trinidad and Tobago.
    pub const TRINIDAD_AND_TOBAGO: Self = Self {
        min_latitude: 10.028088,
        max_latitude: 11.370345,
        min_longitude: -61.965556,
        max_longitude: -60.469077,
    };

    pub fn contains(&self, point: Coordinate) -> bool {
        self.min_latitude < point.latitude
            && point.latitude < self.max_latitude
            && self.min_longitude < point.longitude
            && point.longitude < self.max_longitude
    }

    pub fn is_well_formed(&self) -> bool {
        [self.min_latitude, self.max_latitude, self.min_longitude, self.max_longitude]
            .iter()
            .all(|v| v.is_finite())
            && self.min_latitude < self.max_latitude
            && self.min_longitude < self.max_longitude
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::TRINIDAD_AND_TOBAGO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_zero_for_same_point() {
        let p = Coordinate::new(10.7266, -61.2770);
        assert!(haversine_m(p, p).abs() < 1e-9);
    }

    #[test]
    fn haversine_nearby_points_are_a_few_meters_apart() {
        let a = Coordinate::new(10.7266, -61.2770);
        let b = Coordinate::new(10.72658, -61.27698);
        let d = haversine_m(a, b);
        assert!(d > 2.0 && d < 4.0, "got {d}");
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_m(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn rejects_malformed_coordinates() {
        assert!(validate_coordinate(Coordinate::new(f64::NAN, 0.0)).is_err());
        assert!(validate_coordinate(Coordinate::new(0.0, f64::INFINITY)).is_err());
        assert!(validate_coordinate(Coordinate::new(91.0, 0.0)).is_err());
        assert!(validate_coordinate(Coordinate::new(0.0, -181.0)).is_err());
        assert!(validate_coordinate(Coordinate::new(10.7, -61.3)).is_ok());
    }

    #[test]
    fn bounding_box_bounds_are_exclusive() {
        let bbox = BoundingBox::TRINIDAD_AND_TOBAGO;
        assert!(bbox.contains(Coordinate::new(10.7266, -61.2770)));
        assert!(!bbox.contains(Coordinate::new(10.028088, -61.2770)));
        assert!(!bbox.contains(Coordinate::new(10.7266, -60.469077)));
        assert!(!bbox.contains(Coordinate::new(51.5, -0.12)));
    }
}
