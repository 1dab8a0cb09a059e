//! # GeoMatcher
//!
//! Maps an incoming coordinate onto the closest existing pothole.

use domains::error::{AppError, Result};
use domains::geo::{haversine_m, validate_coordinate};
use domains::models::{Coordinate, Pothole};

/// A candidate that lies within the clustering threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct PotholeMatch<'a> {
    pub pothole: &'a Pothole,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GeoMatcher {
    threshold_m: f64,
}

impl GeoMatcher {
    pub fn new(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    /// Returns the candidate with the smallest distance strictly below the
    /// threshold. On equal distances the earliest candidate wins.
    ///
    /// A malformed query point is a validation error; a malformed stored
    /// candidate is an internal error. Neither is reported as "no match".
    pub fn find_match<'a>(
        &self,
        point: Coordinate,
        candidates: &'a [Pothole],
    ) -> Result<Option<PotholeMatch<'a>>> {
        validate_coordinate(point)?;

        let mut best: Option<PotholeMatch<'a>> = None;
        for pothole in candidates {
            validate_coordinate(pothole.coordinate()).map_err(|_| {
                AppError::Internal(format!(
                    "pothole {} has malformed coordinates ({}, {})",
                    pothole.id, pothole.latitude, pothole.longitude
                ))
            })?;

            let distance_m = haversine_m(pothole.coordinate(), point);
            if distance_m >= self.threshold_m {
                continue;
            }
            if best.as_ref().map_or(true, |b| distance_m < b.distance_m) {
                best = Some(PotholeMatch { pothole, distance_m });
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn pothole(latitude: f64, longitude: f64) -> Pothole {
        Pothole {
            id: Uuid::now_v7(),
            latitude,
            longitude,
            expiry_date: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn picks_the_closest_candidate_within_threshold() {
        let far = pothole(10.7400, -61.2900);
        let near = pothole(10.72658, -61.27698);
        let nearer = pothole(10.72659, -61.27699);
        let candidates = vec![far, near, nearer.clone()];

        let found = GeoMatcher::new(15.0)
            .find_match(Coordinate::new(10.7266, -61.2770), &candidates)
            .unwrap()
            .expect("expected a match");
        assert_eq!(found.pothole.id, nearer.id);
        assert!(found.distance_m < 15.0);
    }

    #[test]
    fn distance_equal_to_threshold_is_not_a_match() {
        let p = pothole(10.7266, -61.2770);
        let query = Coordinate::new(10.7267, -61.2770);
        let exact = haversine_m(p.coordinate(), query);

        let at_threshold = GeoMatcher::new(exact).find_match(query, std::slice::from_ref(&p));
        assert!(at_threshold.unwrap().is_none());

        let above = GeoMatcher::new(exact + 0.01).find_match(query, std::slice::from_ref(&p));
        assert!(above.unwrap().is_some());
    }

    #[test]
    fn ties_go_to_the_first_candidate() {
        let first = pothole(10.7266, -61.2770);
        let mut second = first.clone();
        second.id = Uuid::now_v7();
        let candidates = vec![first.clone(), second];

        let found = GeoMatcher::new(15.0)
            .find_match(Coordinate::new(10.7266, -61.2770), &candidates)
            .unwrap()
            .unwrap();
        assert_eq!(found.pothole.id, first.id);
    }

    #[test]
    fn no_candidates_is_none() {
        let found = GeoMatcher::new(15.0).find_match(Coordinate::new(10.7, -61.3), &[]);
        assert!(found.unwrap().is_none());
    }

    #[test]
    fn malformed_input_is_an_error_not_a_miss() {
        let matcher = GeoMatcher::new(15.0);
        let query = matcher.find_match(Coordinate::new(f64::NAN, -61.3), &[]);
        assert!(matches!(query, Err(AppError::ValidationError(_))));

        let broken = vec![pothole(f64::INFINITY, -61.3)];
        let stored = matcher.find_match(Coordinate::new(10.7, -61.3), &broken);
        assert!(matches!(stored, Err(AppError::Internal(_))));
    }
}
