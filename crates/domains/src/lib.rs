//! rusty-pothole/crates/domains/src/lib.rs
//!
//! The central domain types and port definitions for the pothole engine.

pub mod error;
pub mod geo;
pub mod media;
pub mod models;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn test_pothole_expiry_boundary() {
        let now = Utc::now();
        let pothole = Pothole {
            id: Uuid::now_v7(),
            latitude: 10.7266,
            longitude: -61.2770,
            expiry_date: now,
            created_at: now - Duration::days(60),
        };
        assert!(pothole.is_expired(now));
        assert!(!pothole.is_expired(now - Duration::seconds(1)));
        assert_eq!(pothole.coordinate(), Coordinate::new(10.7266, -61.2770));
    }

    #[test]
    fn test_vote_tally_net() {
        let tally = VoteTally { upvotes: 2, downvotes: 7 };
        assert_eq!(tally.net(), -5);
    }
}
