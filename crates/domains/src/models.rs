//! # Domain Models
//!
//! These structs represent the core entities of the pothole engine.
//! We use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// The aggregate for one physical pothole. Reports from nearby locations
/// cluster onto a single Pothole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pothole {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    /// The pothole is swept once this instant has passed
    pub expiry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Pothole {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now
    }
}

/// One user's submission against a Pothole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub pothole_id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// An image attached to a Report. `image_url` references an object in the
/// blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedImage {
    pub id: Uuid,
    pub report_id: Uuid,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReportVote {
    pub id: Uuid,
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub upvote: bool,
}

/// The identity slice the engine cares about. Credentials live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub banned: bool,
    pub moderator: bool,
}

/// Up/down counts for a Report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteTally {
    pub const fn net(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

/// Rows to commit atomically for a freshly ingested Report.
///
/// `new_pothole` is set when ingestion found no match and the pothole must be
/// created in the same transaction as its first report.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub new_pothole: Option<Pothole>,
    pub report: Report,
    pub images: Vec<ReportedImage>,
    /// Expiry to stamp on the target pothole once the rows are in.
    pub pothole_expiry: DateTime<Utc>,
}

/// Which check the store must repeat inside the delete transaction before it
/// removes a pothole row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteGuard {
    Unconditional,
    /// Only delete if `expiry_date <= now` still holds.
    ExpiredAt(DateTime<Utc>),
    /// Only delete if the pothole has no reports left.
    Orphaned,
}

/// What the store reports back after removing rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDeletion<T> {
    Deleted(T),
    NotFound,
    /// The guard no longer held when re-checked inside the transaction.
    Skipped,
}

/// Rows removed along with a Report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedReportRows {
    pub pothole_id: Uuid,
    pub image_urls: Vec<String>,
    pub remaining_reports: i64,
}

/// Rows removed along with a Pothole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedPotholeRows {
    pub report_count: usize,
    pub image_urls: Vec<String>,
}
