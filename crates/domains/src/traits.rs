//! # Core Traits (Ports)
//!
//! Every adapter must implement these traits to be wired into the engine.
//! Repositories are split per entity; composite writes that must be atomic
//! (a report with its images, a cascade) are single methods so the adapter can
//! wrap them in one transaction.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Coordinate, DeleteGuard, DeletedPotholeRows, DeletedReportRows, NewReport, Pothole, Report,
    ReportedImage, RowDeletion, User, UserReportVote, VoteTally,
};

/// Persistence contract for potholes.
#[async_trait]
pub trait PotholeRepo: Send + Sync {
    async fn get_pothole(&self, id: Uuid) -> anyhow::Result<Option<Pothole>>;
    async fn list_potholes(&self) -> anyhow::Result<Vec<Pothole>>;
    /// Potholes on which `user_id` has at least one report.
    async fn list_potholes_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Pothole>>;
    async fn list_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Pothole>>;
    /// Returns `false` when the pothole no longer exists.
    async fn set_expiry(&self, id: Uuid, expiry: DateTime<Utc>) -> anyhow::Result<bool>;
    /// Removes the pothole and every report, image and vote row under it in
    /// one transaction, after re-checking `guard`. Returns the image URLs of
    /// the removed rows so blob cleanup can follow.
    async fn delete_pothole(
        &self,
        id: Uuid,
        guard: DeleteGuard,
    ) -> anyhow::Result<RowDeletion<DeletedPotholeRows>>;
}

/// Persistence contract for reports.
#[async_trait]
pub trait ReportRepo: Send + Sync {
    /// Atomically inserts the (optional) new pothole, the report, its image
    /// rows, and stamps the pothole's expiry.
    async fn commit_report(&self, new_report: &NewReport) -> anyhow::Result<()>;
    async fn get_report(&self, id: Uuid) -> anyhow::Result<Option<Report>>;
    async fn find_by_user_and_pothole(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
    ) -> anyhow::Result<Option<Report>>;
    async fn list_reports_for_pothole(&self, pothole_id: Uuid) -> anyhow::Result<Vec<Report>>;
    async fn list_reports_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Report>>;
    async fn update_description(&self, id: Uuid, description: &str) -> anyhow::Result<bool>;
    /// Removes the report with its image and vote rows in one transaction.
    async fn delete_report(&self, id: Uuid) -> anyhow::Result<RowDeletion<DeletedReportRows>>;
}

/// Persistence contract for report images.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    async fn add_image(&self, image: &ReportedImage) -> anyhow::Result<()>;
    async fn get_image(&self, id: Uuid) -> anyhow::Result<Option<ReportedImage>>;
    async fn list_images_for_report(&self, report_id: Uuid) -> anyhow::Result<Vec<ReportedImage>>;
    async fn list_images_for_pothole(&self, pothole_id: Uuid) -> anyhow::Result<Vec<ReportedImage>>;
    async fn delete_image(&self, id: Uuid) -> anyhow::Result<bool>;
}

/// Persistence contract for report votes.
#[async_trait]
pub trait VoteRepo: Send + Sync {
    async fn find_vote(&self, user_id: Uuid, report_id: Uuid)
        -> anyhow::Result<Option<UserReportVote>>;
    async fn create_vote(&self, vote: &UserReportVote) -> anyhow::Result<()>;
    async fn set_polarity(&self, id: Uuid, upvote: bool) -> anyhow::Result<bool>;
    async fn delete_vote(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn tally(&self, report_id: Uuid) -> anyhow::Result<VoteTally>;
    /// `polarity` filters to up (`Some(true)`) or down (`Some(false)`) votes.
    async fn list_votes_for_report(
        &self,
        report_id: Uuid,
        polarity: Option<bool>,
    ) -> anyhow::Result<Vec<UserReportVote>>;
}

/// Identity and moderation flags for users.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn upsert_user(&self, user: &User) -> anyhow::Result<()>;
    async fn set_banned(&self, id: Uuid, banned: bool) -> anyhow::Result<bool>;
}

/// Blob storage contract for report images.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Sniffs, normalises and uploads an image, returning its public URL.
    /// Non-image payloads are rejected before anything is written.
    async fn put(&self, data: Bytes) -> anyhow::Result<String>;
    /// Deletes the object behind `image_url`. Callers treat failure as
    /// best-effort.
    async fn delete(&self, image_url: &str) -> anyhow::Result<()>;
    fn is_probably_image(&self, data: &[u8]) -> bool;
}

/// Snaps raw GPS coordinates onto the nearest routable road.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StreetSnapper: Send + Sync {
    async fn snap(&self, point: Coordinate) -> anyhow::Result<Coordinate>;
}

/// Time source, injected so expiry logic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
