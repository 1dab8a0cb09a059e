//! # LifecycleManager
//!
//! Owns pothole expiry: the initial lifetime, refreshes on new activity, and
//! the periodic sweep that removes potholes nobody has reported recently.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domains::error::{AppError, Result};
use domains::models::DeleteGuard;
use domains::traits::{Clock, PotholeRepo};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cascade::{CascadeDeleter, Deletion};

/// One pothole the sweep could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    /// `None` when the scan itself failed.
    pub pothole_id: Option<Uuid>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub scanned: usize,
    pub deleted: usize,
    /// Refreshed or removed by a concurrent request between scan and delete.
    pub skipped: usize,
    pub blob_failures: usize,
    pub failures: Vec<SweepFailure>,
}

#[derive(Clone)]
pub struct LifecycleManager {
    potholes: Arc<dyn PotholeRepo>,
    cascade: CascadeDeleter,
    clock: Arc<dyn Clock>,
    primary_ttl: Duration,
    refresh_ttl: Duration,
}

impl LifecycleManager {
    pub fn new(
        potholes: Arc<dyn PotholeRepo>,
        cascade: CascadeDeleter,
        clock: Arc<dyn Clock>,
        primary_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            potholes,
            cascade,
            clock,
            primary_ttl,
            refresh_ttl,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Expiry for a pothole created at `now`.
    pub fn initial_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.primary_ttl
    }

    /// Expiry after new activity at `now`.
    pub fn refreshed_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.refresh_ttl
    }

    /// Pushes the pothole's expiry to `now + refresh TTL`.
    #[instrument(skip(self))]
    pub async fn on_activity(&self, pothole_id: Uuid) -> Result<DateTime<Utc>> {
        let expiry = self.refreshed_expiry(self.clock.now());
        let updated = self
            .potholes
            .set_expiry(pothole_id, expiry)
            .await
            .map_err(AppError::persistence)?;
        if !updated {
            return Err(AppError::not_found("Pothole", pothole_id));
        }
        info!(%pothole_id, %expiry, "pothole expiry refreshed");
        Ok(expiry)
    }

    /// Deletes every pothole whose expiry is at or before `now`.
    ///
    /// Never fails: each pothole is handled in isolation and problems are
    /// logged and reported in the summary. The expiry is re-checked inside the
    /// delete transaction, so a pothole refreshed after the scan survives.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let expired = match self.potholes.list_expired(now).await {
            Ok(expired) => expired,
            Err(err) => {
                warn!(error = %err, "unable to scan for expired potholes");
                summary.failures.push(SweepFailure {
                    pothole_id: None,
                    reason: format!("{err:#}"),
                });
                return summary;
            }
        };
        summary.scanned = expired.len();

        for pothole in expired {
            match self
                .cascade
                .delete_pothole_guarded(pothole.id, DeleteGuard::ExpiredAt(now))
                .await
            {
                Ok(Deletion::Deleted(cascade)) => {
                    summary.deleted += 1;
                    summary.blob_failures += cascade.blob_failures.len();
                }
                Ok(Deletion::NotFound | Deletion::Retained) => summary.skipped += 1,
                Err(err) => {
                    warn!(pothole_id = %pothole.id, error = %err, "unable to delete expired pothole");
                    summary.failures.push(SweepFailure {
                        pothole_id: Some(pothole.id),
                        reason: err.to_string(),
                    });
                }
            }
        }

        if summary.scanned > 0 {
            info!(
                scanned = summary.scanned,
                deleted = summary.deleted,
                skipped = summary.skipped,
                failed = summary.failures.len(),
                "expiry sweep finished"
            );
        }
        summary
    }

    /// Sweeps against the injected clock.
    pub async fn sweep_now(&self) -> SweepSummary {
        self.sweep(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::models::{NewReport, Pothole, Report, ReportedImage};
    use domains::testing::{FixedClock, InMemoryStore};
    use domains::traits::{MockImageStore, ReportRepo};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn seed(store: &InMemoryStore, expiry: DateTime<Utc>, with_image: bool) -> Uuid {
        let pothole = Pothole {
            id: Uuid::now_v7(),
            latitude: 10.7,
            longitude: -61.3,
            expiry_date: expiry,
            created_at: t0(),
        };
        let report_id = Uuid::now_v7();
        let images = if with_image {
            vec![ReportedImage {
                id: Uuid::now_v7(),
                report_id,
                image_url: format!("http://blobs/o/images%2F{report_id}.jpg"),
            }]
        } else {
            Vec::new()
        };
        store
            .commit_report(&NewReport {
                new_pothole: Some(pothole.clone()),
                report: Report {
                    id: report_id,
                    pothole_id: pothole.id,
                    user_id: Uuid::now_v7(),
                    description: "Large crater".to_string(),
                    created_at: t0(),
                },
                images,
                pothole_expiry: expiry,
            })
            .await
            .unwrap();
        pothole.id
    }

    fn manager(store: Arc<InMemoryStore>, blobs: MockImageStore) -> LifecycleManager {
        let cascade = CascadeDeleter::new(store.clone(), store.clone(), Arc::new(blobs));
        LifecycleManager::new(
            store,
            cascade,
            Arc::new(FixedClock::new(t0())),
            Duration::days(60),
            Duration::days(30),
        )
    }

    #[test]
    fn expiry_arithmetic() {
        let lifecycle = manager(Arc::new(InMemoryStore::new()), MockImageStore::new());
        assert_eq!(lifecycle.initial_expiry(t0()), t0() + Duration::days(60));
        assert_eq!(lifecycle.refreshed_expiry(t0()), t0() + Duration::days(30));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_potholes() {
        let store = Arc::new(InMemoryStore::new());
        let expired = seed(&store, t0() - Duration::days(1), true).await;
        let live = seed(&store, t0() + Duration::days(1), true).await;

        let mut blobs = MockImageStore::new();
        blobs.expect_delete().times(1).returning(|_| Ok(()));
        let lifecycle = manager(store.clone(), blobs);

        let summary = lifecycle.sweep(t0()).await;
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.deleted, 1);
        assert!(summary.failures.is_empty());

        assert!(store.get_pothole(expired).await.unwrap().is_none());
        assert!(store.get_pothole(live).await.unwrap().is_some());
        let counts = store.counts();
        assert_eq!((counts.reports, counts.images), (1, 1));
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, t0() - Duration::days(1), false).await;
        let lifecycle = manager(store.clone(), MockImageStore::new());

        assert_eq!(lifecycle.sweep(t0()).await.deleted, 1);
        assert_eq!(lifecycle.sweep(t0()).await, SweepSummary::default());
    }

    #[tokio::test]
    async fn expiry_exactly_now_is_swept() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, t0(), false).await;
        let lifecycle = manager(store.clone(), MockImageStore::new());
        assert_eq!(lifecycle.sweep(t0()).await.deleted, 1);
    }

    #[tokio::test]
    async fn blob_failures_do_not_stop_the_sweep() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, t0() - Duration::days(2), true).await;
        seed(&store, t0() - Duration::days(1), true).await;

        let mut blobs = MockImageStore::new();
        blobs
            .expect_delete()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("storage offline")));
        let lifecycle = manager(store.clone(), blobs);

        let summary = lifecycle.sweep(t0()).await;
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.blob_failures, 2);
        assert_eq!(store.counts().potholes, 0);
    }

    #[tokio::test]
    async fn store_failures_are_isolated_and_reported() {
        let store = Arc::new(InMemoryStore::new());
        let a = seed(&store, t0() - Duration::days(2), false).await;
        let b = seed(&store, t0() - Duration::days(1), false).await;
        store.set_fail_writes(true);
        let lifecycle = manager(store.clone(), MockImageStore::new());

        let summary = lifecycle.sweep(t0()).await;
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.deleted, 0);
        let failed: Vec<_> = summary.failures.iter().filter_map(|f| f.pothole_id).collect();
        assert_eq!(failed, vec![a, b]);
    }

    #[tokio::test]
    async fn on_activity_refreshes_and_reports_missing_potholes() {
        let store = Arc::new(InMemoryStore::new());
        let id = seed(&store, t0() + Duration::days(2), false).await;
        let lifecycle = manager(store.clone(), MockImageStore::new());

        let expiry = lifecycle.on_activity(id).await.unwrap();
        assert_eq!(expiry, t0() + Duration::days(30));
        assert_eq!(store.get_pothole(id).await.unwrap().unwrap().expiry_date, expiry);

        let missing = lifecycle.on_activity(Uuid::now_v7()).await;
        assert!(matches!(missing, Err(AppError::NotFound(..))));
    }
}
