//! # CascadeDeleter
//!
//! Removes a report or a whole pothole together with everything hanging off
//! it. Row deletion is authoritative and transactional inside the store; blob
//! deletion follows, per image, and never blocks or undoes the row deletion.

use std::sync::Arc;

use domains::error::{AppError, Result};
use domains::models::{DeleteGuard, RowDeletion};
use domains::traits::{ImageStore, PotholeRepo, ReportRepo};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a cascade that tolerates already-deleted targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Deletion<T> {
    Deleted(T),
    NotFound,
    /// The target was still in use when re-checked, so it was kept.
    Retained,
}

impl<T> Deletion<T> {
    pub fn deleted(self) -> Option<T> {
        match self {
            Self::Deleted(v) => Some(v),
            _ => None,
        }
    }
}

/// A blob that could not be removed. The row referencing it is gone already.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobFailure {
    pub image_url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PotholeCascade {
    pub pothole_id: Uuid,
    pub reports_removed: usize,
    pub images_removed: usize,
    pub blob_failures: Vec<BlobFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportCascade {
    pub report_id: Uuid,
    pub pothole_id: Uuid,
    pub images_removed: usize,
    /// Set when this was the pothole's last report and the pothole went too.
    pub pothole_removed: bool,
    pub blob_failures: Vec<BlobFailure>,
}

#[derive(Clone)]
pub struct CascadeDeleter {
    potholes: Arc<dyn PotholeRepo>,
    reports: Arc<dyn ReportRepo>,
    image_store: Arc<dyn ImageStore>,
}

impl CascadeDeleter {
    pub fn new(
        potholes: Arc<dyn PotholeRepo>,
        reports: Arc<dyn ReportRepo>,
        image_store: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            potholes,
            reports,
            image_store,
        }
    }

    /// Deletes one report, its images and votes. If the pothole is left with
    /// no reports, the pothole is deleted as well.
    #[instrument(skip(self))]
    pub async fn delete_report(&self, report_id: Uuid) -> Result<Deletion<ReportCascade>> {
        let rows = match self
            .reports
            .delete_report(report_id)
            .await
            .map_err(AppError::persistence)?
        {
            RowDeletion::Deleted(rows) => rows,
            RowDeletion::NotFound | RowDeletion::Skipped => return Ok(Deletion::NotFound),
        };

        let mut blob_failures = self.remove_blobs(&rows.image_urls).await;
        let mut pothole_removed = false;

        if rows.remaining_reports == 0 {
            // Re-checked in the store so a report attached meanwhile keeps it alive.
            match self
                .delete_pothole_guarded(rows.pothole_id, DeleteGuard::Orphaned)
                .await?
            {
                Deletion::Deleted(cascade) => {
                    pothole_removed = true;
                    blob_failures.extend(cascade.blob_failures);
                }
                Deletion::NotFound | Deletion::Retained => {}
            }
        }

        info!(
            %report_id,
            pothole_id = %rows.pothole_id,
            images = rows.image_urls.len(),
            pothole_removed,
            blob_failures = blob_failures.len(),
            "report deleted"
        );

        Ok(Deletion::Deleted(ReportCascade {
            report_id,
            pothole_id: rows.pothole_id,
            images_removed: rows.image_urls.len(),
            pothole_removed,
            blob_failures,
        }))
    }

    /// Deletes a pothole with all of its reports, images and votes.
    pub async fn delete_pothole(&self, pothole_id: Uuid) -> Result<Deletion<PotholeCascade>> {
        self.delete_pothole_guarded(pothole_id, DeleteGuard::Unconditional)
            .await
    }

    #[instrument(skip(self))]
    pub(crate) async fn delete_pothole_guarded(
        &self,
        pothole_id: Uuid,
        guard: DeleteGuard,
    ) -> Result<Deletion<PotholeCascade>> {
        let rows = match self
            .potholes
            .delete_pothole(pothole_id, guard)
            .await
            .map_err(AppError::persistence)?
        {
            RowDeletion::Deleted(rows) => rows,
            RowDeletion::NotFound => return Ok(Deletion::NotFound),
            RowDeletion::Skipped => return Ok(Deletion::Retained),
        };

        let blob_failures = self.remove_blobs(&rows.image_urls).await;

        info!(
            %pothole_id,
            reports = rows.report_count,
            images = rows.image_urls.len(),
            blob_failures = blob_failures.len(),
            "pothole deleted"
        );

        Ok(Deletion::Deleted(PotholeCascade {
            pothole_id,
            reports_removed: rows.report_count,
            images_removed: rows.image_urls.len(),
            blob_failures,
        }))
    }

    /// Best-effort: every URL is attempted, failures are collected.
    pub(crate) async fn remove_blobs(&self, image_urls: &[String]) -> Vec<BlobFailure> {
        let mut failures = Vec::new();
        for image_url in image_urls {
            if let Err(err) = self.image_store.delete(image_url).await {
                warn!(%image_url, error = %err, "unable to delete image from storage");
                failures.push(BlobFailure {
                    image_url: image_url.clone(),
                    reason: format!("{err:#}"),
                });
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domains::models::{NewReport, Pothole, Report, ReportedImage, UserReportVote};
    use domains::testing::{InMemoryStore, StoreCounts};
    use domains::traits::{MockImageStore, VoteRepo};

    fn pothole() -> Pothole {
        Pothole {
            id: Uuid::now_v7(),
            latitude: 10.7266,
            longitude: -61.2770,
            expiry_date: Utc::now() + Duration::days(60),
            created_at: Utc::now(),
        }
    }

    async fn seed_report(
        store: &InMemoryStore,
        pothole: &Pothole,
        create_pothole: bool,
        image_count: usize,
    ) -> Uuid {
        let report = Report {
            id: Uuid::now_v7(),
            pothole_id: pothole.id,
            user_id: Uuid::now_v7(),
            description: "Deep pothole near the junction".to_string(),
            created_at: Utc::now(),
        };
        let images = (0..image_count)
            .map(|i| ReportedImage {
                id: Uuid::now_v7(),
                report_id: report.id,
                image_url: format!("http://blobs/o/images%2F{}-{i}.jpg", report.id),
            })
            .collect();
        store
            .commit_report(&NewReport {
                new_pothole: create_pothole.then(|| pothole.clone()),
                report: report.clone(),
                images,
                pothole_expiry: pothole.expiry_date,
            })
            .await
            .unwrap();
        store
            .create_vote(&UserReportVote {
                id: Uuid::now_v7(),
                report_id: report.id,
                user_id: Uuid::now_v7(),
                upvote: true,
            })
            .await
            .unwrap();
        report.id
    }

    fn deleter(store: Arc<InMemoryStore>, blobs: MockImageStore) -> CascadeDeleter {
        CascadeDeleter::new(store.clone(), store, Arc::new(blobs))
    }

    #[tokio::test]
    async fn deleting_pothole_removes_all_rows_even_when_blob_deletes_fail() {
        let store = Arc::new(InMemoryStore::new());
        let p = pothole();
        seed_report(&store, &p, true, 2).await;
        seed_report(&store, &p, false, 1).await;

        let mut blobs = MockImageStore::new();
        blobs
            .expect_delete()
            .times(3)
            .returning(|url| {
                if url.ends_with("-0.jpg") {
                    Err(anyhow::anyhow!("bucket unreachable"))
                } else {
                    Ok(())
                }
            });

        let outcome = deleter(store.clone(), blobs)
            .delete_pothole(p.id)
            .await
            .unwrap()
            .deleted()
            .expect("pothole should be deleted");

        assert_eq!(outcome.reports_removed, 2);
        assert_eq!(outcome.images_removed, 3);
        assert_eq!(outcome.blob_failures.len(), 2);
        assert_eq!(store.counts(), StoreCounts::default());
    }

    #[tokio::test]
    async fn deleting_last_report_removes_the_pothole() {
        let store = Arc::new(InMemoryStore::new());
        let p = pothole();
        let report_id = seed_report(&store, &p, true, 1).await;

        let mut blobs = MockImageStore::new();
        blobs.expect_delete().times(1).returning(|_| Ok(()));

        let outcome = deleter(store.clone(), blobs)
            .delete_report(report_id)
            .await
            .unwrap()
            .deleted()
            .unwrap();

        assert!(outcome.pothole_removed);
        assert!(outcome.blob_failures.is_empty());
        assert_eq!(store.counts().potholes, 0);
    }

    #[tokio::test]
    async fn deleting_one_of_several_reports_keeps_the_pothole() {
        let store = Arc::new(InMemoryStore::new());
        let p = pothole();
        let first = seed_report(&store, &p, true, 0).await;
        seed_report(&store, &p, false, 0).await;

        let outcome = deleter(store.clone(), MockImageStore::new())
            .delete_report(first)
            .await
            .unwrap()
            .deleted()
            .unwrap();

        assert!(!outcome.pothole_removed);
        let counts = store.counts();
        assert_eq!(counts.potholes, 1);
        assert_eq!(counts.reports, 1);
        assert_eq!(counts.votes, 1);
    }

    #[tokio::test]
    async fn already_deleted_targets_are_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let cascade = deleter(store, MockImageStore::new());

        assert_eq!(
            cascade.delete_report(Uuid::now_v7()).await.unwrap(),
            Deletion::NotFound
        );
        assert_eq!(
            cascade.delete_pothole(Uuid::now_v7()).await.unwrap(),
            Deletion::NotFound
        );
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_persistence_error() {
        let store = Arc::new(InMemoryStore::new());
        let p = pothole();
        let report_id = seed_report(&store, &p, true, 1).await;
        store.set_fail_writes(true);

        let err = deleter(store.clone(), MockImageStore::new())
            .delete_report(report_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(store.counts().images, 1);
    }
}
