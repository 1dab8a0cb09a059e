//! Owner-side management of an existing report: description edits and the
//! images attached to it.

use std::sync::Arc;

use bytes::Bytes;
use domains::error::{AppError, Result};
use domains::models::Report;
use domains::traits::{ImageRepo, ImageStore, ReportRepo, UserRepo};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::access::require_active_user;
use crate::attachments::{upload_images, AttachmentSummary};
use crate::cascade::{BlobFailure, CascadeDeleter};
use crate::ingestion::MIN_DESCRIPTION_CHARS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRemoval {
    pub image_id: Uuid,
    /// Set when the row went but the blob could not be deleted.
    pub blob_failure: Option<BlobFailure>,
}

#[derive(Clone)]
pub struct ReportManagement {
    users: Arc<dyn UserRepo>,
    reports: Arc<dyn ReportRepo>,
    images: Arc<dyn ImageRepo>,
    image_store: Arc<dyn ImageStore>,
    cascade: CascadeDeleter,
}

impl ReportManagement {
    pub fn new(
        users: Arc<dyn UserRepo>,
        reports: Arc<dyn ReportRepo>,
        images: Arc<dyn ImageRepo>,
        image_store: Arc<dyn ImageStore>,
        cascade: CascadeDeleter,
    ) -> Self {
        Self {
            users,
            reports,
            images,
            image_store,
            cascade,
        }
    }

    /// Loads a report owned by `user_id` under `pothole_id`. Anything else is
    /// reported as missing so ownership is not disclosed.
    async fn owned_report(&self, user_id: Uuid, pothole_id: Uuid, report_id: Uuid) -> Result<Report> {
        require_active_user(self.users.as_ref(), user_id).await?;
        self.reports
            .get_report(report_id)
            .await
            .map_err(AppError::persistence)?
            .filter(|r| r.pothole_id == pothole_id && r.user_id == user_id)
            .ok_or_else(|| AppError::not_found("Report", report_id))
    }

    #[instrument(skip(self, description))]
    pub async fn update_description(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
        report_id: Uuid,
        description: &str,
    ) -> Result<Report> {
        let description = description.trim();
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            return Err(AppError::ValidationError(
                "Invalid description entered!".into(),
            ));
        }
        let mut report = self.owned_report(user_id, pothole_id, report_id).await?;

        let updated = self
            .reports
            .update_description(report_id, description)
            .await
            .map_err(AppError::persistence)?;
        if !updated {
            return Err(AppError::not_found("Report", report_id));
        }
        report.description = description.to_string();
        info!(%report_id, "report description updated");
        Ok(report)
    }

    /// Uploads and links each image on its own; one bad image never sinks the
    /// others.
    #[instrument(skip(self, images), fields(images = images.len()))]
    pub async fn add_images(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
        report_id: Uuid,
        images: Vec<Bytes>,
    ) -> Result<AttachmentSummary> {
        if images.is_empty() {
            return Err(AppError::ValidationError("No images submitted!".into()));
        }
        self.owned_report(user_id, pothole_id, report_id).await?;

        let (uploaded, mut summary) =
            upload_images(self.image_store.as_ref(), report_id, images).await;

        // Map row ids back to their submitted position for failure reporting.
        let positions: Vec<usize> = (0..summary.total)
            .filter(|i| !summary.failures.iter().any(|f| f.index == *i))
            .collect();
        summary.attached.clear();

        for (row, index) in uploaded.into_iter().zip(positions) {
            match self.images.add_image(&row).await {
                Ok(()) => summary.attached.push(row.id),
                Err(err) => {
                    warn!(%report_id, index, error = %err, "unable to link uploaded image");
                    self.cascade.remove_blobs(&[row.image_url]).await;
                    summary.fail(index, "The image could not be saved.");
                }
            }
        }
        summary.failures.sort_by_key(|f| f.index);

        info!(
            %report_id,
            attached = summary.attached.len(),
            failed = summary.failures.len(),
            "images added to report"
        );
        Ok(summary)
    }

    #[instrument(skip(self))]
    pub async fn delete_image(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
        report_id: Uuid,
        image_id: Uuid,
    ) -> Result<ImageRemoval> {
        self.owned_report(user_id, pothole_id, report_id).await?;

        let image = self
            .images
            .get_image(image_id)
            .await
            .map_err(AppError::persistence)?
            .filter(|i| i.report_id == report_id)
            .ok_or_else(|| AppError::not_found("Image", image_id))?;

        let removed = self
            .images
            .delete_image(image_id)
            .await
            .map_err(AppError::persistence)?;
        if !removed {
            return Err(AppError::not_found("Image", image_id));
        }

        let blob_failure = self
            .cascade
            .remove_blobs(&[image.image_url])
            .await
            .into_iter()
            .next();
        Ok(ImageRemoval {
            image_id,
            blob_failure,
        })
    }
}
