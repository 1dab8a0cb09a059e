//! # ReportIngestionPipeline
//!
//! validate → snap → match-or-create → attach report → attach images →
//! refresh expiry.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use domains::error::{AppError, Result};
use domains::geo::{validate_coordinate, BoundingBox};
use domains::models::{Coordinate, NewReport, Pothole, Report};
use domains::traits::{ImageStore, PotholeRepo, ReportRepo, StreetSnapper, UserRepo};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::access::require_active_user;
use crate::attachments::{upload_images, AttachmentSummary};
use crate::cascade::CascadeDeleter;
use crate::lifecycle::LifecycleManager;
use crate::matcher::GeoMatcher;

pub const MIN_DESCRIPTION_CHARS: usize = 5;
pub const DRIVER_MODE_DESCRIPTION: &str = "Pothole submitted via Driver Mode.";

/// A report with a description and optional images.
#[derive(Debug, Clone, Default)]
pub struct StandardSubmission {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
    pub images: Vec<Bytes>,
}

/// A coordinates-only report sent while driving.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverSubmission {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestionOutcome {
    Created {
        pothole_id: Uuid,
        report_id: Uuid,
        new_pothole: bool,
        expiry_date: DateTime<Utc>,
        images: AttachmentSummary,
    },
    /// The user already reported this pothole; only its expiry moved.
    ExpiryReset {
        pothole_id: Uuid,
        expiry_date: DateTime<Utc>,
    },
}

#[derive(Clone)]
pub struct ReportIngestionPipeline {
    users: Arc<dyn UserRepo>,
    potholes: Arc<dyn PotholeRepo>,
    reports: Arc<dyn ReportRepo>,
    image_store: Arc<dyn ImageStore>,
    /// `None` when snapping is switched off; raw coordinates are used then.
    snapper: Option<Arc<dyn StreetSnapper>>,
    cascade: CascadeDeleter,
    lifecycle: LifecycleManager,
    matcher: GeoMatcher,
    bounding_box: BoundingBox,
}

impl ReportIngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepo>,
        potholes: Arc<dyn PotholeRepo>,
        reports: Arc<dyn ReportRepo>,
        image_store: Arc<dyn ImageStore>,
        snapper: Option<Arc<dyn StreetSnapper>>,
        cascade: CascadeDeleter,
        lifecycle: LifecycleManager,
        matcher: GeoMatcher,
        bounding_box: BoundingBox,
    ) -> Self {
        Self {
            users,
            potholes,
            reports,
            image_store,
            snapper,
            cascade,
            lifecycle,
            matcher,
            bounding_box,
        }
    }

    #[instrument(skip(self, submission), fields(images = submission.images.len()))]
    pub async fn report_standard(
        &self,
        user_id: Uuid,
        submission: StandardSubmission,
    ) -> Result<IngestionOutcome> {
        require_active_user(self.users.as_ref(), user_id).await?;
        let point = self.validate_location(submission.latitude, submission.longitude)?;

        let description = submission
            .description
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| AppError::ValidationError("Invalid report details submitted!".into()))?;
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            return Err(AppError::ValidationError(
                "Invalid description entered!".into(),
            ));
        }

        self.ingest(user_id, point, description.to_string(), submission.images)
            .await
    }

    #[instrument(skip(self, submission))]
    pub async fn report_driver(
        &self,
        user_id: Uuid,
        submission: DriverSubmission,
    ) -> Result<IngestionOutcome> {
        require_active_user(self.users.as_ref(), user_id).await?;
        let point = self.validate_location(submission.latitude, submission.longitude)?;
        self.ingest(user_id, point, DRIVER_MODE_DESCRIPTION.to_string(), Vec::new())
            .await
    }

    fn validate_location(&self, latitude: Option<f64>, longitude: Option<f64>) -> Result<Coordinate> {
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Err(AppError::ValidationError(
                "Invalid report details submitted!".into(),
            ));
        };
        let point = Coordinate::new(latitude, longitude);
        validate_coordinate(point)?;
        if !self.bounding_box.contains(point) {
            return Err(AppError::ValidationError(
                "The coordinates are outside the supported service area!".into(),
            ));
        }
        Ok(point)
    }

    async fn snap(&self, point: Coordinate) -> Result<Coordinate> {
        let Some(snapper) = &self.snapper else {
            return Ok(point);
        };
        let snapped = snapper.snap(point).await.map_err(|err| {
            warn!(error = %err, "street snapping failed");
            AppError::downstream(err.context("location service unavailable"))
        })?;
        validate_coordinate(snapped).map_err(|_| {
            AppError::Downstream("location service returned malformed coordinates".into())
        })?;
        Ok(snapped)
    }

    async fn ingest(
        &self,
        user_id: Uuid,
        raw: Coordinate,
        description: String,
        images: Vec<Bytes>,
    ) -> Result<IngestionOutcome> {
        let point = self.snap(raw).await?;

        let candidates = self
            .potholes
            .list_potholes()
            .await
            .map_err(AppError::persistence)?;
        let matched = self
            .matcher
            .find_match(point, &candidates)?
            .map(|m| m.pothole.id);

        let now = self.lifecycle.now();
        let (pothole_id, new_pothole, pothole_expiry) = match matched {
            Some(pothole_id) => {
                let existing = self
                    .reports
                    .find_by_user_and_pothole(user_id, pothole_id)
                    .await
                    .map_err(AppError::persistence)?;
                if existing.is_some() {
                    let expiry_date = self.lifecycle.on_activity(pothole_id).await?;
                    info!(%user_id, %pothole_id, "resubmission converted into expiry reset");
                    return Ok(IngestionOutcome::ExpiryReset {
                        pothole_id,
                        expiry_date,
                    });
                }
                (pothole_id, None, self.lifecycle.refreshed_expiry(now))
            }
            None => {
                let expiry_date = self.lifecycle.initial_expiry(now);
                let pothole = Pothole {
                    id: Uuid::now_v7(),
                    latitude: point.latitude,
                    longitude: point.longitude,
                    expiry_date,
                    created_at: now,
                };
                (pothole.id, Some(pothole), expiry_date)
            }
        };

        let report = Report {
            id: Uuid::now_v7(),
            pothole_id,
            user_id,
            description,
            created_at: now,
        };

        // Blobs go up before the transaction; they are removed again if it fails.
        let (image_rows, summary) =
            upload_images(self.image_store.as_ref(), report.id, images).await;

        let new_report = NewReport {
            new_pothole,
            report,
            images: image_rows,
            pothole_expiry,
        };
        if let Err(err) = self.reports.commit_report(&new_report).await {
            let urls: Vec<String> = new_report.images.iter().map(|i| i.image_url.clone()).collect();
            self.cascade.remove_blobs(&urls).await;
            return Err(AppError::persistence(err));
        }

        let created = new_report.new_pothole.is_some();
        info!(
            %user_id,
            %pothole_id,
            report_id = %new_report.report.id,
            new_pothole = created,
            images_attached = summary.attached.len(),
            images_failed = summary.failures.len(),
            "report ingested"
        );

        Ok(IngestionOutcome::Created {
            pothole_id,
            report_id: new_report.report.id,
            new_pothole: created,
            expiry_date: pothole_expiry,
            images: summary,
        })
    }
}
