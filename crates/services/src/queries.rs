//! Read-side lookups. No caller checks: everything here is public data.

use std::sync::Arc;

use domains::error::{AppError, Result};
use domains::models::{Pothole, Report, ReportedImage, UserReportVote};
use domains::traits::{ImageRepo, PotholeRepo, ReportRepo, VoteRepo};
use uuid::Uuid;

#[derive(Clone)]
pub struct Queries {
    potholes: Arc<dyn PotholeRepo>,
    reports: Arc<dyn ReportRepo>,
    images: Arc<dyn ImageRepo>,
    votes: Arc<dyn VoteRepo>,
}

impl Queries {
    pub fn new(
        potholes: Arc<dyn PotholeRepo>,
        reports: Arc<dyn ReportRepo>,
        images: Arc<dyn ImageRepo>,
        votes: Arc<dyn VoteRepo>,
    ) -> Self {
        Self {
            potholes,
            reports,
            images,
            votes,
        }
    }

    pub async fn potholes(&self) -> Result<Vec<Pothole>> {
        self.potholes.list_potholes().await.map_err(AppError::persistence)
    }

    pub async fn pothole(&self, id: Uuid) -> Result<Pothole> {
        self.potholes
            .get_pothole(id)
            .await
            .map_err(AppError::persistence)?
            .ok_or_else(|| AppError::not_found("Pothole", id))
    }

    pub async fn potholes_for_user(&self, user_id: Uuid) -> Result<Vec<Pothole>> {
        self.potholes
            .list_potholes_for_user(user_id)
            .await
            .map_err(AppError::persistence)
    }

    /// Fails with `NotFound` for an unknown pothole rather than returning an
    /// empty list.
    pub async fn reports_for_pothole(&self, pothole_id: Uuid) -> Result<Vec<Report>> {
        self.pothole(pothole_id).await?;
        self.reports
            .list_reports_for_pothole(pothole_id)
            .await
            .map_err(AppError::persistence)
    }

    pub async fn report(&self, pothole_id: Uuid, report_id: Uuid) -> Result<Report> {
        self.reports
            .get_report(report_id)
            .await
            .map_err(AppError::persistence)?
            .filter(|r| r.pothole_id == pothole_id)
            .ok_or_else(|| AppError::not_found("Report", report_id))
    }

    pub async fn reports_for_user(&self, user_id: Uuid) -> Result<Vec<Report>> {
        self.reports
            .list_reports_for_user(user_id)
            .await
            .map_err(AppError::persistence)
    }

    pub async fn images_for_report(
        &self,
        pothole_id: Uuid,
        report_id: Uuid,
    ) -> Result<Vec<ReportedImage>> {
        self.report(pothole_id, report_id).await?;
        self.images
            .list_images_for_report(report_id)
            .await
            .map_err(AppError::persistence)
    }

    pub async fn image(
        &self,
        pothole_id: Uuid,
        report_id: Uuid,
        image_id: Uuid,
    ) -> Result<ReportedImage> {
        self.report(pothole_id, report_id).await?;
        self.images
            .get_image(image_id)
            .await
            .map_err(AppError::persistence)?
            .filter(|i| i.report_id == report_id)
            .ok_or_else(|| AppError::not_found("Image", image_id))
    }

    /// `polarity` narrows to upvotes (`Some(true)`) or downvotes.
    pub async fn votes_for_report(
        &self,
        pothole_id: Uuid,
        report_id: Uuid,
        polarity: Option<bool>,
    ) -> Result<Vec<UserReportVote>> {
        self.report(pothole_id, report_id).await?;
        self.votes
            .list_votes_for_report(report_id, polarity)
            .await
            .map_err(AppError::persistence)
    }
}
