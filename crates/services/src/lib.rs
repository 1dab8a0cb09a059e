//! rusty-pothole/crates/services/src/lib.rs
//!
//! The pothole engine: ingestion, matching, moderation, lifecycle and cascade
//! deletion, written against the ports in `domains` only.

pub mod attachments;
pub mod cascade;
pub mod ingestion;
pub mod lifecycle;
pub mod matcher;
pub mod moderation;
pub mod queries;
pub mod reports;
pub mod settings;

mod access;

use std::sync::Arc;

use domains::error::{AppError, Result};
use domains::models::User;
use domains::traits::{
    Clock, ImageRepo, ImageStore, PotholeRepo, ReportRepo, StreetSnapper, UserRepo, VoteRepo,
};
use tracing::info;
use uuid::Uuid;

pub use attachments::{AttachmentStatus, AttachmentSummary, ImageFailure};
pub use cascade::{BlobFailure, CascadeDeleter, Deletion, PotholeCascade, ReportCascade};
pub use ingestion::{DriverSubmission, IngestionOutcome, ReportIngestionPipeline, StandardSubmission};
pub use lifecycle::{LifecycleManager, SweepFailure, SweepSummary};
pub use matcher::{GeoMatcher, PotholeMatch};
pub use moderation::{ModerationEngine, VoteOutcome};
pub use queries::Queries;
pub use reports::{ImageRemoval, ReportManagement};
pub use settings::EngineSettings;

/// Every adapter the engine needs. Repositories are usually one store
/// behind several trait objects.
#[derive(Clone)]
pub struct Ports {
    pub potholes: Arc<dyn PotholeRepo>,
    pub reports: Arc<dyn ReportRepo>,
    pub images: Arc<dyn ImageRepo>,
    pub votes: Arc<dyn VoteRepo>,
    pub users: Arc<dyn UserRepo>,
    pub image_store: Arc<dyn ImageStore>,
    /// `None` disables snapping.
    pub snapper: Option<Arc<dyn StreetSnapper>>,
    pub clock: Arc<dyn Clock>,
}

impl Ports {
    /// Uses one value for all five repository ports.
    pub fn from_store<S>(
        store: Arc<S>,
        image_store: Arc<dyn ImageStore>,
        snapper: Option<Arc<dyn StreetSnapper>>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: PotholeRepo + ReportRepo + ImageRepo + VoteRepo + UserRepo + 'static,
    {
        Self {
            potholes: store.clone(),
            reports: store.clone(),
            images: store.clone(),
            votes: store.clone(),
            users: store,
            image_store,
            snapper,
            clock,
        }
    }
}

/// The wired engine, cheap to clone into request handlers.
#[derive(Clone)]
pub struct Engine {
    pub ingestion: ReportIngestionPipeline,
    pub moderation: ModerationEngine,
    pub lifecycle: LifecycleManager,
    pub cascade: CascadeDeleter,
    pub reports: ReportManagement,
    pub queries: Queries,
    users: Arc<dyn UserRepo>,
}

impl Engine {
    pub fn new(ports: Ports, settings: &EngineSettings) -> Self {
        let cascade = CascadeDeleter::new(
            ports.potholes.clone(),
            ports.reports.clone(),
            ports.image_store.clone(),
        );
        let lifecycle = LifecycleManager::new(
            ports.potholes.clone(),
            cascade.clone(),
            ports.clock.clone(),
            settings.primary_ttl(),
            settings.refresh_ttl(),
        );
        let ingestion = ReportIngestionPipeline::new(
            ports.users.clone(),
            ports.potholes.clone(),
            ports.reports.clone(),
            ports.image_store.clone(),
            ports.snapper.clone(),
            cascade.clone(),
            lifecycle.clone(),
            GeoMatcher::new(settings.distance_threshold_m),
            settings.bounding_box,
        );
        let moderation = ModerationEngine::new(
            ports.users.clone(),
            ports.reports.clone(),
            ports.votes.clone(),
            cascade.clone(),
            settings.report_deletion_threshold,
        );
        let reports = ReportManagement::new(
            ports.users.clone(),
            ports.reports.clone(),
            ports.images.clone(),
            ports.image_store.clone(),
            cascade.clone(),
        );
        let queries = Queries::new(ports.potholes, ports.reports, ports.images, ports.votes);

        Self {
            ingestion,
            moderation,
            lifecycle,
            cascade,
            reports,
            queries,
            users: ports.users,
        }
    }

    /// Registers an identity vouched for by the external authenticator.
    /// Existing users, including their ban flag, are left untouched.
    pub async fn provision_user(&self, user_id: Uuid) -> Result<User> {
        if let Some(user) = self
            .users
            .get_user(user_id)
            .await
            .map_err(AppError::persistence)?
        {
            return Ok(user);
        }
        let user = User {
            id: user_id,
            banned: false,
            moderator: false,
        };
        self.users
            .upsert_user(&user)
            .await
            .map_err(AppError::persistence)?;
        info!(%user_id, "user provisioned");
        Ok(user)
    }

    /// Grants moderator rights, creating the user if needed.
    pub async fn promote_moderator(&self, user_id: Uuid) -> Result<()> {
        let mut user = self.provision_user(user_id).await?;
        if !user.moderator {
            user.moderator = true;
            self.users
                .upsert_user(&user)
                .await
                .map_err(AppError::persistence)?;
            info!(%user_id, "moderator granted");
        }
        Ok(())
    }
}
