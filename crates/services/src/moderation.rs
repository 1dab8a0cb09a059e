//! # ModerationEngine
//!
//! Community voting on reports, the negative-reputation deletion rule, and
//! direct deletions by a report's owner or a moderator.

use std::sync::Arc;

use domains::error::{AppError, Result};
use domains::models::{UserReportVote, VoteTally};
use domains::traits::{ReportRepo, UserRepo, VoteRepo};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::access::{require_active_user, require_moderator};
use crate::cascade::{CascadeDeleter, Deletion, ReportCascade};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoteOutcome {
    /// First vote by this user on the report.
    Cast { net_score: i64 },
    /// Same polarity submitted twice: the vote was withdrawn.
    Removed { net_score: i64 },
    /// Opposite polarity: the vote was flipped.
    Updated { net_score: i64 },
    /// The net score reached the deletion threshold and the report is gone.
    ReportDeleted {
        net_score: i64,
        cascade: Option<ReportCascade>,
    },
}

impl VoteOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Cast { .. } => "Vote casted for report!",
            Self::Removed { .. } => "Vote removed from report!",
            Self::Updated { .. } => "Vote updated for report!",
            Self::ReportDeleted { .. } => {
                "This report will be deleted due to its severe negative reputation."
            }
        }
    }
}

enum Transition {
    Cast,
    Removed,
    Updated,
}

#[derive(Clone)]
pub struct ModerationEngine {
    users: Arc<dyn UserRepo>,
    reports: Arc<dyn ReportRepo>,
    votes: Arc<dyn VoteRepo>,
    cascade: CascadeDeleter,
    deletion_threshold: i64,
}

impl ModerationEngine {
    pub fn new(
        users: Arc<dyn UserRepo>,
        reports: Arc<dyn ReportRepo>,
        votes: Arc<dyn VoteRepo>,
        cascade: CascadeDeleter,
        deletion_threshold: i64,
    ) -> Self {
        Self {
            users,
            reports,
            votes,
            cascade,
            deletion_threshold,
        }
    }

    /// Applies one vote submission:
    ///
    /// | existing | submitted | effect        |
    /// |----------|-----------|---------------|
    /// | none     | v         | create v      |
    /// | v        | v         | delete vote   |
    /// | v        | !v        | flip polarity |
    ///
    /// The net score is re-evaluated after every transition.
    #[instrument(skip(self))]
    pub async fn vote(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
        report_id: Uuid,
        upvote: bool,
    ) -> Result<VoteOutcome> {
        require_active_user(self.users.as_ref(), user_id).await?;

        self.reports
            .get_report(report_id)
            .await
            .map_err(AppError::persistence)?
            .filter(|r| r.pothole_id == pothole_id)
            .ok_or_else(|| AppError::not_found("Report", report_id))?;

        let existing = self
            .votes
            .find_vote(user_id, report_id)
            .await
            .map_err(AppError::persistence)?;

        let transition = match existing {
            None => {
                self.votes
                    .create_vote(&UserReportVote {
                        id: Uuid::now_v7(),
                        report_id,
                        user_id,
                        upvote,
                    })
                    .await
                    .map_err(AppError::persistence)?;
                Transition::Cast
            }
            Some(vote) if vote.upvote == upvote => {
                self.votes
                    .delete_vote(vote.id)
                    .await
                    .map_err(AppError::persistence)?;
                Transition::Removed
            }
            Some(vote) => {
                self.votes
                    .set_polarity(vote.id, upvote)
                    .await
                    .map_err(AppError::persistence)?;
                Transition::Updated
            }
        };

        let net_score = self.net_score(report_id).await?;
        if net_score <= self.deletion_threshold {
            info!(%report_id, net_score, "deleting report with negative reputation");
            let cascade = self.cascade.delete_report(report_id).await?.deleted();
            return Ok(VoteOutcome::ReportDeleted { net_score, cascade });
        }

        Ok(match transition {
            Transition::Cast => VoteOutcome::Cast { net_score },
            Transition::Removed => VoteOutcome::Removed { net_score },
            Transition::Updated => VoteOutcome::Updated { net_score },
        })
    }

    pub async fn tally(&self, report_id: Uuid) -> Result<VoteTally> {
        self.votes
            .tally(report_id)
            .await
            .map_err(AppError::persistence)
    }

    /// Upvotes minus downvotes.
    pub async fn net_score(&self, report_id: Uuid) -> Result<i64> {
        Ok(self.tally(report_id).await?.net())
    }

    /// The report's creator removes it.
    #[instrument(skip(self))]
    pub async fn owner_delete_report(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
        report_id: Uuid,
    ) -> Result<ReportCascade> {
        require_active_user(self.users.as_ref(), user_id).await?;

        self.reports
            .get_report(report_id)
            .await
            .map_err(AppError::persistence)?
            .filter(|r| r.pothole_id == pothole_id && r.user_id == user_id)
            .ok_or_else(|| AppError::not_found("Report", report_id))?;

        self.delete_existing(report_id).await
    }

    /// A moderator removes any report.
    #[instrument(skip(self))]
    pub async fn moderator_delete_report(
        &self,
        moderator_id: Uuid,
        report_id: Uuid,
    ) -> Result<ReportCascade> {
        require_moderator(self.users.as_ref(), moderator_id).await?;
        self.delete_existing(report_id).await
    }

    #[instrument(skip(self))]
    pub async fn set_banned(&self, moderator_id: Uuid, target: Uuid, banned: bool) -> Result<()> {
        require_moderator(self.users.as_ref(), moderator_id).await?;
        let updated = self
            .users
            .set_banned(target, banned)
            .await
            .map_err(AppError::persistence)?;
        if !updated {
            return Err(AppError::not_found("User", target));
        }
        info!(%moderator_id, user_id = %target, banned, "user ban flag changed");
        Ok(())
    }

    async fn delete_existing(&self, report_id: Uuid) -> Result<ReportCascade> {
        match self.cascade.delete_report(report_id).await? {
            Deletion::Deleted(cascade) => Ok(cascade),
            Deletion::NotFound | Deletion::Retained => {
                Err(AppError::not_found("Report", report_id))
            }
        }
    }
}
