//! Test doubles shared across crates: an in-memory implementation of every
//! repository port and a settable clock.
//!
//! Enabled with the `testing` feature. Mocks for `ImageStore` and
//! `StreetSnapper` are generated next to the traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    DeleteGuard, DeletedPotholeRows, DeletedReportRows, NewReport, Pothole, Report, ReportedImage,
    RowDeletion, User, UserReportVote, VoteTally,
};
use crate::traits::{Clock, ImageRepo, PotholeRepo, ReportRepo, UserRepo, VoteRepo};

#[derive(Default)]
struct State {
    potholes: Vec<Pothole>,
    reports: Vec<Report>,
    images: Vec<ReportedImage>,
    votes: Vec<UserReportVote>,
    users: Vec<User>,
}

/// Row counts, for asserting cascade completeness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub potholes: usize,
    pub reports: usize,
    pub images: usize,
    pub votes: usize,
}

/// Vec-backed store; iteration order is insertion order.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every mutating call fail, simulating a database outage.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn counts(&self) -> StoreCounts {
        self.with_state(|s| StoreCounts {
            potholes: s.potholes.len(),
            reports: s.reports.len(),
            images: s.images.len(),
            votes: s.votes.len(),
        })
        .unwrap_or_default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> anyhow::Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(f(&mut guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> anyhow::Result<T>) -> anyhow::Result<T> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        self.with_state(f)?
    }
}

fn remove_report_children(state: &mut State, report_ids: &[Uuid]) -> Vec<String> {
    let urls = state
        .images
        .iter()
        .filter(|i| report_ids.contains(&i.report_id))
        .map(|i| i.image_url.clone())
        .collect();
    state.images.retain(|i| !report_ids.contains(&i.report_id));
    state.votes.retain(|v| !report_ids.contains(&v.report_id));
    urls
}

#[async_trait]
impl PotholeRepo for InMemoryStore {
    async fn get_pothole(&self, id: Uuid) -> anyhow::Result<Option<Pothole>> {
        self.with_state(|s| s.potholes.iter().find(|p| p.id == id).cloned())
    }

    async fn list_potholes(&self) -> anyhow::Result<Vec<Pothole>> {
        self.with_state(|s| s.potholes.clone())
    }

    async fn list_potholes_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Pothole>> {
        self.with_state(|s| {
            s.potholes
                .iter()
                .filter(|p| {
                    s.reports
                        .iter()
                        .any(|r| r.pothole_id == p.id && r.user_id == user_id)
                })
                .cloned()
                .collect()
        })
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Pothole>> {
        self.with_state(|s| s.potholes.iter().filter(|p| p.is_expired(now)).cloned().collect())
    }

    async fn set_expiry(&self, id: Uuid, expiry: DateTime<Utc>) -> anyhow::Result<bool> {
        self.write(|s| {
            Ok(match s.potholes.iter_mut().find(|p| p.id == id) {
                Some(p) => {
                    p.expiry_date = expiry;
                    true
                }
                None => false,
            })
        })
    }

    async fn delete_pothole(
        &self,
        id: Uuid,
        guard: DeleteGuard,
    ) -> anyhow::Result<RowDeletion<DeletedPotholeRows>> {
        self.write(|s| {
            let Some(pothole) = s.potholes.iter().find(|p| p.id == id) else {
                return Ok(RowDeletion::NotFound);
            };
            let still_applies = match guard {
                DeleteGuard::Unconditional => true,
                DeleteGuard::ExpiredAt(now) => pothole.is_expired(now),
                DeleteGuard::Orphaned => !s.reports.iter().any(|r| r.pothole_id == id),
            };
            if !still_applies {
                return Ok(RowDeletion::Skipped);
            }

            let report_ids: Vec<Uuid> = s
                .reports
                .iter()
                .filter(|r| r.pothole_id == id)
                .map(|r| r.id)
                .collect();
            let image_urls = remove_report_children(s, &report_ids);
            s.reports.retain(|r| r.pothole_id != id);
            s.potholes.retain(|p| p.id != id);

            Ok(RowDeletion::Deleted(DeletedPotholeRows {
                report_count: report_ids.len(),
                image_urls,
            }))
        })
    }
}

#[async_trait]
impl ReportRepo for InMemoryStore {
    async fn commit_report(&self, new_report: &NewReport) -> anyhow::Result<()> {
        self.write(|s| {
            let report = &new_report.report;
            if s
                .reports
                .iter()
                .any(|r| r.user_id == report.user_id && r.pothole_id == report.pothole_id)
            {
                bail!("UNIQUE constraint failed: reports.user_id, reports.pothole_id");
            }
            let images = &new_report.images;
            if images
                .iter()
                .enumerate()
                .any(|(n, a)| images[..n].iter().any(|b| b.image_url == a.image_url))
            {
                bail!("UNIQUE constraint failed: reported_images.report_id, reported_images.image_url");
            }
            let pothole_exists = new_report
                .new_pothole
                .as_ref()
                .is_some_and(|p| p.id == report.pothole_id)
                || s.potholes.iter().any(|p| p.id == report.pothole_id);
            if !pothole_exists {
                bail!("FOREIGN KEY constraint failed: pothole {}", report.pothole_id);
            }

            if let Some(pothole) = &new_report.new_pothole {
                s.potholes.push(pothole.clone());
            }
            if let Some(target) = s.potholes.iter_mut().find(|p| p.id == report.pothole_id) {
                target.expiry_date = new_report.pothole_expiry;
            }
            s.reports.push(report.clone());
            s.images.extend(images.iter().cloned());
            Ok(())
        })
    }

    async fn get_report(&self, id: Uuid) -> anyhow::Result<Option<Report>> {
        self.with_state(|s| s.reports.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_user_and_pothole(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
    ) -> anyhow::Result<Option<Report>> {
        self.with_state(|s| {
            s.reports
                .iter()
                .find(|r| r.user_id == user_id && r.pothole_id == pothole_id)
                .cloned()
        })
    }

    async fn list_reports_for_pothole(&self, pothole_id: Uuid) -> anyhow::Result<Vec<Report>> {
        self.with_state(|s| {
            s.reports
                .iter()
                .filter(|r| r.pothole_id == pothole_id)
                .cloned()
                .collect()
        })
    }

    async fn list_reports_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Report>> {
        self.with_state(|s| s.reports.iter().filter(|r| r.user_id == user_id).cloned().collect())
    }

    async fn update_description(&self, id: Uuid, description: &str) -> anyhow::Result<bool> {
        self.write(|s| {
            Ok(match s.reports.iter_mut().find(|r| r.id == id) {
                Some(r) => {
                    r.description = description.to_string();
                    true
                }
                None => false,
            })
        })
    }

    async fn delete_report(&self, id: Uuid) -> anyhow::Result<RowDeletion<DeletedReportRows>> {
        self.write(|s| {
            let Some(pothole_id) = s.reports.iter().find(|r| r.id == id).map(|r| r.pothole_id)
            else {
                return Ok(RowDeletion::NotFound);
            };
            let image_urls = remove_report_children(s, &[id]);
            s.reports.retain(|r| r.id != id);
            let remaining_reports =
                s.reports.iter().filter(|r| r.pothole_id == pothole_id).count() as i64;
            Ok(RowDeletion::Deleted(DeletedReportRows {
                pothole_id,
                image_urls,
                remaining_reports,
            }))
        })
    }
}

#[async_trait]
impl ImageRepo for InMemoryStore {
    async fn add_image(&self, image: &ReportedImage) -> anyhow::Result<()> {
        self.write(|s| {
            if !s.reports.iter().any(|r| r.id == image.report_id) {
                bail!("FOREIGN KEY constraint failed: report {}", image.report_id);
            }
            if s
                .images
                .iter()
                .any(|i| i.report_id == image.report_id && i.image_url == image.image_url)
            {
                bail!("UNIQUE constraint failed: reported_images.report_id, reported_images.image_url");
            }
            s.images.push(image.clone());
            Ok(())
        })
    }

    async fn get_image(&self, id: Uuid) -> anyhow::Result<Option<ReportedImage>> {
        self.with_state(|s| s.images.iter().find(|i| i.id == id).cloned())
    }

    async fn list_images_for_report(&self, report_id: Uuid) -> anyhow::Result<Vec<ReportedImage>> {
        self.with_state(|s| {
            s.images
                .iter()
                .filter(|i| i.report_id == report_id)
                .cloned()
                .collect()
        })
    }

    async fn list_images_for_pothole(&self, pothole_id: Uuid) -> anyhow::Result<Vec<ReportedImage>> {
        self.with_state(|s| {
            let report_ids: Vec<Uuid> = s
                .reports
                .iter()
                .filter(|r| r.pothole_id == pothole_id)
                .map(|r| r.id)
                .collect();
            s.images
                .iter()
                .filter(|i| report_ids.contains(&i.report_id))
                .cloned()
                .collect()
        })
    }

    async fn delete_image(&self, id: Uuid) -> anyhow::Result<bool> {
        self.write(|s| {
            let before = s.images.len();
            s.images.retain(|i| i.id != id);
            Ok(s.images.len() != before)
        })
    }
}

#[async_trait]
impl VoteRepo for InMemoryStore {
    async fn find_vote(
        &self,
        user_id: Uuid,
        report_id: Uuid,
    ) -> anyhow::Result<Option<UserReportVote>> {
        self.with_state(|s| {
            s.votes
                .iter()
                .find(|v| v.user_id == user_id && v.report_id == report_id)
                .cloned()
        })
    }

    async fn create_vote(&self, vote: &UserReportVote) -> anyhow::Result<()> {
        self.write(|s| {
            if s
                .votes
                .iter()
                .any(|v| v.user_id == vote.user_id && v.report_id == vote.report_id)
            {
                bail!("UNIQUE constraint failed: user_report_votes.user_id, user_report_votes.report_id");
            }
            s.votes.push(vote.clone());
            Ok(())
        })
    }

    async fn set_polarity(&self, id: Uuid, upvote: bool) -> anyhow::Result<bool> {
        self.write(|s| {
            Ok(match s.votes.iter_mut().find(|v| v.id == id) {
                Some(v) => {
                    v.upvote = upvote;
                    true
                }
                None => false,
            })
        })
    }

    async fn delete_vote(&self, id: Uuid) -> anyhow::Result<bool> {
        self.write(|s| {
            let before = s.votes.len();
            s.votes.retain(|v| v.id != id);
            Ok(s.votes.len() != before)
        })
    }

    async fn tally(&self, report_id: Uuid) -> anyhow::Result<VoteTally> {
        self.with_state(|s| {
            s.votes
                .iter()
                .filter(|v| v.report_id == report_id)
                .fold(VoteTally::default(), |mut t, v| {
                    if v.upvote {
                        t.upvotes += 1;
                    } else {
                        t.downvotes += 1;
                    }
                    t
                })
        })
    }

    async fn list_votes_for_report(
        &self,
        report_id: Uuid,
        polarity: Option<bool>,
    ) -> anyhow::Result<Vec<UserReportVote>> {
        self.with_state(|s| {
            s.votes
                .iter()
                .filter(|v| v.report_id == report_id && polarity.map_or(true, |up| v.upvote == up))
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl UserRepo for InMemoryStore {
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.with_state(|s| s.users.iter().find(|u| u.id == id).cloned())
    }

    async fn upsert_user(&self, user: &User) -> anyhow::Result<()> {
        self.write(|s| {
            s.users.retain(|u| u.id != user.id);
            s.users.push(user.clone());
            Ok(())
        })
    }

    async fn set_banned(&self, id: Uuid, banned: bool) -> anyhow::Result<bool> {
        self.write(|s| {
            Ok(match s.users.iter_mut().find(|u| u.id == id) {
                Some(u) => {
                    u.banned = banned;
                    true
                }
                None => false,
            })
        })
    }
}

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|_| Utc::now())
    }
}
