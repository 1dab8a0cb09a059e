//! # SQLite repositories
//!
//! Maps the relational model onto the domain models. One `SqliteStore`
//! implements every repository port; composite writes run in a single
//! transaction so a failure leaves no partial rows behind.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::models::{
    DeleteGuard, DeletedPotholeRows, DeletedReportRows, NewReport, Pothole, Report, ReportedImage,
    RowDeletion, User, UserReportVote, VoteTally,
};
use domains::traits::{ImageRepo, PotholeRepo, ReportRepo, UserRepo, VoteRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id        BLOB PRIMARY KEY,
        banned    BOOLEAN NOT NULL DEFAULT 0,
        moderator BOOLEAN NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS potholes (
        id         BLOB PRIMARY KEY,
        latitude   REAL NOT NULL,
        longitude  REAL NOT NULL,
        expiry_ms  INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_potholes_expiry ON potholes (expiry_ms)",
    "CREATE TABLE IF NOT EXISTS reports (
        id          BLOB PRIMARY KEY,
        pothole_id  BLOB NOT NULL REFERENCES potholes (id) ON DELETE CASCADE,
        user_id     BLOB NOT NULL,
        description TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        UNIQUE (user_id, pothole_id)
    )",
    "CREATE TABLE IF NOT EXISTS reported_images (
        id        BLOB PRIMARY KEY,
        report_id BLOB NOT NULL REFERENCES reports (id) ON DELETE CASCADE,
        image_url TEXT NOT NULL,
        UNIQUE (report_id, image_url)
    )",
    "CREATE TABLE IF NOT EXISTS user_report_votes (
        id        BLOB PRIMARY KEY,
        report_id BLOB NOT NULL REFERENCES reports (id) ON DELETE CASCADE,
        user_id   BLOB NOT NULL,
        upvote    BOOLEAN NOT NULL,
        UNIQUE (user_id, report_id)
    )",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn uuid_col(row: &SqliteRow, col: &str) -> anyhow::Result<Uuid> {
    let blob: Vec<u8> = row.try_get(col)?;
    Uuid::from_slice(&blob).with_context(|| format!("malformed uuid in column {col}"))
}

fn millis_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn pothole_from_row(row: &SqliteRow) -> anyhow::Result<Pothole> {
    Ok(Pothole {
        id: uuid_col(row, "id")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        expiry_date: millis_to_datetime(row.try_get("expiry_ms")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn report_from_row(row: &SqliteRow) -> anyhow::Result<Report> {
    Ok(Report {
        id: uuid_col(row, "id")?,
        pothole_id: uuid_col(row, "pothole_id")?,
        user_id: uuid_col(row, "user_id")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn image_from_row(row: &SqliteRow) -> anyhow::Result<ReportedImage> {
    Ok(ReportedImage {
        id: uuid_col(row, "id")?,
        report_id: uuid_col(row, "report_id")?,
        image_url: row.try_get("image_url")?,
    })
}

fn vote_from_row(row: &SqliteRow) -> anyhow::Result<UserReportVote> {
    Ok(UserReportVote {
        id: uuid_col(row, "id")?,
        report_id: uuid_col(row, "report_id")?,
        user_id: uuid_col(row, "user_id")?,
        upvote: row.try_get("upvote")?,
    })
}

impl SqliteStore {
    /// Connects and applies the schema. `sqlite::memory:` URLs get a single
    /// long-lived connection, since every new connection would open an empty
    /// database.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url {url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(8)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .context("unable to open sqlite database")?;

        let store = Self { pool };
        store.migrate().await?;
        info!(in_memory, "sqlite store ready");
        Ok(store)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PotholeRepo for SqliteStore {
    async fn get_pothole(&self, id: Uuid) -> anyhow::Result<Option<Pothole>> {
        sqlx::query("SELECT * FROM potholes WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| pothole_from_row(&row))
            .transpose()
    }

    async fn list_potholes(&self) -> anyhow::Result<Vec<Pothole>> {
        sqlx::query("SELECT * FROM potholes ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(pothole_from_row)
            .collect()
    }

    async fn list_potholes_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Pothole>> {
        sqlx::query(
            "SELECT p.* FROM potholes p
             WHERE EXISTS (SELECT 1 FROM reports r WHERE r.pothole_id = p.id AND r.user_id = ?)
             ORDER BY p.created_at, p.id",
        )
        .bind(uuid_to_blob(user_id))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(pothole_from_row)
        .collect()
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Pothole>> {
        sqlx::query("SELECT * FROM potholes WHERE expiry_ms <= ? ORDER BY expiry_ms, id")
            .bind(now.timestamp_millis())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(pothole_from_row)
            .collect()
    }

    async fn set_expiry(&self, id: Uuid, expiry: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE potholes SET expiry_ms = ? WHERE id = ?")
            .bind(expiry.timestamp_millis())
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_pothole(
        &self,
        id: Uuid,
        guard: DeleteGuard,
    ) -> anyhow::Result<RowDeletion<DeletedPotholeRows>> {
        let mut tx = self.pool.begin().await?;
        let blob = uuid_to_blob(id);

        let Some(row) = sqlx::query("SELECT expiry_ms FROM potholes WHERE id = ?")
            .bind(&blob)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(RowDeletion::NotFound);
        };

        let report_count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM reports WHERE pothole_id = ?")
            .bind(&blob)
            .fetch_one(&mut *tx)
            .await?
            .try_get("n")?;

        let still_applies = match guard {
            DeleteGuard::Unconditional => true,
            DeleteGuard::ExpiredAt(now) => {
                row.try_get::<i64, _>("expiry_ms")? <= now.timestamp_millis()
            }
            DeleteGuard::Orphaned => report_count == 0,
        };
        if !still_applies {
            debug!(pothole_id = %id, ?guard, "delete guard no longer holds");
            return Ok(RowDeletion::Skipped);
        }

        let image_urls: Vec<String> = sqlx::query(
            "SELECT i.image_url FROM reported_images i
             JOIN reports r ON r.id = i.report_id
             WHERE r.pothole_id = ?",
        )
        .bind(&blob)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.try_get("image_url"))
        .collect::<Result<_, _>>()?;

        sqlx::query(
            "DELETE FROM user_report_votes
             WHERE report_id IN (SELECT id FROM reports WHERE pothole_id = ?)",
        )
        .bind(&blob)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM reported_images
             WHERE report_id IN (SELECT id FROM reports WHERE pothole_id = ?)",
        )
        .bind(&blob)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM reports WHERE pothole_id = ?")
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM potholes WHERE id = ?")
            .bind(&blob)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RowDeletion::Deleted(DeletedPotholeRows {
            report_count: usize::try_from(report_count)?,
            image_urls,
        }))
    }
}

#[async_trait]
impl ReportRepo for SqliteStore {
    /// Pothole, report, images and the expiry stamp land together or not at
    /// all.
    async fn commit_report(&self, new_report: &NewReport) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let report = &new_report.report;

        if let Some(pothole) = &new_report.new_pothole {
            sqlx::query(
                "INSERT INTO potholes (id, latitude, longitude, expiry_ms, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(uuid_to_blob(pothole.id))
            .bind(pothole.latitude)
            .bind(pothole.longitude)
            .bind(pothole.expiry_date.timestamp_millis())
            .bind(pothole.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO reports (id, pothole_id, user_id, description, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(report.id))
        .bind(uuid_to_blob(report.pothole_id))
        .bind(uuid_to_blob(report.user_id))
        .bind(&report.description)
        .bind(report.created_at)
        .execute(&mut *tx)
        .await?;

        for image in &new_report.images {
            sqlx::query("INSERT INTO reported_images (id, report_id, image_url) VALUES (?, ?, ?)")
                .bind(uuid_to_blob(image.id))
                .bind(uuid_to_blob(image.report_id))
                .bind(&image.image_url)
                .execute(&mut *tx)
                .await?;
        }

        let stamped = sqlx::query("UPDATE potholes SET expiry_ms = ? WHERE id = ?")
            .bind(new_report.pothole_expiry.timestamp_millis())
            .bind(uuid_to_blob(report.pothole_id))
            .execute(&mut *tx)
            .await?;
        if stamped.rows_affected() == 0 {
            bail!("pothole {} disappeared before the report was committed", report.pothole_id);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> anyhow::Result<Option<Report>> {
        sqlx::query("SELECT * FROM reports WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| report_from_row(&row))
            .transpose()
    }

    async fn find_by_user_and_pothole(
        &self,
        user_id: Uuid,
        pothole_id: Uuid,
    ) -> anyhow::Result<Option<Report>> {
        sqlx::query("SELECT * FROM reports WHERE user_id = ? AND pothole_id = ?")
            .bind(uuid_to_blob(user_id))
            .bind(uuid_to_blob(pothole_id))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| report_from_row(&row))
            .transpose()
    }

    async fn list_reports_for_pothole(&self, pothole_id: Uuid) -> anyhow::Result<Vec<Report>> {
        sqlx::query("SELECT * FROM reports WHERE pothole_id = ? ORDER BY created_at, id")
            .bind(uuid_to_blob(pothole_id))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(report_from_row)
            .collect()
    }

    async fn list_reports_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Report>> {
        sqlx::query("SELECT * FROM reports WHERE user_id = ? ORDER BY created_at, id")
            .bind(uuid_to_blob(user_id))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(report_from_row)
            .collect()
    }

    async fn update_description(&self, id: Uuid, description: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE reports SET description = ? WHERE id = ?")
            .bind(description)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_report(&self, id: Uuid) -> anyhow::Result<RowDeletion<DeletedReportRows>> {
        let mut tx = self.pool.begin().await?;
        let blob = uuid_to_blob(id);

        let Some(row) = sqlx::query("SELECT pothole_id FROM reports WHERE id = ?")
            .bind(&blob)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(RowDeletion::NotFound);
        };
        let pothole_id = uuid_col(&row, "pothole_id")?;

        let image_urls: Vec<String> =
            sqlx::query("SELECT image_url FROM reported_images WHERE report_id = ?")
                .bind(&blob)
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(|row| row.try_get("image_url"))
                .collect::<Result<_, _>>()?;

        sqlx::query("DELETE FROM user_report_votes WHERE report_id = ?")
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM reported_images WHERE report_id = ?")
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(&blob)
            .execute(&mut *tx)
            .await?;

        let remaining_reports: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM reports WHERE pothole_id = ?")
                .bind(uuid_to_blob(pothole_id))
                .fetch_one(&mut *tx)
                .await?
                .try_get("n")?;

        tx.commit().await?;
        Ok(RowDeletion::Deleted(DeletedReportRows {
            pothole_id,
            image_urls,
            remaining_reports,
        }))
    }
}

#[async_trait]
impl ImageRepo for SqliteStore {
    async fn add_image(&self, image: &ReportedImage) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO reported_images (id, report_id, image_url) VALUES (?, ?, ?)")
            .bind(uuid_to_blob(image.id))
            .bind(uuid_to_blob(image.report_id))
            .bind(&image.image_url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_image(&self, id: Uuid) -> anyhow::Result<Option<ReportedImage>> {
        sqlx::query("SELECT * FROM reported_images WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| image_from_row(&row))
            .transpose()
    }

    async fn list_images_for_report(&self, report_id: Uuid) -> anyhow::Result<Vec<ReportedImage>> {
        sqlx::query("SELECT * FROM reported_images WHERE report_id = ? ORDER BY id")
            .bind(uuid_to_blob(report_id))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(image_from_row)
            .collect()
    }

    async fn list_images_for_pothole(&self, pothole_id: Uuid) -> anyhow::Result<Vec<ReportedImage>> {
        sqlx::query(
            "SELECT i.* FROM reported_images i
             JOIN reports r ON r.id = i.report_id
             WHERE r.pothole_id = ?
             ORDER BY i.id",
        )
        .bind(uuid_to_blob(pothole_id))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(image_from_row)
        .collect()
    }

    async fn delete_image(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM reported_images WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VoteRepo for SqliteStore {
    async fn find_vote(
        &self,
        user_id: Uuid,
        report_id: Uuid,
    ) -> anyhow::Result<Option<UserReportVote>> {
        sqlx::query("SELECT * FROM user_report_votes WHERE user_id = ? AND report_id = ?")
            .bind(uuid_to_blob(user_id))
            .bind(uuid_to_blob(report_id))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| vote_from_row(&row))
            .transpose()
    }

    async fn create_vote(&self, vote: &UserReportVote) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO user_report_votes (id, report_id, user_id, upvote) VALUES (?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(vote.id))
        .bind(uuid_to_blob(vote.report_id))
        .bind(uuid_to_blob(vote.user_id))
        .bind(vote.upvote)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_polarity(&self, id: Uuid, upvote: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE user_report_votes SET upvote = ? WHERE id = ?")
            .bind(upvote)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_vote(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM user_report_votes WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tally(&self, report_id: Uuid) -> anyhow::Result<VoteTally> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN upvote THEN 1 ELSE 0 END), 0) AS upvotes,
                COALESCE(SUM(CASE WHEN upvote THEN 0 ELSE 1 END), 0) AS downvotes
             FROM user_report_votes WHERE report_id = ?",
        )
        .bind(uuid_to_blob(report_id))
        .fetch_one(&self.pool)
        .await?;
        Ok(VoteTally {
            upvotes: row.try_get("upvotes")?,
            downvotes: row.try_get("downvotes")?,
        })
    }

    async fn list_votes_for_report(
        &self,
        report_id: Uuid,
        polarity: Option<bool>,
    ) -> anyhow::Result<Vec<UserReportVote>> {
        sqlx::query(
            "SELECT * FROM user_report_votes
             WHERE report_id = ? AND (? IS NULL OR upvote = ?)
             ORDER BY id",
        )
        .bind(uuid_to_blob(report_id))
        .bind(polarity)
        .bind(polarity)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(vote_from_row)
        .collect()
    }
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(User {
                id: uuid_col(&row, "id")?,
                banned: row.try_get("banned")?,
                moderator: row.try_get("moderator")?,
            })
        })
        .transpose()
    }

    async fn upsert_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, banned, moderator) VALUES (?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET banned = excluded.banned, moderator = excluded.moderator",
        )
        .bind(uuid_to_blob(user.id))
        .bind(user.banned)
        .bind(user.moderator)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_banned(&self, id: Uuid, banned: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE users SET banned = ? WHERE id = ?")
            .bind(banned)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
