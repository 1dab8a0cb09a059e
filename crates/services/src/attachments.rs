//! Image upload with per-image failure accounting.

use bytes::Bytes;
use domains::error::AppError;
use domains::models::ReportedImage;
use domains::traits::ImageStore;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFailure {
    /// Position of the image in the submitted list.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttachmentStatus {
    NoneSubmitted,
    AllSucceeded,
    Partial { failed: usize, total: usize },
}

/// Outcome of attaching several images, never collapsed to a bare bool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttachmentSummary {
    pub total: usize,
    pub attached: Vec<Uuid>,
    pub failures: Vec<ImageFailure>,
}

impl AttachmentSummary {
    pub fn status(&self) -> AttachmentStatus {
        match (self.total, self.failures.len()) {
            (0, _) => AttachmentStatus::NoneSubmitted,
            (_, 0) => AttachmentStatus::AllSucceeded,
            (total, failed) => AttachmentStatus::Partial { failed, total },
        }
    }

    pub(crate) fn fail(&mut self, index: usize, reason: impl Into<String>) {
        self.failures.push(ImageFailure {
            index,
            reason: reason.into(),
        });
    }
}

/// Sniffs and uploads each payload. Returns the image rows to link for the
/// uploads that succeeded; failures are recorded in the summary.
pub(crate) async fn upload_images(
    store: &dyn ImageStore,
    report_id: Uuid,
    images: Vec<Bytes>,
) -> (Vec<ReportedImage>, AttachmentSummary) {
    let mut summary = AttachmentSummary {
        total: images.len(),
        ..Default::default()
    };
    let mut rows = Vec::with_capacity(images.len());

    for (index, data) in images.into_iter().enumerate() {
        if !store.is_probably_image(&data) {
            summary.fail(index, "The file is not an image!");
            continue;
        }
        match store.put(data).await {
            Ok(image_url) => {
                let row = ReportedImage {
                    id: Uuid::now_v7(),
                    report_id,
                    image_url,
                };
                summary.attached.push(row.id);
                rows.push(row);
            }
            Err(err) => {
                warn!(%report_id, index, error = %err, "image upload failed");
                summary.fail(index, AppError::storage(err).to_string());
            }
        }
    }
    (rows, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_distinguishes_partial_failure() {
        let mut summary = AttachmentSummary {
            total: 3,
            ..Default::default()
        };
        assert_eq!(summary.status(), AttachmentStatus::AllSucceeded);
        summary.fail(1, "nope");
        assert_eq!(
            summary.status(),
            AttachmentStatus::Partial { failed: 1, total: 3 }
        );
        assert_eq!(
            AttachmentSummary::default().status(),
            AttachmentStatus::NoneSubmitted
        );
    }

    #[tokio::test]
    async fn upload_errors_are_reported_as_storage_failures() {
        let mut store = domains::traits::MockImageStore::new();
        store.expect_is_probably_image().returning(|_| true);
        store
            .expect_put()
            .returning(|_| Err(anyhow::anyhow!("disk full")));

        let (rows, summary) =
            upload_images(&store, Uuid::now_v7(), vec![Bytes::from_static(b"\x89PNG")]).await;
        assert!(rows.is_empty());
        assert_eq!(summary.failures[0].reason, "storage failure: disk full");
    }
}
