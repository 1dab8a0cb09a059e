use std::sync::Arc;

use bytes::Bytes;
use chrono::Duration;
use domains::error::AppError;
use domains::media::storage_key_from_url;
use domains::models::Coordinate;
use domains::traits::{ImageRepo, MockStreetSnapper, PotholeRepo, ReportRepo};
use integration_tests::{png, t0, Harness};
use services::{AttachmentStatus, DriverSubmission, IngestionOutcome, StandardSubmission};

fn standard(lat: f64, lon: f64, images: Vec<Bytes>) -> StandardSubmission {
    StandardSubmission {
        latitude: Some(lat),
        longitude: Some(lon),
        description: Some("Pothole swallowing half the lane".into()),
        images,
    }
}

#[tokio::test]
async fn reports_cluster_onto_nearby_potholes() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let (u1, u2, u3) = (h.user().await?, h.user().await?, h.user().await?);

    let first = h
        .engine
        .ingestion
        .report_standard(u1, standard(10.6603, -61.5086, vec![png(640, 480), png(32, 64)]))
        .await?;
    let IngestionOutcome::Created {
        pothole_id,
        report_id,
        new_pothole: true,
        expiry_date,
        images,
    } = first
    else {
        panic!("expected a new pothole");
    };
    assert_eq!(expiry_date, t0() + Duration::days(60));
    assert_eq!(images.status(), AttachmentStatus::AllSucceeded);
    assert_eq!(h.store.list_images_for_report(report_id).await?.len(), 2);
    assert_eq!(h.stored_images(), 2);

    h.clock.advance(Duration::days(2));
    let second = h
        .engine
        .ingestion
        .report_standard(u2, standard(10.66035, -61.50855, Vec::new()))
        .await?;
    assert!(matches!(
        second,
        IngestionOutcome::Created { pothole_id: p, new_pothole: false, .. } if p == pothole_id
    ));
    let stored = h.store.get_pothole(pothole_id).await?.expect("pothole");
    assert_eq!(stored.expiry_date, t0() + Duration::days(32));

    let third = h
        .engine
        .ingestion
        .report_driver(
            u3,
            DriverSubmission {
                latitude: Some(10.6700),
                longitude: Some(-61.5200),
            },
        )
        .await?;
    assert!(matches!(third, IngestionOutcome::Created { new_pothole: true, .. }));

    assert_eq!(h.store.list_potholes().await?.len(), 2);
    assert_eq!(h.store.list_reports_for_pothole(pothole_id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn resubmission_refreshes_expiry_without_new_rows() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let user = h.user().await?;
    let IngestionOutcome::Created { pothole_id, .. } = h
        .engine
        .ingestion
        .report_standard(user, standard(10.5, -61.4, Vec::new()))
        .await?
    else {
        panic!("expected creation");
    };

    h.clock.advance(Duration::days(45));
    let again = h
        .engine
        .ingestion
        .report_standard(user, standard(10.5, -61.4, vec![png(8, 8)]))
        .await?;
    assert_eq!(
        again,
        IngestionOutcome::ExpiryReset {
            pothole_id,
            expiry_date: t0() + Duration::days(75),
        }
    );
    assert_eq!(h.store.list_reports_for_user(user).await?.len(), 1);
    assert_eq!(h.stored_images(), 0);
    Ok(())
}

#[tokio::test]
async fn partial_image_failure_keeps_the_report() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let user = h.user().await?;

    let outcome = h
        .engine
        .ingestion
        .report_standard(
            user,
            standard(10.5, -61.4, vec![png(20, 10), Bytes::from_static(b"definitely not an image")]),
        )
        .await?;
    let IngestionOutcome::Created { report_id, images, .. } = outcome else {
        panic!("expected creation");
    };
    assert_eq!(images.status(), AttachmentStatus::Partial { failed: 1, total: 2 });
    assert_eq!(images.failures[0].index, 1);
    assert_eq!(images.failures[0].reason, "The file is not an image!");
    assert_eq!(h.store.list_images_for_report(report_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn snapped_location_is_what_gets_stored() -> anyhow::Result<()> {
    let mut snapper = MockStreetSnapper::new();
    snapper
        .expect_snap()
        .returning(|p| Ok(Coordinate::new(p.latitude + 0.00003, p.longitude)));
    let h = Harness::with_snapper(Some(Arc::new(snapper))).await?;
    let user = h.user().await?;

    let IngestionOutcome::Created { pothole_id, .. } = h
        .engine
        .ingestion
        .report_standard(user, standard(10.5, -61.4, Vec::new()))
        .await?
    else {
        panic!("expected creation");
    };
    let stored = h.store.get_pothole(pothole_id).await?.expect("pothole");
    assert!((stored.latitude - 10.50003).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn snapper_outage_rejects_the_report() -> anyhow::Result<()> {
    let mut snapper = MockStreetSnapper::new();
    snapper
        .expect_snap()
        .returning(|_| Err(anyhow::anyhow!("connection refused")));
    let h = Harness::with_snapper(Some(Arc::new(snapper))).await?;
    let user = h.user().await?;

    let err = h
        .engine
        .ingestion
        .report_standard(user, standard(10.5, -61.4, vec![png(8, 8)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Downstream(_)));
    assert!(h.store.list_potholes().await?.is_empty());
    assert_eq!(h.stored_images(), 0);
    Ok(())
}

#[tokio::test]
async fn repeated_image_in_one_submission_attaches_twice() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let user = h.user().await?;

    let outcome = h
        .engine
        .ingestion
        .report_standard(user, standard(10.5, -61.4, vec![png(40, 40), png(40, 40)]))
        .await?;
    let IngestionOutcome::Created { report_id, images, .. } = outcome else {
        panic!("expected creation");
    };
    assert_eq!(images.status(), AttachmentStatus::AllSucceeded);

    let rows = h.store.list_images_for_report(report_id).await?;
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].image_url, rows[1].image_url);
    assert_eq!(h.stored_images(), 2);
    Ok(())
}

#[tokio::test]
async fn re_adding_an_attached_image_keeps_the_original_file() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let user = h.user().await?;
    let IngestionOutcome::Created {
        pothole_id,
        report_id,
        ..
    } = h
        .engine
        .ingestion
        .report_standard(user, standard(10.5, -61.4, vec![png(40, 40)]))
        .await?
    else {
        panic!("expected creation");
    };

    let summary = h
        .engine
        .reports
        .add_images(user, pothole_id, report_id, vec![png(40, 40)])
        .await?;
    assert_eq!(summary.status(), AttachmentStatus::AllSucceeded);

    let rows = h.store.list_images_for_report(report_id).await?;
    assert_eq!(rows.len(), 2);
    for row in &rows {
        let key = storage_key_from_url(&row.image_url).expect("storage key");
        assert!(h.media_root().join(key).exists());
    }
    Ok(())
}
