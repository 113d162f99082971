use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;

use moon_extractions::{
    database::Database,
    models::{
        ExtractionFilter, ExtractionStatus, MoonMaterial, NewExtraction, PageRequest, TimeRange,
    },
    store::ExtractionStore,
};

const CORPORATION: i64 = 98_000_001;
const STRUCTURE: i64 = 1_023_456_789_012;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn extraction(structure_id: i64, corporation_id: i64, start: DateTime<Utc>) -> NewExtraction {
    NewExtraction {
        structure_id,
        structure_name: "Athanor".to_string(),
        corporation_id,
        corporation_name: "Test Corp".to_string(),
        system_id: Some(30_000_142),
        system_name: "Jita".to_string(),
        region_id: Some(10_000_002),
        region_name: "The Forge".to_string(),
        moon_id: Some(40_009_082),
        extraction_start_time: start,
        chunk_arrival_time: start + Duration::days(4),
        natural_decay_time: start + Duration::days(6),
        moon_materials: None,
        moon_value: None,
        status: ExtractionStatus::Scheduled,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_upsert_is_idempotent(pool: PgPool) {
    let db = Database::new(pool.clone()).await.unwrap();
    let new = extraction(STRUCTURE, CORPORATION, t0());

    let first = db.upsert(&new, t0()).await.expect("Failed to insert");
    let second = db
        .upsert(&new, t0() + Duration::hours(1))
        .await
        .expect("Failed to update");

    assert_eq!(first.id, second.id);
    assert_eq!(second.created_at, t0());
    assert_eq!(second.updated_at, t0() + Duration::hours(1));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM moon_extractions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_upsert_stores_materials(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    let materials = vec![
        MoonMaterial {
            material: "Zeolites".to_string(),
            volume: 10.0,
            rate: 0.6,
        },
        MoonMaterial {
            material: "Sylvite".to_string(),
            volume: 10.0,
            rate: 0.4,
        },
    ];
    let new = NewExtraction {
        moon_materials: Some(materials.clone()),
        moon_value: Some(1.5e9),
        ..extraction(STRUCTURE, CORPORATION, t0())
    };

    db.upsert(&new, t0()).await.unwrap();

    let stored = db.find_by_structure(STRUCTURE).await.unwrap().unwrap();
    assert_eq!(stored.moon_materials, Some(materials));
    assert_eq!(stored.moon_value, Some(1.5e9));
    assert_eq!(stored.status, ExtractionStatus::Scheduled);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_upsert_retires_superseded_extraction(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    let old = extraction(STRUCTURE, CORPORATION, t0());
    db.upsert(&old, t0()).await.unwrap();

    // Rescheduled before the first chunk arrived
    let now = t0() + Duration::days(1);
    let new = extraction(STRUCTURE, CORPORATION, now);
    db.upsert(&new, now).await.unwrap();

    let page = db
        .query(&ExtractionFilter::default(), PageRequest::new(1, 10, 1000))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].status, ExtractionStatus::Cancelled);
    assert_eq!(page.items[1].status, ExtractionStatus::Scheduled);

    let latest = db.find_by_structure(STRUCTURE).await.unwrap().unwrap();
    assert_eq!(latest.extraction_start_time, now);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_superseded_after_decay_is_completed(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    db.upsert(&extraction(STRUCTURE, CORPORATION, t0()), t0())
        .await
        .unwrap();

    let now = t0() + Duration::days(8);
    db.upsert(&extraction(STRUCTURE, CORPORATION, now), now)
        .await
        .unwrap();

    let statuses: Vec<String> = sqlx::query_scalar(
        "SELECT status FROM moon_extractions WHERE structure_id = $1 ORDER BY extraction_start_time",
    )
    .bind(STRUCTURE)
    .fetch_all(db.pool())
    .await
    .unwrap();
    assert_eq!(statuses, vec!["completed", "scheduled"]);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_cancelled_survives_upsert(pool: PgPool) {
    let db = Database::new(pool.clone()).await.unwrap();
    let new = extraction(STRUCTURE, CORPORATION, t0());
    db.upsert(&new, t0()).await.unwrap();

    sqlx::query("UPDATE moon_extractions SET status = 'cancelled' WHERE structure_id = $1")
        .bind(STRUCTURE)
        .execute(&pool)
        .await
        .unwrap();

    let record = db.upsert(&new, t0()).await.unwrap();
    assert_eq!(record.status, ExtractionStatus::Cancelled);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_sweep_stale(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    db.upsert(&extraction(1, CORPORATION, t0()), t0())
        .await
        .unwrap();
    db.upsert(&extraction(2, CORPORATION, t0() + Duration::days(5)), t0())
        .await
        .unwrap();
    db.upsert(&extraction(3, 98_000_002, t0()), t0())
        .await
        .unwrap();

    let swept = db
        .sweep_stale(CORPORATION, t0() + Duration::days(7))
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let swept_again = db
        .sweep_stale(CORPORATION, t0() + Duration::days(7))
        .await
        .unwrap();
    assert_eq!(swept_again, 0);

    let first = db.find_by_structure(1).await.unwrap().unwrap();
    let second = db.find_by_structure(2).await.unwrap().unwrap();
    let other = db.find_by_structure(3).await.unwrap().unwrap();
    assert_eq!(first.status, ExtractionStatus::Completed);
    assert_eq!(second.status, ExtractionStatus::Scheduled);
    assert_eq!(other.status, ExtractionStatus::Scheduled);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_query_filters_and_pages(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    for i in 0..5 {
        let corporation_id = if i % 2 == 0 { CORPORATION } else { 98_000_002 };
        db.upsert(
            &extraction(100 + i, corporation_id, t0() + Duration::hours(i)),
            t0(),
        )
        .await
        .unwrap();
    }

    let page = db
        .query(
            &ExtractionFilter::for_corporation(CORPORATION),
            PageRequest::new(1, 2, 1000),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(
        page.items.iter().map(|r| r.structure_id).collect::<Vec<_>>(),
        vec![100, 102]
    );

    let page = db
        .query(
            &ExtractionFilter::for_corporation(CORPORATION),
            PageRequest::new(2, 2, 1000),
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.from(), Some(3));

    let window = ExtractionFilter {
        arrival_window: Some(TimeRange::new(
            t0() + Duration::days(4),
            t0() + Duration::days(4) + Duration::hours(1),
        )),
        ..Default::default()
    };
    let page = db.query(&window, PageRequest::new(1, 50, 1000)).await.unwrap();
    assert_eq!(page.total, 2);

    let beyond = db
        .query(&ExtractionFilter::default(), PageRequest::new(10, 50, 1000))
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 5);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_aggregate(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    let now = t0() + Duration::days(5);

    // Active: arrived at t0 + 4d, decays at t0 + 6d
    db.upsert(
        &NewExtraction {
            moon_value: Some(100.0),
            status: ExtractionStatus::Active,
            ..extraction(1, CORPORATION, t0())
        },
        now,
    )
    .await
    .unwrap();
    // Upcoming: arrives at now + 12h
    db.upsert(
        &NewExtraction {
            moon_value: Some(50.0),
            ..extraction(2, CORPORATION, now - Duration::days(4) + Duration::hours(12))
        },
        now,
    )
    .await
    .unwrap();
    // Completed long ago, its value is not counted
    db.upsert(
        &NewExtraction {
            moon_value: Some(1000.0),
            status: ExtractionStatus::Completed,
            ..extraction(3, CORPORATION, t0() - Duration::days(30))
        },
        now,
    )
    .await
    .unwrap();
    // Other corporation
    db.upsert(&extraction(4, 98_000_002, t0()), now)
        .await
        .unwrap();

    let stats = db
        .aggregate(
            &ExtractionFilter::for_corporation(CORPORATION),
            now,
            Duration::hours(24),
        )
        .await
        .unwrap();
    assert_eq!(stats.total_extractions, 3);
    assert_eq!(stats.active_extractions, 1);
    assert_eq!(stats.completed_extractions, 1);
    assert_eq!(stats.cancelled_extractions, 0);
    assert_eq!(stats.upcoming, 1);
    assert_eq!(stats.total_estimated_value, Some(150.0));

    let everything = db
        .aggregate(&ExtractionFilter::default(), now, Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(everything.total_extractions, 4);
    assert_eq!(everything.active_extractions, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_aggregate_without_values(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    db.upsert(&extraction(STRUCTURE, CORPORATION, t0()), t0())
        .await
        .unwrap();

    let stats = db
        .aggregate(&ExtractionFilter::default(), t0(), Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(stats.total_extractions, 1);
    assert_eq!(stats.total_estimated_value, None);
}
