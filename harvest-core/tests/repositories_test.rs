//! Repository integration tests. Each test gets its own migrated database
//! through `#[sqlx::test]`.

use chrono::Duration;
use harvest_core::{
    Classification, ClassificationSource, Database, DocumentMetadata, HarvestError, TaskCounters,
    TaskStatus,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

fn search_params() -> serde_json::Value {
    json!({"date_from": "01.01.2024", "date_to": "31.01.2024"})
}

async fn register_worker(db: &Database, name: &str) -> Uuid {
    let api_key = format!("key-{name}");
    db.workers()
        .register(name, Some("10.0.0.5"), Some(api_key.as_str()))
        .await
        .unwrap()
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn create_and_get_round_trips_the_task(pool: PgPool) {
    let db = Database::from_pool(pool);

    let task_id = db.tasks().create(search_params(), 3, 50).await.unwrap();
    let task = db.tasks().get(task_id).await.unwrap().unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.start_page, 3);
    assert_eq!(task.max_documents, 50);
    assert!(task.worker_id.is_none());
    assert_eq!(task.search_params, search_params());
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn create_rejects_out_of_range_parameters(pool: PgPool) {
    let db = Database::from_pool(pool);

    assert!(db.tasks().create(search_params(), 0, 50).await.is_err());
    assert!(db.tasks().create(search_params(), 1, 0).await.is_err());
    assert!(db.tasks().create(search_params(), 1, 1001).await.is_err());
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn lease_hands_each_task_to_exactly_one_worker(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker_a = register_worker(&db, "a").await;
    let worker_b = register_worker(&db, "b").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();

    let (first, second) = tokio::join!(
        db.tasks().lease(worker_a),
        db.tasks().lease(worker_b),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    // One claim succeeds, the other sees an empty queue.
    assert_eq!(first.is_some() as u8 + second.is_some() as u8, 1);
    let leased = first.or(second).unwrap();
    assert_eq!(leased.status, TaskStatus::Assigned);
    assert!(leased.assigned_at.is_some());
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn lease_claims_the_oldest_pending_task(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let worker = register_worker(&db, "a").await;

    let older = db.tasks().create(search_params(), 1, 10).await.unwrap();
    // Separate timestamps so ordering is deterministic.
    sqlx::query("UPDATE tasks SET created_at = created_at - INTERVAL '1 minute' WHERE id = $1")
        .bind(older)
        .execute(&pool)
        .await
        .unwrap();
    db.tasks().create(search_params(), 1, 10).await.unwrap();

    let leased = db.tasks().lease(worker).await.unwrap().unwrap();
    assert_eq!(leased.id, older);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn start_is_idempotent_and_keeps_started_at(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();

    db.tasks().start(task.id).await.unwrap();
    let first = db.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(first.status, TaskStatus::InProgress);
    let started_at = first.started_at.unwrap();

    db.tasks().start(task.id).await.unwrap();
    let second = db.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(second.started_at, Some(started_at));
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn completion_credits_the_owning_worker(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();
    db.tasks().start(task.id).await.unwrap();

    let completed = db
        .tasks()
        .complete(
            task.id,
            TaskCounters {
                downloaded: 7,
                failed: 1,
                skipped: 2,
            },
            Some(json!({"pages": 3})),
            None,
        )
        .await
        .unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.documents_downloaded, 7);

    let stored = db.workers().get(worker).await.unwrap().unwrap();
    assert_eq!(stored.total_tasks_completed, 1);
    assert_eq!(stored.total_documents_downloaded, 7);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn repeated_completion_reports_leave_the_task_untouched(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();
    db.tasks().start(task.id).await.unwrap();

    let counters = TaskCounters {
        downloaded: 5,
        failed: 0,
        skipped: 0,
    };
    let first = db
        .tasks()
        .complete(task.id, counters, None, None)
        .await
        .unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
    let completed_at = first.completed_at;

    // The retry of a report whose response was lost: same call again,
    // then a contradictory one claiming failure.
    let second = db
        .tasks()
        .complete(task.id, counters, None, None)
        .await
        .unwrap();
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.completed_at, completed_at);

    let third = db
        .tasks()
        .complete(
            task.id,
            TaskCounters::default(),
            None,
            Some("late failure report".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(third.status, TaskStatus::Completed);
    assert!(third.error_message.is_none());

    // Lifetime counters moved exactly once.
    let stored = db.workers().get(worker).await.unwrap().unwrap();
    assert_eq!(stored.total_tasks_completed, 1);
    assert_eq!(stored.total_documents_downloaded, 5);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn completion_rejects_negative_counters(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();

    let result = db
        .tasks()
        .complete(
            task.id,
            TaskCounters {
                downloaded: -3,
                failed: 0,
                skipped: 0,
            },
            None,
            None,
        )
        .await;
    assert!(matches!(result, Err(HarvestError::Validation(_))));

    let stored = db.workers().get(worker).await.unwrap().unwrap();
    assert_eq!(stored.total_documents_downloaded, 0);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn start_requires_a_leased_task(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    let pending = db.tasks().create(search_params(), 1, 10).await.unwrap();
    assert!(matches!(
        db.tasks().start(pending).await,
        Err(HarvestError::Validation(_))
    ));

    // Same task once leased and completed: terminal, no longer startable.
    let task = db.tasks().lease(worker).await.unwrap().unwrap();
    assert_eq!(task.id, pending);
    db.tasks()
        .complete(task.id, TaskCounters::default(), None, None)
        .await
        .unwrap();
    assert!(matches!(
        db.tasks().start(task.id).await,
        Err(HarvestError::Validation(_))
    ));

    assert!(matches!(
        db.tasks().start(Uuid::new_v4()).await,
        Err(HarvestError::NotFound(_))
    ));
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn completion_with_error_marks_failed(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();

    let completed = db
        .tasks()
        .complete(
            task.id,
            TaskCounters::default(),
            None,
            Some("captcha wall".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(completed.status, TaskStatus::Failed);
    assert_eq!(completed.error_message.as_deref(), Some("captcha wall"));
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn stale_in_progress_tasks_return_to_pending(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();
    db.tasks().start(task.id).await.unwrap();

    sqlx::query("UPDATE tasks SET started_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(task.id)
        .execute(&pool)
        .await
        .unwrap();

    let reset = db.tasks().reset_stale(Duration::minutes(30)).await.unwrap();
    assert_eq!(reset, 1);

    let recovered = db.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, TaskStatus::Pending);
    assert!(recovered.worker_id.is_none());
    assert!(recovered.started_at.is_none());

    // A second sweep finds nothing.
    assert_eq!(db.tasks().reset_stale(Duration::minutes(30)).await.unwrap(), 0);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn fresh_in_progress_tasks_survive_the_sweep(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();
    db.tasks().start(task.id).await.unwrap();

    assert_eq!(db.tasks().reset_stale(Duration::minutes(30)).await.unwrap(), 0);
    let untouched = db.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, TaskStatus::InProgress);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn download_statistics_derive_speed_and_eta(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();
    db.tasks().start(task.id).await.unwrap();

    for i in 0..4 {
        let item_id = format!("doc-{i}");
        db.tasks()
            .record_item_start(task.id, &item_id, None, Some(worker))
            .await
            .unwrap();
        db.tasks().record_item_complete(task.id, &item_id).await.unwrap();
    }
    // Stretch each item to a known 2s duration.
    sqlx::query(
        "UPDATE task_items SET started_at = completed_at - INTERVAL '2 seconds' WHERE task_id = $1",
    )
    .bind(task.id)
    .execute(&pool)
    .await
    .unwrap();

    let stats = db.tasks().download_statistics(task.id).await.unwrap().unwrap();
    assert_eq!(stats.started_count, 4);
    let speed = stats.download_speed_docs_per_second.unwrap();
    assert!((speed - 0.5).abs() < 0.05, "speed was {speed}");
    assert!(stats.estimated_time_remaining_seconds.unwrap() > 0.0);
    assert!((stats.avg_download_time_seconds.unwrap() - 2.0).abs() < 0.1);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn download_statistics_stay_absent_without_completed_items(pool: PgPool) {
    let db = Database::from_pool(pool);

    let task_id = db.tasks().create(search_params(), 1, 10).await.unwrap();
    let stats = db.tasks().download_statistics(task_id).await.unwrap().unwrap();

    assert!(stats.download_speed_docs_per_second.is_none());
    assert!(stats.estimated_time_remaining_seconds.is_none());
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn worker_registration_is_idempotent_per_api_key(pool: PgPool) {
    let db = Database::from_pool(pool);

    let first = db
        .workers()
        .register("scraper-1", None, Some("shared-key"))
        .await
        .unwrap();
    let second = db
        .workers()
        .register("scraper-1", None, Some("shared-key"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(db.workers().list_all().await.unwrap().len(), 1);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn heartbeat_reports_unknown_workers(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    assert!(db.workers().heartbeat(worker).await.unwrap());
    assert!(!db.workers().heartbeat(Uuid::new_v4()).await.unwrap());
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn duplicate_document_registration_returns_the_same_system_id(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    let metadata = DocumentMetadata {
        external_id: Some("115363895".to_string()),
        reg_number: Some("115363895".to_string()),
        court_name: Some("Шевченківський районний суд міста Києва".to_string()),
        ..Default::default()
    };
    let classification = Classification {
        court_region: Some("11".to_string()),
        instance_type: Some("1".to_string()),
        source: Some(ClassificationSource::ExtractedFromCourtName),
    };

    let first = db
        .documents()
        .register(&metadata, &classification, None, Some(worker))
        .await
        .unwrap();
    assert!(first.newly_created);

    let second = db
        .documents()
        .register(&metadata, &classification, None, Some(worker))
        .await
        .unwrap();
    assert!(!second.newly_created);
    assert_eq!(first.system_id, second.system_id);

    // The lifetime counter moved exactly once.
    let stored = db.workers().get(worker).await.unwrap().unwrap();
    assert_eq!(stored.total_documents_downloaded, 1);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn concurrent_first_registrations_converge_on_one_row(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker_a = register_worker(&db, "a").await;
    let worker_b = register_worker(&db, "b").await;

    let metadata = DocumentMetadata {
        external_id: Some("600001".to_string()),
        ..Default::default()
    };

    let classification = Classification::default();
    let (first, second) = tokio::join!(
        db.documents()
            .register(&metadata, &classification, None, Some(worker_a)),
        db.documents()
            .register(&metadata, &classification, None, Some(worker_b)),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    // One insert wins, the other lands on the merge path.
    assert_eq!(first.system_id, second.system_id);
    assert_eq!(first.newly_created as u8 + second.newly_created as u8, 1);

    let a = db.workers().get(worker_a).await.unwrap().unwrap();
    let b = db.workers().get(worker_b).await.unwrap().unwrap();
    assert_eq!(a.total_documents_downloaded + b.total_documents_downloaded, 1);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn merge_fills_gaps_without_stealing_ownership(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker_a = register_worker(&db, "a").await;
    let worker_b = register_worker(&db, "b").await;

    let sparse = DocumentMetadata {
        external_id: Some("200001".to_string()),
        ..Default::default()
    };
    let first = db
        .documents()
        .register(&sparse, &Classification::default(), None, Some(worker_a))
        .await
        .unwrap();

    let richer = DocumentMetadata {
        external_id: Some("200001".to_string()),
        judge_name: Some("Петренко О. В.".to_string()),
        decision_date: Some("15.03.2024".to_string()),
        ..Default::default()
    };
    let classification = Classification {
        court_region: Some("15".to_string()),
        instance_type: None,
        source: Some(ClassificationSource::SearchParams),
    };
    let second = db
        .documents()
        .register(&richer, &classification, None, Some(worker_b))
        .await
        .unwrap();
    assert_eq!(first.system_id, second.system_id);

    let doc = db
        .documents()
        .get_by_system_id(first.system_id)
        .await
        .unwrap()
        .unwrap();
    // Descriptive gaps filled, owner unchanged.
    assert_eq!(doc.judge_name.as_deref(), Some("Петренко О. В."));
    assert_eq!(
        doc.decision_date,
        Some(chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    );
    assert_eq!(doc.worker_id, Some(worker_a));
    assert_eq!(doc.court_region.as_deref(), Some("15"));

    // No second credit for the original owner, none for the latecomer.
    let a = db.workers().get(worker_a).await.unwrap().unwrap();
    let b = db.workers().get(worker_b).await.unwrap().unwrap();
    assert_eq!(a.total_documents_downloaded, 1);
    assert_eq!(b.total_documents_downloaded, 0);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn classification_is_never_overwritten(pool: PgPool) {
    let db = Database::from_pool(pool);

    let metadata = DocumentMetadata {
        external_id: Some("300001".to_string()),
        ..Default::default()
    };
    let original = Classification {
        court_region: Some("14".to_string()),
        instance_type: Some("2".to_string()),
        source: Some(ClassificationSource::SearchParams),
    };
    db.documents()
        .register(&metadata, &original, None, None)
        .await
        .unwrap();

    let conflicting = Classification {
        court_region: Some("19".to_string()),
        instance_type: Some("1".to_string()),
        source: Some(ClassificationSource::ExtractedFromCourtName),
    };
    let outcome = db
        .documents()
        .register(&metadata, &conflicting, None, None)
        .await
        .unwrap();

    assert_eq!(outcome.classification.court_region.as_deref(), Some("14"));
    assert_eq!(
        outcome.classification.source,
        Some(ClassificationSource::SearchParams)
    );
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn registration_without_identifiers_generates_one(pool: PgPool) {
    let db = Database::from_pool(pool);

    let outcome = db
        .documents()
        .register(&DocumentMetadata::default(), &Classification::default(), None, None)
        .await
        .unwrap();

    let doc = db
        .documents()
        .get_by_system_id(outcome.system_id)
        .await
        .unwrap()
        .unwrap();
    assert!(doc.external_id.starts_with("temp_"));
    assert_eq!(doc.external_id.len(), "temp_".len() + 12);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn lookup_works_by_external_id_and_reg_number(pool: PgPool) {
    let db = Database::from_pool(pool);

    let metadata = DocumentMetadata {
        external_id: Some("400001".to_string()),
        reg_number: Some("400001/24".to_string()),
        ..Default::default()
    };
    db.documents()
        .register(&metadata, &Classification::default(), None, None)
        .await
        .unwrap();

    assert!(db.documents().get_by_external_id("400001").await.unwrap().is_some());
    assert!(db.documents().get_by_external_id("400001/24").await.unwrap().is_some());
    assert!(db.documents().get_by_external_id("missing").await.unwrap().is_none());
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn worker_statistics_aggregate_tasks_and_documents(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    let task = db.tasks().lease(worker).await.unwrap().unwrap();
    db.tasks().start(task.id).await.unwrap();
    db.tasks()
        .complete(
            task.id,
            TaskCounters {
                downloaded: 2,
                failed: 0,
                skipped: 0,
            },
            None,
            None,
        )
        .await
        .unwrap();

    let metadata = DocumentMetadata {
        external_id: Some("500001".to_string()),
        ..Default::default()
    };
    db.documents()
        .register(&metadata, &Classification::default(), Some(task.id), Some(worker))
        .await
        .unwrap();

    let stats = db.workers().statistics(worker).await.unwrap().unwrap();
    assert_eq!(stats.task_statistics.total_tasks, 1);
    assert_eq!(stats.task_statistics.completed_tasks, 1);
    assert_eq!(stats.task_statistics.total_docs_from_tasks, 2);
    assert_eq!(stats.document_statistics.total_documents, 1);
    assert_eq!(stats.worker.total_documents_downloaded, 3);
}

#[sqlx::test(migrator = "harvest_core::MIGRATOR")]
async fn status_counts_cover_every_state(pool: PgPool) {
    let db = Database::from_pool(pool);
    let worker = register_worker(&db, "a").await;

    db.tasks().create(search_params(), 1, 10).await.unwrap();
    db.tasks().create(search_params(), 1, 10).await.unwrap();
    db.tasks().lease(worker).await.unwrap().unwrap();

    let counts = db.tasks().status_counts().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.assigned, 1);
    assert_eq!(counts.completed, 0);
}
