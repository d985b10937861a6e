use sqlx::sqlite::SqlitePoolOptions;

use crate::db::{
    DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME, authenticate_user, behavior_summary,
    create_behavior, create_student, delete_behavior, delete_behavior_type, delete_student,
    get_student, list_behavior_types, list_behaviors, list_students, seed_default_admin,
    seed_default_behavior_types, update_student,
};
use crate::error::AppError;
use crate::models::{COMMENDATION_CATEGORY, NewStudent, VIOLATION_CATEGORY};
use crate::test::utils::TestDbBuilder;

fn new_student(name: &str, student_id: &str) -> NewStudent {
    NewStudent {
        name: name.to_string(),
        student_id: student_id.to_string(),
        class: None,
        grade: None,
        photo_url: None,
        address: None,
        emergency_contact: None,
        emergency_phone: None,
        notes: None,
    }
}

#[rocket::async_test]
async fn seed_default_admin_is_idempotent() {
    let test_db = TestDbBuilder::new().build().await.unwrap();

    // The builder already seeded once; seeding again must not duplicate.
    seed_default_admin(&test_db.pool).await.unwrap();
    seed_default_admin(&test_db.pool).await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(DEFAULT_ADMIN_USERNAME)
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);

    let user = authenticate_user(&test_db.pool, DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
        .await
        .unwrap();
    assert!(user.is_some());

    let user = authenticate_user(&test_db.pool, DEFAULT_ADMIN_USERNAME, "wrong")
        .await
        .unwrap();
    assert!(user.is_none());
}

#[rocket::async_test]
async fn seed_default_behavior_types_is_idempotent() {
    let test_db = TestDbBuilder::new().build().await.unwrap();

    seed_default_behavior_types(&test_db.pool).await.unwrap();
    seed_default_behavior_types(&test_db.pool).await.unwrap();

    let types = list_behavior_types(&test_db.pool).await.unwrap();
    assert_eq!(types.len(), 8);
}

#[rocket::async_test]
async fn duplicate_student_id_persists_exactly_one_row() {
    let test_db = TestDbBuilder::new().build().await.unwrap();

    create_student(&test_db.pool, &new_student("Alice", "S001"))
        .await
        .unwrap();

    let result = create_student(&test_db.pool, &new_student("Bob", "S001")).await;
    assert!(matches!(result, Err(AppError::Duplicate(_))));

    let students = list_students(&test_db.pool).await.unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].name, "Alice");
}

#[rocket::async_test]
async fn blank_student_identity_is_rejected_before_storage() {
    let test_db = TestDbBuilder::new().build().await.unwrap();

    let result = create_student(&test_db.pool, &new_student("   ", "S010")).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let result = create_student(&test_db.pool, &new_student("Riley", " \t ")).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let students = list_students(&test_db.pool).await.unwrap();
    assert!(students.is_empty());
}

#[rocket::async_test]
async fn update_trims_fields_like_create() {
    let test_db = TestDbBuilder::new().student("Alice", "S001").build().await.unwrap();
    let alice_id = test_db.student_id("S001").unwrap();

    update_student(&test_db.pool, alice_id, &new_student("  Alice Chen  ", " S001 "))
        .await
        .unwrap();

    let student = get_student(&test_db.pool, alice_id).await.unwrap();
    assert_eq!(student.name, "Alice Chen");
    assert_eq!(student.student_id, "S001");

    // The blank check applies to updates too.
    let result = update_student(&test_db.pool, alice_id, &new_student("   ", "S001")).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let student = get_student(&test_db.pool, alice_id).await.unwrap();
    assert_eq!(student.name, "Alice Chen");
}

#[rocket::async_test]
async fn prepare_database_runs_clean_on_restart() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    crate::prepare_database(&pool).await.unwrap();
    crate::prepare_database(&pool).await.unwrap();

    let types = list_behavior_types(&pool).await.unwrap();
    assert_eq!(types.len(), 8);

    let user = authenticate_user(&pool, DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
        .await
        .unwrap();
    assert!(user.is_some());
}

#[rocket::async_test]
async fn counts_follow_ledger_writes() {
    let test_db = TestDbBuilder::new().student("Alice", "S001").build().await.unwrap();
    let alice_id = test_db.student_id("S001").unwrap();

    let students = list_students(&test_db.pool).await.unwrap();
    assert_eq!(students[0].violation_count, 0);
    assert_eq!(students[0].excellent_count, 0);

    let violation = create_behavior(&test_db.pool, alice_id, VIOLATION_CATEGORY, Some("late"))
        .await
        .unwrap();
    create_behavior(&test_db.pool, alice_id, COMMENDATION_CATEGORY, Some("helped"))
        .await
        .unwrap();
    // A non-canonical category label is stored but not specially counted.
    create_behavior(&test_db.pool, alice_id, "neutral", None)
        .await
        .unwrap();

    let students = list_students(&test_db.pool).await.unwrap();
    assert_eq!(students[0].violation_count, 1);
    assert_eq!(students[0].excellent_count, 1);

    delete_behavior(&test_db.pool, violation.id).await.unwrap();

    let students = list_students(&test_db.pool).await.unwrap();
    assert_eq!(students[0].violation_count, 0);
    assert_eq!(students[0].excellent_count, 1);
}

#[rocket::async_test]
async fn deleting_student_retains_ledger_rows() {
    let test_db = TestDbBuilder::new()
        .student("Alice", "S001")
        .behavior("S001", "violation", "late")
        .build()
        .await
        .unwrap();
    let alice_id = test_db.student_id("S001").unwrap();

    delete_student(&test_db.pool, alice_id).await.unwrap();

    // The orphaned row survives; it just no longer joins to a student.
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM behaviors WHERE student_id = ?")
        .bind(alice_id)
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);

    let listed = list_behaviors(&test_db.pool).await.unwrap();
    assert!(listed.is_empty());
}

#[rocket::async_test]
async fn update_missing_student_reports_not_found() {
    let test_db = TestDbBuilder::new().build().await.unwrap();

    let result = update_student(&test_db.pool, 42, &new_student("Ghost", "S999")).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[rocket::async_test]
async fn behavior_type_delete_distinguishes_conflict_and_not_found() {
    let test_db = TestDbBuilder::new()
        .student("Alice", "S001")
        .behavior_type("Tardy", "violation")
        .behavior("S001", "Tardy", "late")
        .build()
        .await
        .unwrap();

    let types = list_behavior_types(&test_db.pool).await.unwrap();
    let tardy_id = types[0].id;

    let result = delete_behavior_type(&test_db.pool, tardy_id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let result = delete_behavior_type(&test_db.pool, tardy_id + 100).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // Once the referencing behavior is gone the delete goes through.
    let behaviors = list_behaviors(&test_db.pool).await.unwrap();
    delete_behavior(&test_db.pool, behaviors[0].id).await.unwrap();
    delete_behavior_type(&test_db.pool, tardy_id).await.unwrap();

    let types = list_behavior_types(&test_db.pool).await.unwrap();
    assert!(types.is_empty());
}

#[rocket::async_test]
async fn summary_groups_by_student_and_type() {
    let test_db = TestDbBuilder::new()
        .student("Alice", "S001")
        .student("Bob", "S002")
        .behavior("S001", "violation", "late")
        .behavior("S001", "violation", "very late")
        .behavior("S001", "commendation", "helped")
        .behavior("S002", "violation", "fighting")
        .build()
        .await
        .unwrap();

    let summary = behavior_summary(&test_db.pool).await.unwrap();
    assert_eq!(summary.len(), 3);

    let alice_violations = summary
        .iter()
        .find(|r| r.student_name == "Alice" && r.behavior_type == "violation")
        .unwrap();
    assert_eq!(alice_violations.count, 2);

    let bob_violations = summary
        .iter()
        .find(|r| r.student_name == "Bob" && r.behavior_type == "violation")
        .unwrap();
    assert_eq!(bob_violations.count, 1);
}
