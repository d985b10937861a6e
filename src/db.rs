use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    Behavior, BehaviorSummaryRow, BehaviorType, BehaviorTypeStat, BehaviorWithStudent,
    COMMENDATION_CATEGORY, DbBehaviorSummaryRow, DbBehaviorType, DbBehaviorTypeStat,
    DbBehaviorWithStudent, DbStudent, DbStudentWithCounts, DbUser, NewStudent, Student,
    StudentWithCounts, User, VIOLATION_CATEGORY,
};

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Taxonomy entries seeded on first start. INSERT OR IGNORE keeps re-runs
/// from duplicating them, and operators can delete any that are unused.
const DEFAULT_BEHAVIOR_TYPES: &[(&str, &str, &str)] = &[
    ("Late arrival", VIOLATION_CATEGORY, "Arrived late to class"),
    (
        "Early departure",
        VIOLATION_CATEGORY,
        "Left early without permission",
    ),
    (
        "Fighting",
        VIOLATION_CATEGORY,
        "Physical altercation with others",
    ),
    ("Cheating", VIOLATION_CATEGORY, "Cheated on an exam"),
    (
        "Volunteering",
        COMMENDATION_CATEGORY,
        "Took part in volunteer service",
    ),
    (
        "Academic improvement",
        COMMENDATION_CATEGORY,
        "Marked improvement in grades",
    ),
    (
        "Helping others",
        COMMENDATION_CATEGORY,
        "Helped fellow students",
    ),
    (
        "Contest award",
        COMMENDATION_CATEGORY,
        "Won an award in a competition",
    ),
];

#[instrument(skip(pool))]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<DbUser>, AppError> {
    info!("Fetching user by username");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, password, role FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = find_user_by_username(pool, username).await?;

    match row {
        Some(user) => {
            let hash = user.password.clone().unwrap_or_default();
            match bcrypt::verify(password, &hash) {
                Ok(true) => Ok(Some(User::from(user))),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

/// Idempotent bootstrap of the default administrator account. Safe to call
/// on every start: the existence check plus the username unique constraint
/// both prevent a duplicate insert.
#[instrument(skip(pool))]
pub async fn seed_default_admin(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    if find_user_by_username(pool, DEFAULT_ADMIN_USERNAME)
        .await?
        .is_some()
    {
        return Ok(());
    }

    info!("Creating default administrator account");
    let hashed_password = bcrypt::hash(DEFAULT_ADMIN_PASSWORD, bcrypt::DEFAULT_COST)?;

    sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, 'admin')")
        .bind(DEFAULT_ADMIN_USERNAME)
        .bind(hashed_password)
        .execute(pool)
        .await
        .map_err(|e| AppError::duplicate_or_db(e, "Default administrator already exists"))?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn seed_default_behavior_types(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Seeding default behavior types");
    for (name, category, description) in DEFAULT_BEHAVIOR_TYPES {
        sqlx::query(
            "INSERT OR IGNORE INTO behavior_types (name, category, description) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(category)
        .bind(description)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_students(pool: &Pool<Sqlite>) -> Result<Vec<StudentWithCounts>, AppError> {
    info!("Listing students with behavior counts");
    let rows = sqlx::query_as::<_, DbStudentWithCounts>(
        "SELECT
            s.id, s.name, s.student_id, s.class, s.grade, s.photo_url,
            s.address, s.emergency_contact, s.emergency_phone, s.notes,
            (SELECT COUNT(*) FROM behaviors WHERE student_id = s.id AND behavior_type = ?)
                AS violation_count,
            (SELECT COUNT(*) FROM behaviors WHERE student_id = s.id AND behavior_type = ?)
                AS excellent_count
         FROM students s",
    )
    .bind(VIOLATION_CATEGORY)
    .bind(COMMENDATION_CATEGORY)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StudentWithCounts::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_student(pool: &Pool<Sqlite>, id: i64) -> Result<Student, AppError> {
    info!("Fetching student by ID");
    let row = sqlx::query_as::<_, DbStudent>(
        "SELECT id, name, student_id, class, grade, photo_url,
                address, emergency_contact, emergency_phone, notes
         FROM students WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(student) => Ok(Student::from(student)),
        _ => Err(AppError::NotFound(format!(
            "Student with id {} not found",
            id
        ))),
    }
}

/// Both write paths persist trimmed values, so the identity fields must be
/// non-blank after trimming rather than merely non-empty.
fn check_student_identity(student: &NewStudent) -> Result<(), AppError> {
    if student.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if student.student_id.trim().is_empty() {
        return Err(AppError::Validation("Student ID is required".to_string()));
    }
    Ok(())
}

#[instrument(skip_all, fields(student_id = %student.student_id))]
pub async fn create_student(
    pool: &Pool<Sqlite>,
    student: &NewStudent,
) -> Result<Student, AppError> {
    info!("Creating student");
    check_student_identity(student)?;

    // Early exit only; the unique constraint is the source of truth for
    // concurrent callers racing through this check.
    let existing = sqlx::query_as::<_, (i64,)>("SELECT id FROM students WHERE student_id = ?")
        .bind(student.student_id.trim())
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Duplicate("Student ID already exists".to_string()));
    }

    let res = sqlx::query(
        "INSERT INTO students (
            name, student_id, class, grade, photo_url,
            address, emergency_contact, emergency_phone, notes
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(student.name.trim())
    .bind(student.student_id.trim())
    .bind(student.class.as_deref().map(str::trim))
    .bind(student.grade.as_deref().map(str::trim))
    .bind(student.photo_url.as_deref())
    .bind(student.address.as_deref().map(str::trim))
    .bind(student.emergency_contact.as_deref().map(str::trim))
    .bind(student.emergency_phone.as_deref().map(str::trim))
    .bind(student.notes.as_deref().map(str::trim))
    .execute(pool)
    .await
    .map_err(|e| AppError::duplicate_or_db(e, "Student ID already exists"))?;

    get_student(pool, res.last_insert_rowid()).await
}

#[instrument(skip_all, fields(id))]
pub async fn update_student(
    pool: &Pool<Sqlite>,
    id: i64,
    student: &NewStudent,
) -> Result<(), AppError> {
    info!("Updating student");
    check_student_identity(student)?;

    let res = sqlx::query(
        "UPDATE students SET
            name = ?,
            student_id = ?,
            class = ?,
            grade = ?,
            photo_url = ?,
            address = ?,
            emergency_contact = ?,
            emergency_phone = ?,
            notes = ?
         WHERE id = ?",
    )
    .bind(student.name.trim())
    .bind(student.student_id.trim())
    .bind(student.class.as_deref().map(str::trim))
    .bind(student.grade.as_deref().map(str::trim))
    .bind(student.photo_url.as_deref())
    .bind(student.address.as_deref().map(str::trim))
    .bind(student.emergency_contact.as_deref().map(str::trim))
    .bind(student.emergency_phone.as_deref().map(str::trim))
    .bind(student.notes.as_deref().map(str::trim))
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::duplicate_or_db(e, "Student ID already exists"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Student with id {} not found",
            id
        )));
    }

    Ok(())
}

/// Idempotent by id: deleting an absent student still reports success.
/// Behaviors referencing the student are retained.
#[instrument(skip(pool))]
pub async fn delete_student(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting student");
    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn student_behavior_stats(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Vec<BehaviorTypeStat>, AppError> {
    info!("Getting per-type behavior stats for student");
    let rows = sqlx::query_as::<_, DbBehaviorTypeStat>(
        "SELECT
            behavior_type,
            COUNT(*) AS count,
            GROUP_CONCAT(description) AS descriptions
         FROM behaviors
         WHERE student_id = ?
         GROUP BY behavior_type",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(BehaviorTypeStat::from).collect())
}

#[instrument(skip(pool))]
pub async fn list_behaviors(pool: &Pool<Sqlite>) -> Result<Vec<BehaviorWithStudent>, AppError> {
    info!("Listing behaviors");
    let rows = sqlx::query_as::<_, DbBehaviorWithStudent>(
        "SELECT b.id, b.student_id, b.behavior_type, b.description, b.date,
                s.name AS student_name
         FROM behaviors b
         JOIN students s ON b.student_id = s.id
         ORDER BY b.date DESC, b.id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(BehaviorWithStudent::from).collect())
}

/// Neither the student id nor the behavior type name is validated here; the
/// ledger accepts whatever the caller records (see the schema notes on the
/// deliberate lack of foreign keys).
#[instrument(skip_all, fields(student_id, behavior_type))]
pub async fn create_behavior(
    pool: &Pool<Sqlite>,
    student_id: i64,
    behavior_type: &str,
    description: Option<&str>,
) -> Result<Behavior, AppError> {
    info!("Recording behavior");
    let now = Utc::now();
    let naive_now = now.naive_utc();

    let res = sqlx::query(
        "INSERT INTO behaviors (student_id, behavior_type, description, date)
         VALUES (?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(behavior_type)
    .bind(description)
    .bind(naive_now)
    .execute(pool)
    .await?;

    Ok(Behavior {
        id: res.last_insert_rowid(),
        student_id,
        behavior_type: behavior_type.to_string(),
        description: description.map(String::from),
        date: now,
    })
}

#[instrument(skip(pool))]
pub async fn delete_behavior(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting behavior");
    sqlx::query("DELETE FROM behaviors WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_behavior_types(pool: &Pool<Sqlite>) -> Result<Vec<BehaviorType>, AppError> {
    info!("Listing behavior types");
    let rows = sqlx::query_as::<_, DbBehaviorType>(
        "SELECT id, name, category, description, created_at
         FROM behavior_types
         ORDER BY category, name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(BehaviorType::from).collect())
}

#[instrument(skip_all, fields(name))]
pub async fn create_behavior_type(
    pool: &Pool<Sqlite>,
    name: &str,
    category: &str,
    description: Option<&str>,
) -> Result<BehaviorType, AppError> {
    info!("Creating behavior type");
    let res = sqlx::query("INSERT INTO behavior_types (name, category, description) VALUES (?, ?, ?)")
        .bind(name)
        .bind(category)
        .bind(description)
        .execute(pool)
        .await
        .map_err(|e| AppError::duplicate_or_db(e, "Behavior type name already exists"))?;

    let row = sqlx::query_as::<_, DbBehaviorType>(
        "SELECT id, name, category, description, created_at FROM behavior_types WHERE id = ?",
    )
    .bind(res.last_insert_rowid())
    .fetch_one(pool)
    .await?;

    Ok(BehaviorType::from(row))
}

/// Unlike the other deletes, this one distinguishes both "still referenced"
/// and "no such row": dropping a type out from under existing ledger rows is
/// blocked, and deleting a missing id is reported rather than swallowed.
#[instrument(skip(pool))]
pub async fn delete_behavior_type(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting behavior type");

    let referenced = sqlx::query_as::<_, (i64,)>(
        "SELECT COUNT(*) FROM behaviors
         WHERE behavior_type IN (SELECT name FROM behavior_types WHERE id = ?)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    if referenced.0 > 0 {
        return Err(AppError::Conflict(
            "Behavior type is in use and cannot be deleted".to_string(),
        ));
    }

    let res = sqlx::query("DELETE FROM behavior_types WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Behavior type with id {} not found",
            id
        )));
    }

    Ok(())
}

/// Full-scan aggregate over the ledger, recomputed on every call.
#[instrument(skip(pool))]
pub async fn behavior_summary(pool: &Pool<Sqlite>) -> Result<Vec<BehaviorSummaryRow>, AppError> {
    info!("Computing behavior summary");
    let rows = sqlx::query_as::<_, DbBehaviorSummaryRow>(
        "SELECT s.name AS student_name, b.behavior_type, COUNT(*) AS count
         FROM behaviors b
         JOIN students s ON b.student_id = s.id
         GROUP BY s.name, b.behavior_type",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(BehaviorSummaryRow::from).collect())
}
