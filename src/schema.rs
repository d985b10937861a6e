use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

/// Declarative target schema, applied idempotently at startup.
///
/// `behaviors.student_id` and `behaviors.behavior_type` are deliberately not
/// foreign keys: a behavior keeps its student id after the student is deleted
/// (retained for audit), and `behavior_type` stores a type *name* string so
/// renaming or deleting a taxonomy entry never rewrites history.
pub const CURRENT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    role TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS behavior_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    description TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    student_id TEXT NOT NULL UNIQUE,
    class TEXT,
    grade TEXT,
    photo_url TEXT,
    address TEXT,
    emergency_contact TEXT,
    emergency_phone TEXT,
    notes TEXT
);

CREATE TABLE IF NOT EXISTS behaviors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER,
    behavior_type TEXT,
    description TEXT,
    date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Ensuring database schema");

    sqlx::raw_sql(CURRENT_SCHEMA).execute(pool).await?;

    Ok(())
}
