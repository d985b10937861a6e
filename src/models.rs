use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// Category literals the aggregation queries treat specially. Other category
/// values are accepted but only show up in the grouped summaries.
pub const VIOLATION_CATEGORY: &str = "violation";
pub const COMMENDATION_CATEGORY: &str = "commendation";

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            role: user.role.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub student_id: String,
    pub class: Option<String>,
    pub grade: Option<String>,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbStudent {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub student_id: Option<String>,
    pub class: Option<String>,
    pub grade: Option<String>,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
}

impl From<DbStudent> for Student {
    fn from(s: DbStudent) -> Self {
        Self {
            id: s.id.unwrap_or_default(),
            name: s.name.unwrap_or_default(),
            student_id: s.student_id.unwrap_or_default(),
            class: s.class,
            grade: s.grade,
            photo_url: s.photo_url,
            address: s.address,
            emergency_contact: s.emergency_contact,
            emergency_phone: s.emergency_phone,
            notes: s.notes,
        }
    }
}

/// Fields accepted when creating or replacing a student record.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub student_id: String,
    pub class: Option<String>,
    pub grade: Option<String>,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
}

/// A student row annotated with its per-category behavior counts, computed
/// per call by correlated subqueries rather than stored.
#[derive(Debug, Serialize, Clone)]
pub struct StudentWithCounts {
    pub id: i64,
    pub name: String,
    pub student_id: String,
    pub class: Option<String>,
    pub grade: Option<String>,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
    pub violation_count: i64,
    pub excellent_count: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbStudentWithCounts {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub student_id: Option<String>,
    pub class: Option<String>,
    pub grade: Option<String>,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
    pub violation_count: Option<i64>,
    pub excellent_count: Option<i64>,
}

impl From<DbStudentWithCounts> for StudentWithCounts {
    fn from(s: DbStudentWithCounts) -> Self {
        Self {
            id: s.id.unwrap_or_default(),
            name: s.name.unwrap_or_default(),
            student_id: s.student_id.unwrap_or_default(),
            class: s.class,
            grade: s.grade,
            photo_url: s.photo_url,
            address: s.address,
            emergency_contact: s.emergency_contact,
            emergency_phone: s.emergency_phone,
            notes: s.notes,
            violation_count: s.violation_count.unwrap_or_default(),
            excellent_count: s.excellent_count.unwrap_or_default(),
        }
    }
}

/// One recorded disciplinary or commendation event. `behavior_type` holds a
/// type *name* string, deliberately not a foreign key into behavior_types.
#[derive(Debug, Serialize, Clone)]
pub struct Behavior {
    pub id: i64,
    pub student_id: i64,
    pub behavior_type: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct BehaviorWithStudent {
    pub id: i64,
    pub student_id: i64,
    pub behavior_type: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub student_name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbBehaviorWithStudent {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub behavior_type: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub student_name: Option<String>,
}

impl From<DbBehaviorWithStudent> for BehaviorWithStudent {
    fn from(b: DbBehaviorWithStudent) -> Self {
        Self {
            id: b.id.unwrap_or_default(),
            student_id: b.student_id.unwrap_or_default(),
            behavior_type: b.behavior_type.unwrap_or_default(),
            description: b.description,
            date: to_utc(b.date),
            student_name: b.student_name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct BehaviorType {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbBehaviorType {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbBehaviorType> for BehaviorType {
    fn from(t: DbBehaviorType) -> Self {
        Self {
            id: t.id.unwrap_or_default(),
            name: t.name.unwrap_or_default(),
            category: t.category.unwrap_or_default(),
            description: t.description,
            created_at: to_utc(t.created_at),
        }
    }
}

/// Per-student grouping of behaviors by type name, with the individual
/// descriptions concatenated the way GROUP_CONCAT leaves them.
#[derive(Debug, Serialize, Clone)]
pub struct BehaviorTypeStat {
    pub behavior_type: String,
    pub count: i64,
    pub descriptions: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbBehaviorTypeStat {
    pub behavior_type: Option<String>,
    pub count: Option<i64>,
    pub descriptions: Option<String>,
}

impl From<DbBehaviorTypeStat> for BehaviorTypeStat {
    fn from(s: DbBehaviorTypeStat) -> Self {
        Self {
            behavior_type: s.behavior_type.unwrap_or_default(),
            count: s.count.unwrap_or_default(),
            descriptions: s.descriptions,
        }
    }
}

/// One row of the ledger-wide summary: behaviors grouped by the pair
/// (student name, behavior type).
#[derive(Debug, Serialize, Clone)]
pub struct BehaviorSummaryRow {
    pub student_name: String,
    pub behavior_type: String,
    pub count: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbBehaviorSummaryRow {
    pub student_name: Option<String>,
    pub behavior_type: Option<String>,
    pub count: Option<i64>,
}

impl From<DbBehaviorSummaryRow> for BehaviorSummaryRow {
    fn from(r: DbBehaviorSummaryRow) -> Self {
        Self {
            student_name: r.student_name.unwrap_or_default(),
            behavior_type: r.behavior_type.unwrap_or_default(),
            count: r.count.unwrap_or_default(),
        }
    }
}
