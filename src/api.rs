use rocket::FromForm;
use rocket::State;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::{AuthKeys, AuthUser, issue_token};
use crate::config::AppConfig;
use crate::db::{
    authenticate_user, behavior_summary, create_behavior, create_behavior_type, create_student,
    delete_behavior, delete_behavior_type, delete_student, list_behavior_types, list_behaviors,
    list_students, student_behavior_stats, update_student,
};
use crate::error::{AppError, ErrorBody};
use crate::models::{
    Behavior, BehaviorSummaryRow, BehaviorType, BehaviorTypeStat, BehaviorWithStudent, NewStudent,
    Student, StudentWithCounts, User,
};

const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024;

/// Length validators alone accept whitespace-only input; required fields are
/// checked against their trimmed form.
fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("not_blank"));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserData,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub role: String,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn deleted() -> Self {
        Self {
            message: "Deleted successfully".to_string(),
        }
    }
}

#[post("/auth/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    keys: &State<AuthKeys>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, AppError> {
    match authenticate_user(db, &login.username, &login.password).await? {
        Some(user) => {
            let token = issue_token(keys, &user)?;
            Ok(Json(LoginResponse {
                token,
                user: UserData::from(user),
            }))
        }
        None => Err(AppError::Authentication(
            "Invalid username or password".to_string(),
        )),
    }
}

#[derive(Deserialize, Validate, Clone)]
pub struct StudentRequest {
    #[validate(custom(function = not_blank, message = "Name is required"))]
    name: String,
    #[validate(custom(function = not_blank, message = "Student ID is required"))]
    student_id: String,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    grade: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    emergency_contact: Option<String>,
    #[serde(default)]
    emergency_phone: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl From<StudentRequest> for NewStudent {
    fn from(r: StudentRequest) -> Self {
        let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string());
        Self {
            name: r.name.trim().to_string(),
            student_id: r.student_id.trim().to_string(),
            class: trimmed(r.class),
            grade: trimmed(r.grade),
            photo_url: r.photo_url,
            address: trimmed(r.address),
            emergency_contact: trimmed(r.emergency_contact),
            emergency_phone: trimmed(r.emergency_phone),
            notes: trimmed(r.notes),
        }
    }
}

#[get("/students")]
pub async fn api_get_students(
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<StudentWithCounts>>, AppError> {
    let students = list_students(db).await?;
    Ok(Json(students))
}

#[post("/students", data = "<student>")]
pub async fn api_create_student(
    student: Json<StudentRequest>,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Student>, AppError> {
    student.validate()?;

    let created = create_student(db, &NewStudent::from(student.into_inner())).await?;
    Ok(Json(created))
}

#[put("/students/<id>", data = "<student>")]
pub async fn api_update_student(
    id: i64,
    student: Json<StudentRequest>,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Student>, AppError> {
    student.validate()?;

    let fields = NewStudent::from(student.into_inner());
    update_student(db, id, &fields).await?;

    // Echo the record as supplied rather than re-reading it.
    Ok(Json(Student {
        id,
        name: fields.name,
        student_id: fields.student_id,
        class: fields.class,
        grade: fields.grade,
        photo_url: fields.photo_url,
        address: fields.address,
        emergency_contact: fields.emergency_contact,
        emergency_phone: fields.emergency_phone,
        notes: fields.notes,
    }))
}

#[delete("/students/<id>")]
pub async fn api_delete_student(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    delete_student(db, id).await?;
    Ok(Json(MessageResponse::deleted()))
}

#[get("/students/<id>/behavior-stats")]
pub async fn api_student_behavior_stats(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<BehaviorTypeStat>>, AppError> {
    let stats = student_behavior_stats(db, id).await?;
    Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct BehaviorRequest {
    student_id: i64,
    behavior_type: String,
    #[serde(default)]
    description: Option<String>,
}

#[get("/behaviors")]
pub async fn api_get_behaviors(
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<BehaviorWithStudent>>, AppError> {
    let behaviors = list_behaviors(db).await?;
    Ok(Json(behaviors))
}

#[post("/behaviors", data = "<behavior>")]
pub async fn api_create_behavior(
    behavior: Json<BehaviorRequest>,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Behavior>, AppError> {
    let created = create_behavior(
        db,
        behavior.student_id,
        &behavior.behavior_type,
        behavior.description.as_deref(),
    )
    .await?;
    Ok(Json(created))
}

#[delete("/behaviors/<id>")]
pub async fn api_delete_behavior(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    delete_behavior(db, id).await?;
    Ok(Json(MessageResponse::deleted()))
}

#[derive(Deserialize, Validate)]
pub struct BehaviorTypeRequest {
    #[validate(custom(function = not_blank, message = "Name is required"))]
    name: String,
    #[validate(custom(function = not_blank, message = "Category is required"))]
    category: String,
    #[serde(default)]
    description: Option<String>,
}

#[get("/behavior-types")]
pub async fn api_get_behavior_types(
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<BehaviorType>>, AppError> {
    let types = list_behavior_types(db).await?;
    Ok(Json(types))
}

#[post("/behavior-types", data = "<behavior_type>")]
pub async fn api_create_behavior_type(
    behavior_type: Json<BehaviorTypeRequest>,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<BehaviorType>, AppError> {
    behavior_type.validate()?;

    let created = create_behavior_type(
        db,
        &behavior_type.name,
        &behavior_type.category,
        behavior_type.description.as_deref(),
    )
    .await?;
    Ok(Json(created))
}

#[delete("/behavior-types/<id>")]
pub async fn api_delete_behavior_type(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    delete_behavior_type(db, id).await?;
    Ok(Json(MessageResponse::deleted()))
}

#[get("/analysis/behavior-summary")]
pub async fn api_behavior_summary(
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<BehaviorSummaryRow>>, AppError> {
    let summary = behavior_summary(db).await?;
    Ok(Json(summary))
}

#[derive(FromForm)]
pub struct UploadRequest<'r> {
    file: TempFile<'r>,
}

#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub message: String,
}

/// Blob-storage collaborator: one image, 2 MB cap, served back under
/// /uploads/ by the static file server.
#[post("/upload", data = "<upload>")]
pub async fn api_upload(
    mut upload: Form<UploadRequest<'_>>,
    _user: AuthUser,
    config: &State<AppConfig>,
) -> Result<Json<UploadResponse>, AppError> {
    let file = &mut upload.file;

    if file.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(
            "File must be 2MB or smaller".to_string(),
        ));
    }

    let content_type = file
        .content_type()
        .cloned()
        .ok_or_else(|| AppError::Validation("Only image uploads are accepted".to_string()))?;

    if content_type.top() != "image" {
        return Err(AppError::Validation(
            "Only image uploads are accepted".to_string(),
        ));
    }

    let extension = content_type
        .extension()
        .map(|e| e.as_str().to_string())
        .unwrap_or_else(|| "bin".to_string());
    let filename = format!("{}.{}", Uuid::new_v4(), extension);
    let destination = config.upload_dir.join(&filename);

    file.copy_to(&destination)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

    Ok(Json(UploadResponse {
        url: format!("/uploads/{}", filename),
        message: "Upload successful".to_string(),
    }))
}

/// Bodies large enough to trip the transport limits never reach the handler;
/// they get the same 400 the in-handler size check produces.
#[catch(413)]
pub fn payload_too_large() -> Custom<Json<ErrorBody>> {
    Custom(
        Status::BadRequest,
        Json(ErrorBody {
            message: "File must be 2MB or smaller".to_string(),
        }),
    )
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
