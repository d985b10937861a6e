#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod db;
mod error;
mod models;
mod schema;
mod telemetry;
#[cfg(test)]
mod test;

use api::{
    api_behavior_summary, api_create_behavior, api_create_behavior_type, api_create_student,
    api_delete_behavior, api_delete_behavior_type, api_delete_student, api_get_behavior_types,
    api_get_behaviors, api_get_students, api_login, api_student_behavior_stats,
    api_update_student, api_upload, health, payload_too_large,
};
use auth::{AuthKeys, invalid_token, missing_token};
use config::AppConfig;
use error::AppError;
use rocket::data::{Limits, ToByteUnit};
use rocket::fs::FileServer;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

#[launch]
async fn rocket() -> _ {
    // Missing env files are fine; the defaults cover local runs.
    if let Err(e) = config::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    match build_rocket().await {
        Ok(rocket) => rocket,
        Err(e) => {
            error!("Startup failed: {}", e);
            panic!("Startup failed: {}", e);
        }
    }
}

async fn build_rocket() -> Result<Rocket<Build>, Error> {
    let app_config = AppConfig::from_env();

    let pool = SqlitePool::connect(&app_config.database_url).await?;

    info!("Preparing database...");
    prepare_database(&pool).await?;
    info!("Database schema and seed data ready");

    Ok(init_rocket(pool, app_config).await)
}

/// Applies the declarative schema and the idempotent seeds; safe to run on
/// every start.
pub async fn prepare_database(pool: &SqlitePool) -> Result<(), Error> {
    schema::ensure_schema(pool).await?;
    db::seed_default_behavior_types(pool).await?;
    db::seed_default_admin(pool).await?;
    Ok(())
}

pub async fn init_rocket(pool: SqlitePool, app_config: AppConfig) -> Rocket<Build> {
    info!("Starting conduct tracker");

    std::fs::create_dir_all(&app_config.upload_dir).expect("Failed to create upload directory");

    // The form-file limit stays above the 2MB cap so oversize uploads reach
    // the handler and fail with a 400 instead of a transport-level reject.
    let figment = rocket::Config::figment().merge((
        "limits",
        Limits::default()
            .limit("file", 8.mebibytes())
            .limit("data-form", 8.mebibytes()),
    ));

    let keys = AuthKeys::new(&app_config.jwt_secret);
    let upload_dir = app_config.upload_dir.clone();

    rocket::custom(figment)
        .manage(pool)
        .manage(keys)
        .manage(app_config)
        .mount(
            "/api",
            routes![
                api_login,
                api_get_students,
                api_create_student,
                api_update_student,
                api_delete_student,
                api_student_behavior_stats,
                api_get_behaviors,
                api_create_behavior,
                api_delete_behavior,
                api_get_behavior_types,
                api_create_behavior_type,
                api_delete_behavior_type,
                api_behavior_summary,
                api_upload,
                health,
            ],
        )
        .mount("/uploads", FileServer::from(upload_dir))
        .register(
            "/api",
            catchers![missing_token, invalid_token, payload_too_large],
        )
        .attach(TelemetryFairing)
}
