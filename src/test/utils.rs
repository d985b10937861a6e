use std::collections::HashMap;
use std::sync::Once;

use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::AppConfig;
use crate::db::{
    DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME, create_behavior, create_behavior_type,
    create_student, seed_default_admin,
};
use crate::error::AppError;
use crate::models::NewStudent;
use crate::schema::ensure_schema;

static INIT: Once = Once::new();

pub struct TestStudent {
    pub name: String,
    pub student_id: String,
}

pub struct TestBehaviorType {
    pub name: String,
    pub category: String,
}

pub struct TestBehavior {
    pub student_sid: String,
    pub behavior_type: String,
    pub description: String,
}

/// Builds an in-memory database with the schema applied, the default admin
/// seeded, and whatever fixture rows the test asked for. The default
/// taxonomy is not seeded so list assertions stay deterministic.
#[derive(Default)]
pub struct TestDbBuilder {
    students: Vec<TestStudent>,
    behavior_types: Vec<TestBehaviorType>,
    behaviors: Vec<TestBehavior>,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn student(mut self, name: &str, student_id: &str) -> Self {
        self.students.push(TestStudent {
            name: name.to_string(),
            student_id: student_id.to_string(),
        });
        self
    }

    pub fn behavior_type(mut self, name: &str, category: &str) -> Self {
        self.behavior_types.push(TestBehaviorType {
            name: name.to_string(),
            category: category.to_string(),
        });
        self
    }

    pub fn behavior(mut self, student_sid: &str, behavior_type: &str, description: &str) -> Self {
        self.behaviors.push(TestBehavior {
            student_sid: student_sid.to_string(),
            behavior_type: behavior_type.to_string(),
            description: description.to_string(),
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });

        // One connection only: every pooled connection to an in-memory
        // SQLite database would otherwise see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        ensure_schema(&pool).await?;
        seed_default_admin(&pool).await?;

        let mut student_id_map: HashMap<String, i64> = HashMap::new();

        for student in &self.students {
            let created = create_student(
                &pool,
                &NewStudent {
                    name: student.name.clone(),
                    student_id: student.student_id.clone(),
                    class: None,
                    grade: None,
                    photo_url: None,
                    address: None,
                    emergency_contact: None,
                    emergency_phone: None,
                    notes: None,
                },
            )
            .await?;

            student_id_map.insert(student.student_id.clone(), created.id);
        }

        for behavior_type in &self.behavior_types {
            create_behavior_type(&pool, &behavior_type.name, &behavior_type.category, None)
                .await?;
        }

        for behavior in &self.behaviors {
            let student_id = student_id_map
                .get(&behavior.student_sid)
                .copied()
                .unwrap_or_default();

            create_behavior(
                &pool,
                student_id,
                &behavior.behavior_type,
                Some(&behavior.description),
            )
            .await?;
        }

        Ok(TestDb {
            pool,
            student_id_map,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    student_id_map: HashMap<String, i64>,
}

impl TestDb {
    pub fn student_id(&self, student_sid: &str) -> Option<i64> {
        self.student_id_map.get(student_sid).copied()
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        upload_dir: std::env::temp_dir().join("conduct-tracker-test-uploads"),
    }
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let rocket = crate::init_rocket(test_db.pool.clone(), test_config()).await;
    let client = Client::tracked(rocket)
        .await
        .expect("Failed to build test client");

    (client, test_db)
}

/// Logs in as the seeded default administrator and returns the bearer token.
pub async fn login_default_admin(client: &Client) -> String {
    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(
            json!({
                "username": DEFAULT_ADMIN_USERNAME,
                "password": DEFAULT_ADMIN_PASSWORD
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);

    let body: serde_json::Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    body["token"].as_str().unwrap().to_string()
}

pub fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}
