use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use super::token::{AuthKeys, Claims, verify_token};

/// The verified identity behind a request. Obtaining one requires a valid
/// bearer token, so handlers that take an `AuthUser` cannot touch storage on
/// a failed verification.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            username: claims.username,
            role: claims.role,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("token_auth_guard");
        let _guard = auth_span.enter();

        let token = request
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "));

        let Some(token) = token else {
            tracing::warn!("Request without bearer token");
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let keys = match request.rocket().state::<AuthKeys>() {
            Some(keys) => keys,
            _ => {
                tracing::error!("Auth keys not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        match verify_token(keys, token) {
            Ok(claims) => {
                let user = AuthUser::from(claims);
                tracing::info!(username = %user.username, role = %user.role, "User authenticated via bearer token");
                Outcome::Success(user)
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Invalid bearer token");
                Outcome::Error((Status::Forbidden, ()))
            }
        }
    }
}

#[catch(401)]
pub fn missing_token(_req: &Request) -> Custom<Json<Value>> {
    Custom(
        Status::Unauthorized,
        Json(json!({ "message": "Authentication token required" })),
    )
}

#[catch(403)]
pub fn invalid_token(_req: &Request) -> Custom<Json<Value>> {
    Custom(
        Status::Forbidden,
        Json(json!({ "message": "Invalid or expired authentication token" })),
    )
}
