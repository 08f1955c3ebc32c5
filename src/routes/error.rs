use crate::auth::SessionCheck;
use crate::config::{DEFAULT_LOGIN_PATH, SessionConfig};
use crate::enforcement::{EnforcementResponse, RejectionReason, reject};
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub error: &'static str,
    pub message: String,
}

fn error(code: &'static str, message: &str) -> Json<Error> {
    Json(Error {
        error: code,
        message: message.to_string(),
    })
}

/// Every request that needed a session and did not have a live one ends up here.
#[catch(401)]
pub fn unauthorized(req: &Request) -> EnforcementResponse {
    let reason = match req.local_cache(|| SessionCheck::Unchecked) {
        SessionCheck::Rejected(reason) => *reason,
        _ => RejectionReason::Missing,
    };
    let login_path = req
        .rocket()
        .state::<SessionConfig>()
        .map(|config| config.login_path.as_str())
        .unwrap_or(DEFAULT_LOGIN_PATH);

    reject(req, reason, login_path)
}

#[catch(403)]
pub fn forbidden(_: &Request) -> Json<Error> {
    error("forbidden", "Administrator access required")
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    error("not_found", "Not found")
}

#[catch(422)]
pub fn unprocessable(_: &Request) -> Json<Error> {
    error("bad_request", "Request body could not be parsed")
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<Error> {
    error("internal_error", "Internal server error")
}
