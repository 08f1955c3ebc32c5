use crate::config::SessionConfig;
use crate::enforcement::RejectionReason;
use crate::error::app_error::AppError;
use crate::models::session::{SessionRecord, SessionToken};
use crate::service::session::{SessionService, SessionVerdict};
use rocket::http::{Cookie, SameSite, Status};
use rocket::outcome::{Outcome, try_outcome};
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tracing::{error, warn};
use uuid::Uuid;

/// Name of the private cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Path prefixes that never run session validation.
const EXEMPT_PREFIXES: [&str; 2] = ["/static/", "/auth/"];

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub session: SessionRecord,
}

/// A `CurrentUser` holding the administrator flag.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

/// Per-request memo of the session check, read back by the 401 catcher.
#[derive(Debug, Clone)]
pub enum SessionCheck {
    Unchecked,
    Passed(CurrentUser),
    Rejected(RejectionReason),
}

pub fn is_exempt_path(path: &str) -> bool {
    path == "/health" || path == "/auth" || EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

pub fn session_cookie(token: &SessionToken, config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.as_str().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookie)
        .max_age(rocket::time::Duration::hours(config.lifetime_hours.max(1)))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

async fn check_session(req: &Request<'_>) -> SessionCheck {
    if is_exempt_path(req.uri().path().as_str()) {
        return SessionCheck::Rejected(RejectionReason::Missing);
    }

    let Some(sessions) = req.rocket().state::<SessionService>() else {
        error!("session service is not managed; rejecting request");
        return SessionCheck::Rejected(RejectionReason::Terminated);
    };

    let token = req.cookies().get_private(SESSION_COOKIE).map(|cookie| cookie.value().to_string());

    match sessions.validate(token.as_deref()).await {
        SessionVerdict::Valid(live) => SessionCheck::Passed(CurrentUser {
            id: live.principal.id,
            username: live.principal.username,
            is_admin: live.principal.is_admin,
            session: live.session,
        }),
        SessionVerdict::Missing => SessionCheck::Rejected(RejectionReason::Missing),
        SessionVerdict::Expired => SessionCheck::Rejected(RejectionReason::Expired),
        SessionVerdict::Terminated => SessionCheck::Rejected(RejectionReason::Terminated),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        match req.local_cache_async(check_session(req)).await {
            SessionCheck::Passed(user) => Outcome::Success(user.clone()),
            _ => Outcome::Error((Status::Unauthorized, AppError::Unauthorized)),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let user = try_outcome!(req.guard::<CurrentUser>().await);
        if user.is_admin {
            return Outcome::Success(AdminUser(user));
        }

        warn!(user_id = %user.id, uri = %req.uri(), "non-admin attempted an admin operation");
        Outcome::Error((Status::Forbidden, AppError::Forbidden))
    }
}

fn cookie_security() -> RequestHeaderInput {
    let security_scheme = SecurityScheme {
        description: Some("Cookie-based session. Log in via POST /auth/login to obtain the session cookie.".to_string()),
        data: SecuritySchemeData::ApiKey {
            name: SESSION_COOKIE.to_string(),
            location: "cookie".to_string(),
        },
        extensions: Object::default(),
    };

    let mut security_req = SecurityRequirement::new();
    security_req.insert("cookieAuth".to_string(), Vec::new());

    RequestHeaderInput::Security("cookieAuth".to_string(), security_scheme, security_req)
}

fn describe(responses: &mut Responses, code: &str, description: &str) {
    use rocket_okapi::okapi::openapi3::{RefOr, Response};
    responses.responses.insert(
        code.to_string(),
        RefOr::Object(Response {
            description: description.to_string(),
            ..Default::default()
        }),
    );
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(cookie_security())
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        describe(&mut responses, "401", "Session missing, expired or terminated");
        Ok(responses)
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(cookie_security())
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        describe(&mut responses, "401", "Session missing, expired or terminated");
        describe(&mut responses, "403", "Administrator access required");
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_static_paths_are_exempt() {
        assert!(is_exempt_path("/auth/login"));
        assert!(is_exempt_path("/auth/oauth/callback"));
        assert!(is_exempt_path("/static/app.js"));
        assert!(is_exempt_path("/health"));
        assert!(!is_exempt_path("/api/users/me"));
        assert!(!is_exempt_path("/authors"));
        assert!(!is_exempt_path("/"));
    }

    #[test]
    fn session_cookie_is_script_inaccessible() {
        let token = SessionToken::generate();
        let cookie = session_cookie(&token, &SessionConfig::default());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), token.as_str());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(rocket::time::Duration::hours(24)));
    }
}
