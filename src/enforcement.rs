use crate::auth::removal_cookie;
use rocket::Request;
use rocket::http::Status;
use rocket::response::status;
use rocket::response::{Flash, Redirect};
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use tracing::info;

/// Why a request that needed a session did not get one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    Missing,
    Expired,
    Terminated,
}

impl RejectionReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectionReason::Missing => "authentication_required",
            RejectionReason::Expired => "session_expired",
            RejectionReason::Terminated => "session_terminated",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            RejectionReason::Missing => "Please log in to continue.",
            RejectionReason::Expired => "Your session has expired. Please log in again.",
            RejectionReason::Terminated => "Your session has been terminated. Please log in again.",
        }
    }

    fn presented_credential(self) -> bool {
        !matches!(self, RejectionReason::Missing)
    }
}

/// How the caller consumes the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A navigable page load.
    Foreground,
    /// A script-issued call that expects a structured body.
    Background,
}

impl RequestKind {
    pub fn of(req: &Request<'_>) -> Self {
        classify(
            req.uri().path().as_str(),
            req.headers().get_one("X-Requested-With"),
            req.headers().get_one("Accept"),
        )
    }
}

pub fn classify(path: &str, requested_with: Option<&str>, accept: Option<&str>) -> RequestKind {
    if requested_with.is_some_and(|value| value.eq_ignore_ascii_case("XMLHttpRequest")) {
        return RequestKind::Background;
    }

    if path == "/api" || path.starts_with("/api/") {
        return RequestKind::Background;
    }

    match accept.map(str::to_ascii_lowercase) {
        Some(accept) if accept.contains("application/json") && !accept.contains("text/html") => RequestKind::Background,
        _ => RequestKind::Foreground,
    }
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(crate = "rocket::serde")]
pub struct RejectionBody {
    pub error: &'static str,
    pub message: &'static str,
    pub redirect: String,
    pub session_terminated: bool,
}

impl RejectionBody {
    pub fn new(reason: RejectionReason, login_path: &str) -> Self {
        Self {
            error: reason.code(),
            message: reason.message(),
            redirect: login_path.to_string(),
            session_terminated: reason == RejectionReason::Terminated,
        }
    }
}

#[derive(rocket::Responder)]
pub enum EnforcementResponse {
    Page(Flash<Redirect>),
    Api(status::Custom<Json<RejectionBody>>),
}

/// Login URL carrying the page the user was trying to reach.
pub fn login_redirect_target(login_path: &str, req: &Request<'_>) -> String {
    if req.method() != rocket::http::Method::Get {
        return login_path.to_string();
    }

    let origin = req.uri();
    let next = match origin.query() {
        Some(query) => format!("{}?{}", origin.path(), query),
        None => origin.path().to_string(),
    };

    if next == "/" {
        login_path.to_string()
    } else {
        format!("{}?next={}", login_path, urlencoding::encode(&next))
    }
}

/// Turns a rejected session check into the response the caller can act on.
pub fn reject(req: &Request<'_>, reason: RejectionReason, login_path: &str) -> EnforcementResponse {
    let kind = RequestKind::of(req);

    if reason.presented_credential() {
        req.cookies().remove_private(removal_cookie());
    }

    info!(
        reason = reason.code(),
        kind = ?kind,
        method = %req.method(),
        uri = %req.uri(),
        "request rejected by session enforcement"
    );

    match kind {
        RequestKind::Foreground => EnforcementResponse::Page(Flash::warning(
            Redirect::to(login_redirect_target(login_path, req)),
            reason.message(),
        )),
        RequestKind::Background => EnforcementResponse::Api(status::Custom(Status::Unauthorized, Json(RejectionBody::new(reason, login_path)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_paths_are_background() {
        assert_eq!(classify("/api/users/me", None, Some("text/html")), RequestKind::Background);
        assert_eq!(classify("/api", None, None), RequestKind::Background);
        assert_eq!(classify("/apiary", None, None), RequestKind::Foreground);
    }

    #[test]
    fn xhr_header_marks_background() {
        assert_eq!(classify("/digests", Some("XMLHttpRequest"), Some("text/html")), RequestKind::Background);
        assert_eq!(classify("/digests", Some("xmlhttprequest"), None), RequestKind::Background);
    }

    #[test]
    fn accept_header_decides_for_other_paths() {
        assert_eq!(classify("/", None, Some("application/json")), RequestKind::Background);
        assert_eq!(
            classify("/", None, Some("text/html,application/xhtml+xml,application/json;q=0.9")),
            RequestKind::Foreground
        );
        assert_eq!(classify("/", None, Some("*/*")), RequestKind::Foreground);
        assert_eq!(classify("/", None, None), RequestKind::Foreground);
    }

    #[test]
    fn only_termination_sets_the_flag() {
        let terminated = RejectionBody::new(RejectionReason::Terminated, "/auth/login");
        assert_eq!(terminated.error, "session_terminated");
        assert!(terminated.session_terminated);
        assert_eq!(terminated.redirect, "/auth/login");

        let expired = RejectionBody::new(RejectionReason::Expired, "/auth/login");
        assert_eq!(expired.error, "session_expired");
        assert!(!expired.session_terminated);

        let missing = RejectionBody::new(RejectionReason::Missing, "/auth/login");
        assert_eq!(missing.error, "authentication_required");
        assert!(!missing.session_terminated);
    }
}
