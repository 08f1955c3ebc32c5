use crate::auth::CurrentUser;
use crate::config::SessionConfig;
use crate::models::session::SessionStatusResponse;
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;

/// Liveness check for an open page. Runs the normal session validation and nothing else.
#[openapi(tag = "Session")]
#[get("/status")]
pub async fn get_status(current_user: CurrentUser, session_config: &State<SessionConfig>) -> Json<SessionStatusResponse> {
    Json(SessionStatusResponse {
        valid: true,
        session_id: current_user.session.id,
        expires_at: current_user.session.expires_at,
        last_seen_at: current_user.session.last_seen_at,
        poll_interval_seconds: session_config.poll_interval_seconds,
    })
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_status]
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestApp;
    use chrono::Duration;
    use rocket::http::Status;
    use serde_json::Value;

    #[rocket::async_test]
    async fn poll_refreshes_activity_and_advertises_interval() {
        let app = TestApp::new().await;
        let (record, cookie) = app.sign_in(&app.bob).await;
        app.clock.advance(Duration::seconds(30));

        let response = app.client.get("/api/session/status").private_cookie(cookie).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.expect("status body");
        assert_eq!(body["valid"], true);
        assert_eq!(body["poll_interval_seconds"], 30);

        let stored = app.store.session(&record.id).await.expect("record kept");
        assert_eq!(stored.last_seen_at, record.issued_at + Duration::seconds(30));
        assert_eq!(stored.expires_at, record.expires_at);
    }

    #[rocket::async_test]
    async fn poll_after_termination_reports_it() {
        let app = TestApp::new().await;
        let (record, cookie) = app.sign_in(&app.bob).await;
        app.sessions.terminate_all(&app.alice.id, &app.bob.id).await.expect("terminated");

        let response = app.client.get("/api/session/status").private_cookie(cookie).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = response.into_json().await.expect("rejection body");
        assert_eq!(body["error"], "session_terminated");
        assert_eq!(body["session_terminated"], true);
        assert_eq!(body["redirect"], "/auth/login");
        assert!(!app.store.session(&record.id).await.expect("record kept").active);
    }

    #[rocket::async_test]
    async fn poll_after_expiry_deactivates_the_record() {
        let app = TestApp::new().await;
        let (record, cookie) = app.sign_in(&app.bob).await;
        app.clock.advance(Duration::hours(24) + Duration::seconds(1));

        let response = app.client.get("/api/session/status").private_cookie(cookie).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = response.into_json().await.expect("rejection body");
        assert_eq!(body["error"], "session_expired");
        assert_eq!(body["session_terminated"], false);

        let stored = app.store.session(&record.id).await.expect("record kept");
        assert!(!stored.active);
        assert_eq!(stored.last_seen_at, record.issued_at);
        assert_eq!(app.store.audit_types().await, vec!["session_expired"]);
    }
}
