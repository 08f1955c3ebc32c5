use crate::models::health::HealthResponse;
use rocket::serde::json::Json;
use rocket::{get, routes};

#[get("/")]
pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn routes() -> Vec<rocket::Route> {
    routes![healthcheck]
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestApp;
    use rocket::http::Status;

    #[rocket::async_test]
    async fn health_check_works_without_a_session() {
        let app = TestApp::new().await;
        let response = app.client.get("/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.as_deref(), Some(r#"{"status":"ok"}"#));
    }
}
