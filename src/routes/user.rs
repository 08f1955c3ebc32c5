use crate::auth::CurrentUser;
use crate::models::user::CurrentUserResponse;
use rocket::get;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

/// The identity behind the presented session
#[openapi(tag = "Users")]
#[get("/me")]
pub async fn get_me(current_user: CurrentUser) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        id: current_user.id,
        username: current_user.username,
        is_admin: current_user.is_admin,
        session_id: current_user.session.id,
        expires_at: current_user.session.expires_at,
    })
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_me]
}
