use crate::auth::CurrentUser;
use rocket::{get, routes};

/// Landing page for a signed-in browser.
#[get("/")]
pub fn index(current_user: CurrentUser) -> String {
    format!("Signed in as {}", current_user.username)
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index]
}
