pub mod account;
pub mod auth;
pub mod oauth;
pub mod session;

use crate::database::audit::AuditLog;
use crate::database::user::UserRepository;
use rocket::{Build, Rocket};
use std::sync::Arc;

/// Everything the routes pull from managed state.
#[derive(Clone)]
pub struct Services {
    pub sessions: session::SessionService,
    pub users: Arc<dyn UserRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub oauth: oauth::OAuthState,
}

impl Services {
    pub fn manage(self, rocket: Rocket<Build>) -> Rocket<Build> {
        rocket.manage(self.sessions).manage(self.users).manage(self.audit).manage(self.oauth)
    }
}
