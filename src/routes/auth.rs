use crate::auth::{SESSION_COOKIE, removal_cookie, session_cookie};
use crate::config::{AuthConfig, SessionConfig};
use crate::database::audit::{AuditLog, record_quietly};
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::audit::{AuditEvent, audit_events};
use crate::models::session::ClientInfo;
use crate::models::user::{LoginRequest, LoginResponse, RegisterRequest, RegistrationResponse, UserResponse};
use crate::service::auth::{AuthService, Registration};
use crate::service::oauth::OAuthState;
use crate::service::session::SessionService;
use crate::util::sanitize_next;
use rocket::http::{CookieJar, Status};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{State, get, post, routes};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use validator::Validate;

const LOGGED_OUT_NOTICE: &str = "You have been logged out successfully.";

#[derive(Serialize, Debug)]
#[serde(crate = "rocket::serde")]
pub struct Notice {
    pub kind: String,
    pub message: String,
}

/// What the login page needs: a one-time notice, if any, and where to post credentials.
#[derive(Serialize, Debug)]
#[serde(crate = "rocket::serde")]
pub struct LoginPageResponse {
    pub notice: Option<Notice>,
    pub login_path: String,
}

fn auth_service<'a>(users: &'a State<Arc<dyn UserRepository>>, sessions: &'a State<SessionService>, audit: &'a State<Arc<dyn AuditLog>>) -> AuthService<'a> {
    AuthService {
        users: users.inner().as_ref(),
        sessions: sessions.inner(),
        audit: audit.inner().as_ref(),
    }
}

/// Ends whatever session the browser still carries before binding a new one.
async fn end_previous_session(cookies: &CookieJar<'_>, sessions: &SessionService) {
    if let Some(previous) = cookies.get_private(SESSION_COOKIE)
        && let Err(err) = sessions.end_session(previous.value()).await
    {
        warn!(error = ?err, "failed to end previous session on re-login");
    }
}

#[get("/login")]
pub fn get_login(flash: Option<FlashMessage<'_>>, session_config: &State<SessionConfig>) -> Json<LoginPageResponse> {
    Json(LoginPageResponse {
        notice: flash.map(|flash| Notice {
            kind: flash.kind().to_string(),
            message: flash.message().to_string(),
        }),
        login_path: session_config.login_path.clone(),
    })
}

#[allow(clippy::too_many_arguments)]
#[post("/login", data = "<payload>")]
pub async fn post_login(
    users: &State<Arc<dyn UserRepository>>,
    sessions: &State<SessionService>,
    audit: &State<Arc<dyn AuditLog>>,
    session_config: &State<SessionConfig>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
    payload: Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let signed_in = auth_service(users, sessions, audit).login(&payload, client).await?;
    end_previous_session(cookies, sessions).await;
    cookies.add_private(session_cookie(&signed_in.session.token, session_config));

    Ok(Json(LoginResponse {
        user: UserResponse::from(&signed_in.user),
        expires_at: signed_in.session.record.expires_at,
        redirect: sanitize_next(payload.next.as_deref()),
    }))
}

#[allow(clippy::too_many_arguments)]
#[post("/register", data = "<payload>")]
pub async fn post_register(
    users: &State<Arc<dyn UserRepository>>,
    sessions: &State<SessionService>,
    audit: &State<Arc<dyn AuditLog>>,
    session_config: &State<SessionConfig>,
    auth_config: &State<AuthConfig>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
    payload: Json<RegisterRequest>,
) -> Result<(Status, Json<RegistrationResponse>), AppError> {
    if let Err(errors) = payload.validate() {
        let weak = errors
            .field_errors()
            .get("password")
            .is_some_and(|errs| errs.iter().any(|e| e.code == "weak_password"));
        return Err(if weak { AppError::WeakPassword } else { errors.into() });
    }

    let registration = auth_service(users, sessions, audit)
        .register(&payload, auth_config.require_approval, client)
        .await?;

    let response = match registration {
        Registration::SignedIn(signed_in) => {
            end_previous_session(cookies, sessions).await;
            cookies.add_private(session_cookie(&signed_in.session.token, session_config));
            RegistrationResponse {
                user: UserResponse::from(&signed_in.user),
                signed_in: true,
                message: "Registration complete. You are now signed in.".to_string(),
            }
        }
        Registration::PendingApproval(user) => RegistrationResponse {
            user: UserResponse::from(&user),
            signed_in: false,
            message: "Registration received. An administrator must approve your account before you can sign in.".to_string(),
        },
    };

    Ok((Status::Created, Json(response)))
}

#[post("/logout")]
pub async fn post_logout(
    sessions: &State<SessionService>,
    audit: &State<Arc<dyn AuditLog>>,
    session_config: &State<SessionConfig>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
) -> Result<Flash<Redirect>, AppError> {
    let presented = cookies.get_private(SESSION_COOKIE).map(|cookie| cookie.value().to_string());
    cookies.remove_private(removal_cookie());

    if let Some(token) = presented
        && let Some(record) = sessions.end_session(&token).await?
    {
        record_quietly(
            audit.inner().as_ref(),
            AuditEvent::success(audit_events::LOGOUT, Some(record.user_id))
                .client(client.address, client.agent)
                .metadata(json!({ "session_id": record.id })),
        )
        .await;
    }

    Ok(Flash::success(Redirect::to(session_config.login_path.clone()), LOGGED_OUT_NOTICE))
}

#[allow(clippy::too_many_arguments)]
#[get("/oauth/callback?<code>&<error>&<error_description>")]
pub async fn oauth_callback(
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    oauth: &State<OAuthState>,
    users: &State<Arc<dyn UserRepository>>,
    sessions: &State<SessionService>,
    audit: &State<Arc<dyn AuditLog>>,
    session_config: &State<SessionConfig>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
) -> Result<Redirect, Flash<Redirect>> {
    let back_to_login = |message: String| Flash::error(Redirect::to(session_config.login_path.clone()), message);

    if let Some(error) = error {
        let detail = error_description.unwrap_or(error);
        warn!(detail = %detail, "OAuth provider returned an error");
        return Err(back_to_login(format!("Sign-in failed: {detail}")));
    }

    let Some(code) = code.filter(|code| !code.is_empty()) else {
        return Err(back_to_login("No authorization code was received.".to_string()));
    };

    let Some(provider) = oauth.provider.as_ref() else {
        return Err(back_to_login("Single sign-on is not configured.".to_string()));
    };

    let profile = provider.exchange_code(&code).await.map_err(|err| {
        warn!(provider = provider.name(), error = ?err, "OAuth code exchange failed");
        back_to_login("Sign-in with your provider failed. Please try again.".to_string())
    })?;

    let signed_in = auth_service(users, sessions, audit)
        .login_with_oauth(&profile.email, provider.name(), client)
        .await
        .map_err(|err| match err {
            AppError::UserNotFound => back_to_login("No account is registered for that email address.".to_string()),
            AppError::AccountPending | AppError::AccountRejected | AppError::AccountSuspended => back_to_login(err.to_string()),
            other => {
                warn!(error = ?other, "OAuth sign-in failed");
                back_to_login("Sign-in failed. Please try again.".to_string())
            }
        })?;

    end_previous_session(cookies, sessions).await;
    cookies.add_private(session_cookie(&signed_in.session.token, session_config));
    Ok(Redirect::to("/"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![get_login, post_login, post_register, post_logout, oauth_callback]
}
