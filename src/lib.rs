mod auth;
mod config;
mod cron_tasks;
mod database;
mod db;
mod enforcement;
mod error;
mod middleware;
mod models;
mod routes;
mod service;
mod util;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use cron_tasks::purge_sessions;
pub use error::app_error::AppError;
pub use service::oauth::{OAuthProfile, OAuthProvider, OAuthState};

use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::routes as app_routes;
use crate::service::session::SessionService;
use rocket::fairing::AdHoc;
use rocket::fs::FileServer;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const API_BASE_PATH: &str = "/api";

pub fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG takes precedence over the configured level, e.g.
    //   RUST_LOG=sessionkeeper::service=debug,info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    if json_format {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn ensure_rocket_secret_key() {
    let profile = std::env::var("ROCKET_PROFILE").unwrap_or_else(|_| "debug".to_string());

    // Only enforced outside the debug profile
    if profile != "debug" && std::env::var("ROCKET_SECRET_KEY").is_err() {
        panic!(
            "ROCKET_SECRET_KEY is required for profile '{}'. Generate one with: openssl rand -base64 32",
            profile
        );
    }
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Options, Method::Head].into_iter().map(From::from).collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept", "X-Requested-With"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (admin_routes, admin_openapi) = app_routes::admin::routes();
    let (session_routes, session_openapi) = app_routes::session::routes();
    let (user_routes, user_openapi) = app_routes::user::routes();

    vec![
        RouteSpec {
            path: "/admin",
            routes: admin_routes,
            openapi: admin_openapi,
        },
        RouteSpec {
            path: "/session",
            routes: session_routes,
            openapi: session_openapi,
        },
        RouteSpec {
            path: "/users",
            routes: user_routes,
            openapi: user_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if !enable_swagger {
        for spec in route_specs {
            rocket = rocket.mount(format!("{}{}", API_BASE_PATH, spec.path), spec.routes);
        }
        return rocket;
    }

    let mut openapi_list = Vec::new();
    for spec in route_specs {
        rocket = rocket.mount(format!("{}{}", API_BASE_PATH, spec.path), spec.routes);
        openapi_list.push((spec.path, spec.openapi));
    }

    let openapi_docs = match marge_spec_list(&openapi_list) {
        Ok(docs) => docs,
        Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
    };

    let settings = rocket_okapi::settings::OpenApiSettings::default();
    let swagger = SwaggerUIConfig {
        url: format!("{}/openapi.json", API_BASE_PATH),
        ..Default::default()
    };

    rocket
        .mount(API_BASE_PATH, vec![get_openapi_route(openapi_docs, &settings)])
        .mount(format!("{}/docs", API_BASE_PATH), make_swagger_ui(&swagger))
}

fn mount_static_files(rocket: Rocket<Build>, static_dir: &str) -> Rocket<Build> {
    if Path::new(static_dir).is_dir() {
        rocket.mount("/static", FileServer::from(static_dir))
    } else {
        tracing::debug!(static_dir, "static directory not found; /static is not mounted");
        rocket
    }
}

fn stage_session_sweeper(session_config: &config::SessionConfig) -> AdHoc {
    let every = Duration::from_secs(session_config.purge_interval_seconds);
    let retention = session_config.purge_retention();

    AdHoc::on_liftoff("Session Sweeper", move |rocket| {
        Box::pin(async move {
            match rocket.state::<SessionService>() {
                Some(sessions) => sessions.clone().spawn_purge_task(every, retention),
                None => tracing::warn!("session service not managed; expired sessions will not be purged"),
            }
        })
    })
}

/// Routes, catchers and fairings without any storage attached.
pub(crate) fn assemble_rocket(config: &Config) -> Rocket<Build> {
    let cors = build_cors(&config.cors).to_cors().expect("Failed to create CORS fairing");

    let figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()));

    let mut rocket = rocket::custom(figment)
        .attach(cors)
        .attach(RequestLogger)
        .manage(config.session.clone())
        .manage(config.auth.clone())
        .mount("/", app_routes::home::routes())
        .mount("/auth", app_routes::auth::routes())
        .mount("/health", app_routes::health::routes());

    rocket = mount_api_routes(rocket, config.api.enable_swagger);
    rocket = mount_static_files(rocket, &config.server.static_dir);

    if config.session.purge_interval_seconds > 0 {
        rocket = rocket.attach(stage_session_sweeper(&config.session));
    }

    rocket.register(
        "/",
        catchers![
            app_routes::error::unauthorized,
            app_routes::error::forbidden,
            app_routes::error::not_found,
            app_routes::error::unprocessable,
            app_routes::error::internal_error
        ],
    )
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    build_rocket_with_oauth(config, OAuthState::default())
}

/// Like `build_rocket`, with an OAuth provider answering `/auth/oauth/callback`.
pub fn build_rocket_with_oauth(config: Config, oauth: OAuthState) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);
    ensure_rocket_secret_key();

    assemble_rocket(&config).attach(stage_db(config.database.clone(), config.session.clone(), oauth))
}
