pub mod admin;
pub mod auth;
pub mod error;
pub mod health;
pub mod home;
pub mod session;
pub mod user;
