#![deny(missing_docs)]

//! This crate contains the server and API for the FreeBlog app.

/// The API module contains the JSON endpoints over entries and files.
pub mod api;
/// Module containing all the authentication, registration, cookies, etc. logic.
pub mod auth;
/// This module is used to parse and read from configuration files for the
/// server.
pub mod settings;
/// SQLite persistence for users, entries and files.
pub mod store;
mod app;
mod init;

pub use app::{app, run_server, ServerError};
pub use init::{init_database, set_admin_password};

use askama::Template;
use auth::CurrentUser;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use settings::Site;

struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template. Error: {}", err),
            )
                .into_response(),
        }
    }
}

/// Page heading shared by every template: site title and who is logged in.
struct Heading {
    title: String,
    username: String,
    is_admin: bool,
}

impl Heading {
    fn new(site: &Site, current_user: Option<&CurrentUser>) -> Heading {
        Heading {
            title: site.title.clone(),
            username: current_user.map(|u| u.username.clone()).unwrap_or_default(),
            is_admin: current_user.map(|u| u.is_admin).unwrap_or(false),
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
