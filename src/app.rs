use crate::api::{
    create_entry, get_entry, list_entries, list_files, serve_file, upload_file, whoami,
};
use crate::auth::{
    api_change_password, api_delete_account, api_login, auth_middleware,
    check_username_password, delete_account, insert_username_password, logout, new_shared_auth,
    serve_delete_account, serve_login, serve_password, serve_signup, update_password, AuthError,
    CurrentUser, SharedAuth,
};
use crate::settings::{Settings, Site};
use crate::store::{self, Entry, EntryQuery, SqliteStore, UserRepository};
use crate::{Heading, HtmlTemplate};
use askama::Template;
use axum::{
    handler::Handler,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const INDEX_ENTRIES: i64 = 20;

/// Everything that can stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The settings files or environment could not be read.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    /// The database could not be opened or migrated.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Terminal input or output failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// `server.host` and `server.port` do not form a socket address.
    #[error("invalid listen address: {0}")]
    Address(#[from] AddrParseError),
    /// The HTTP server stopped with an error.
    #[error("server error: {0}")]
    Serve(String),
    /// The password hashing settings are unusable.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// `base.rust_log` setting.
pub(crate) fn init_tracing(settings: &Settings) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .ok()
                .or_else(|| settings.base.rust_log.clone())
                .unwrap_or_else(|| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Runs the server. Main entrypoint for the server app.
pub async fn run_server() -> Result<(), ServerError> {
    let settings = Settings::new()?;
    init_tracing(&settings);

    let pool = store::connect(
        &settings.database.url,
        settings.database.max_connections,
        false,
    )
    .await?;
    store::migrate(&pool).await?;

    let shared_auth = new_shared_auth(SqliteStore::new(pool), &settings.auth)?;
    match shared_auth
        .authority
        .store()
        .find_by_id(settings.auth.admin_id)
        .await?
    {
        Some(admin) if admin.password.is_empty() => tracing::warn!(
            "administrator '{}' has no password, run `freeblog admin-password`",
            admin.username
        ),
        Some(_) => {}
        None => tracing::warn!("no administrator with id {}", settings.auth.admin_id),
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::debug!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app(shared_auth, settings.site).into_make_service())
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    heading: Heading,
    entries: Vec<Entry>,
}

async fn index(
    Extension(auth): Extension<SharedAuth>,
    Extension(site): Extension<Site>,
    current_user: Option<Extension<CurrentUser>>,
) -> Response {
    let query = EntryQuery {
        limit: Some(INDEX_ENTRIES),
        ..Default::default()
    };
    match auth.authority.store().find_entries(&query).await {
        Ok(entries) => {
            let template = IndexTemplate {
                heading: Heading::new(&site, current_user.as_ref().map(|u| &u.0)),
                entries,
            };
            HtmlTemplate(template).into_response()
        }
        Err(e) => AuthError::from(e).into_response(),
    }
}

/// Builds the router: pages, the JSON API and the identity middleware in
/// front of all of them.
pub fn app(shared_auth: SharedAuth, site: Site) -> Router {
    let api_routes = Router::new()
        .route("/login", post(api_login))
        .route("/whoami", get(whoami))
        .route("/entries", get(list_entries))
        .route("/entry", get(get_entry).post(create_entry))
        .route("/files", get(list_files).post(upload_file))
        .route("/password", post(api_change_password))
        .route("/delaccount", post(api_delete_account));

    let middleware_auth = shared_auth.clone();
    Router::new()
        .route("/", get(index))
        .route("/login", get(serve_login).post(check_username_password))
        .route("/logout", get(logout))
        .route("/signup", get(serve_signup).post(insert_username_password))
        .route("/password", get(serve_password).post(update_password))
        .route("/delaccount", get(serve_delete_account).post(delete_account))
        .route("/file/", get(serve_file))
        .nest("/api", api_routes)
        .route_layer(middleware::from_fn(move |req, next| {
            auth_middleware(req, next, middleware_auth.clone())
        }))
        .layer(Extension(shared_auth))
        .layer(Extension(site))
        .fallback(fallback.into_service())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn fallback() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}
