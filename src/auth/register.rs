use crate::{
    auth::{carrier::UserRef, login::cookie_header, CurrentUser, SharedAuth},
    settings::Site,
    Heading, HtmlTemplate,
};
use askama::Template;
use axum::{
    extract::Form,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use serde::Deserialize;

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    heading: Heading,
    username: String,
    error: String,
}

/// The signup form.
#[derive(Deserialize)]
pub struct SignUp {
    /// Requested username.
    pub username: String,
    /// Password.
    pub pwd: String,
    /// Password again.
    pub pwd2: String,
}

fn signup_page(status: StatusCode, heading: Heading, username: String, error: String) -> Response {
    let template = SignupTemplate {
        heading,
        username,
        error,
    };
    (status, HtmlTemplate(template)).into_response()
}

/// Empty signup form.
pub async fn serve_signup(
    current_user: Option<Extension<CurrentUser>>,
    Extension(site): Extension<Site>,
) -> impl IntoResponse {
    let heading = Heading::new(&site, current_user.as_ref().map(|u| &u.0));
    signup_page(StatusCode::OK, heading, String::new(), String::new())
}

/// Creates the account and logs the new user in.
pub async fn insert_username_password(
    Extension(auth): Extension<SharedAuth>,
    Extension(site): Extension<Site>,
    current_user: Option<Extension<CurrentUser>>,
    form: Form<SignUp>,
) -> Response {
    let sign_up: SignUp = form.0;
    let heading = Heading::new(&site, current_user.as_ref().map(|u| &u.0));
    if sign_up.pwd != sign_up.pwd2 {
        tracing::debug!("signup passwords don't match");
        return signup_page(
            StatusCode::BAD_REQUEST,
            heading,
            sign_up.username,
            "passwords don't match".to_string(),
        );
    }
    if let Err(e) = auth.authority.sign_up(&sign_up.username, &sign_up.pwd).await {
        return signup_page(e.status_code(), heading, sign_up.username, e.public_message());
    }
    match auth
        .authority
        .issue_login(&UserRef::Name(sign_up.username.clone()), &sign_up.pwd)
        .await
    {
        Ok((user, signature)) => {
            let headers = cookie_header(&auth.login_cookie(user.user_id, &signature));
            (headers, Redirect::to("/")).into_response()
        }
        Err(e) => signup_page(e.status_code(), heading, sign_up.username, e.public_message()),
    }
}
