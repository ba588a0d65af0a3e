use crate::{
    auth::{carrier::UserRef, signature::Signature, AuthError, CurrentUser, SharedAuth},
    settings::Site,
    Heading, HtmlTemplate,
};
use askama::Template;
use axum::{
    extract::Form,
    http::{
        header::{self, HeaderMap, HeaderValue},
        StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    heading: Heading,
    username: String,
    error: String,
}

/// The `/login` form.
#[derive(Deserialize, Debug)]
pub struct LogIn {
    username: String,
    pwd: String,
}

/// Body of `POST /api/login`. The user is named by id or by username.
#[derive(Deserialize, Debug)]
pub struct ApiLogIn {
    userid: Option<i64>,
    username: Option<String>,
    password: String,
}

/// Identity and signature handed to API clients, which pass them back as the
/// `userid` and `sig` query parameters.
#[derive(Serialize, Debug)]
pub struct LoginResponse {
    /// The user's id.
    pub userid: i64,
    /// The user's name.
    pub username: String,
    /// Signature to present with `userid`.
    pub sig: Signature,
}

/// Headers carrying one `Set-Cookie` value. A value the header cannot hold
/// (a misconfigured cookie name) is logged and left out.
pub(crate) fn cookie_header(cookie: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            headers.insert(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("invalid Set-Cookie value: {}", e),
    }
    headers
}

/// Empty login form.
pub async fn serve_login(
    current_user: Option<Extension<CurrentUser>>,
    Extension(site): Extension<Site>,
) -> impl IntoResponse {
    let template = LoginTemplate {
        heading: Heading::new(&site, current_user.as_ref().map(|u| &u.0)),
        username: String::new(),
        error: String::new(),
    };
    (StatusCode::OK, HtmlTemplate(template))
}

/// Checks the login form and sets the signed cookie on success.
pub async fn check_username_password(
    Extension(auth): Extension<SharedAuth>,
    Extension(site): Extension<Site>,
    current_user: Option<Extension<CurrentUser>>,
    form: Form<LogIn>,
) -> Response {
    let log_in: LogIn = form.0;
    match auth
        .authority
        .issue_login(&UserRef::Name(log_in.username.clone()), &log_in.pwd)
        .await
    {
        Ok((user, signature)) => {
            let headers = cookie_header(&auth.login_cookie(user.user_id, &signature));
            (headers, Redirect::to("/")).into_response()
        }
        Err(e) => {
            let template = LoginTemplate {
                heading: Heading::new(&site, current_user.as_ref().map(|u| &u.0)),
                username: log_in.username,
                error: e.public_message(),
            };
            (e.status_code(), HtmlTemplate(template)).into_response()
        }
    }
}

/// Clears the login cookie. Signatures already handed out stay valid.
pub async fn logout(Extension(auth): Extension<SharedAuth>) -> impl IntoResponse {
    (cookie_header(&auth.logout_cookie()), Redirect::to("/"))
}

/// JSON login. `userid` wins over `username` when both are given.
pub async fn api_login(
    Extension(auth): Extension<SharedAuth>,
    Json(log_in): Json<ApiLogIn>,
) -> Result<Json<LoginResponse>, AuthError> {
    let user = match (log_in.userid, log_in.username) {
        (Some(id), _) => UserRef::Id(id),
        (None, Some(name)) => UserRef::Name(name),
        (None, None) => return Err(AuthError::IncorrectCredentials),
    };
    let (user, signature) = auth.authority.issue_login(&user, &log_in.password).await?;
    Ok(Json(LoginResponse {
        userid: user.user_id,
        username: user.username,
        sig: signature,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_set_cookie_header() {
        let headers = cookie_header("useridtok=2%7Csig; Path=/; SameSite=Lax");
        assert_eq!(
            headers.get(header::SET_COOKIE).unwrap(),
            "useridtok=2%7Csig; Path=/; SameSite=Lax"
        );
    }

    #[test]
    fn should_skip_invalid_set_cookie_values() {
        let headers = cookie_header("bad\nname=1");
        assert!(headers.get(header::SET_COOKIE).is_none());
    }
}
