use crate::{
    auth::{
        carrier::UserRef,
        login::{cookie_header, LoginResponse},
        signature::Signature,
        AuthError, CurrentUser, SharedAuth,
    },
    json_error,
    settings::Site,
    store::{User, UserRepository},
    Heading, HtmlTemplate,
};
use askama::Template;
use axum::{
    extract::{Form, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

const MUST_LOG_IN: &str = "Must be logged in";
const NOT_ALLOWED: &str = "Not allowed to manage this account";

#[derive(Template)]
#[template(path = "password.html")]
struct PasswordTemplate {
    heading: Heading,
    error: String,
}

#[derive(Template)]
#[template(path = "delaccount.html")]
struct DeleteAccountTemplate {
    heading: Heading,
    target_id: i64,
    target_username: String,
    error: String,
}

/// The `/password` form.
#[derive(Deserialize, Debug)]
pub struct PasswordChange {
    pwd: String,
    newpwd: String,
    newpwd2: String,
}

/// The `/delaccount` form.
#[derive(Deserialize, Debug)]
pub struct AccountDeletion {
    userid: Option<i64>,
    pwd: String,
}

/// `?userid=` naming the account to manage; the caller's own when absent.
#[derive(Deserialize, Debug)]
pub struct TargetQuery {
    userid: Option<i64>,
}

/// Body of `POST /api/password`.
#[derive(Deserialize, Debug)]
pub struct ApiPasswordChange {
    userid: Option<i64>,
    password: String,
    newpassword: String,
}

/// Body of `POST /api/delaccount`.
#[derive(Deserialize, Debug)]
pub struct ApiAccountDeletion {
    userid: Option<i64>,
    password: String,
}

fn password_page(status: StatusCode, heading: Heading, error: String) -> Response {
    (status, HtmlTemplate(PasswordTemplate { heading, error })).into_response()
}

/// Password change form for the logged in user.
pub async fn serve_password(
    current_user: Option<Extension<CurrentUser>>,
    Extension(site): Extension<Site>,
) -> Response {
    match current_user {
        Some(Extension(user)) => {
            password_page(StatusCode::OK, Heading::new(&site, Some(&user)), String::new())
        }
        None => (StatusCode::UNAUTHORIZED, MUST_LOG_IN).into_response(),
    }
}

/// Changes the logged in user's password and stores the new signature in the
/// cookie, since the old one stopped validating.
pub async fn update_password(
    Extension(auth): Extension<SharedAuth>,
    Extension(site): Extension<Site>,
    current_user: Option<Extension<CurrentUser>>,
    form: Form<PasswordChange>,
) -> Response {
    let user = match current_user {
        Some(Extension(user)) => user,
        None => return (StatusCode::UNAUTHORIZED, MUST_LOG_IN).into_response(),
    };
    let change: PasswordChange = form.0;
    let heading = Heading::new(&site, Some(&user));
    if change.newpwd != change.newpwd2 {
        return password_page(
            StatusCode::BAD_REQUEST,
            heading,
            "passwords don't match".to_string(),
        );
    }
    match change_and_relogin(&auth, user.user_id, &change.pwd, &change.newpwd).await {
        Ok((user, signature)) => {
            let headers = cookie_header(&auth.login_cookie(user.user_id, &signature));
            (headers, Redirect::to("/")).into_response()
        }
        Err(e) => password_page(e.status_code(), heading, e.public_message()),
    }
}

/// Confirmation page for deleting the account in `?userid=`, the caller's
/// own by default. Only the owner and the administrator get the form.
pub async fn serve_delete_account(
    Extension(auth): Extension<SharedAuth>,
    Extension(site): Extension<Site>,
    current_user: Option<Extension<CurrentUser>>,
    Query(target): Query<TargetQuery>,
) -> Response {
    let user = match current_user {
        Some(Extension(user)) => user,
        None => return (StatusCode::UNAUTHORIZED, MUST_LOG_IN).into_response(),
    };
    let target_id = target.userid.unwrap_or(user.user_id);
    if !auth.may_manage(&user, target_id) {
        return (StatusCode::FORBIDDEN, NOT_ALLOWED).into_response();
    }
    let target_user = match auth.authority.store().find_by_id(target_id).await {
        Ok(Some(target_user)) => target_user,
        Ok(None) => return AuthError::NotFound.into_response(),
        Err(e) => return AuthError::from(e).into_response(),
    };
    let template = DeleteAccountTemplate {
        heading: Heading::new(&site, Some(&user)),
        target_id,
        target_username: target_user.username,
        error: String::new(),
    };
    HtmlTemplate(template).into_response()
}

/// Deletes the account named by the form (the logged in user by default).
/// The password is the one of the account being deleted.
pub async fn delete_account(
    Extension(auth): Extension<SharedAuth>,
    Extension(site): Extension<Site>,
    current_user: Option<Extension<CurrentUser>>,
    form: Form<AccountDeletion>,
) -> Response {
    let user = match current_user {
        Some(Extension(user)) => user,
        None => return (StatusCode::UNAUTHORIZED, MUST_LOG_IN).into_response(),
    };
    let deletion: AccountDeletion = form.0;
    let target_id = deletion.userid.unwrap_or(user.user_id);
    if !auth.may_manage(&user, target_id) {
        tracing::warn!(
            "'{}' tried to delete account {} without permission",
            user.username,
            target_id
        );
        return (StatusCode::FORBIDDEN, NOT_ALLOWED).into_response();
    }
    match auth
        .authority
        .delete_account(target_id, &deletion.pwd, auth.settings.admin_id)
        .await
    {
        Ok(()) if target_id == user.user_id => {
            (cookie_header(&auth.logout_cookie()), Redirect::to("/")).into_response()
        }
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => {
            let template = DeleteAccountTemplate {
                heading: Heading::new(&site, Some(&user)),
                target_id,
                target_username: String::new(),
                error: e.public_message(),
            };
            (e.status_code(), HtmlTemplate(template)).into_response()
        }
    }
}

async fn change_and_relogin(
    auth: &SharedAuth,
    user_id: i64,
    password: &str,
    new_password: &str,
) -> Result<(User, Signature), AuthError> {
    auth.authority
        .change_password(user_id, password, new_password)
        .await?;
    auth.authority
        .issue_login(&UserRef::Id(user_id), new_password)
        .await
}

/// Changes a password and answers with a fresh signature for the target
/// account.
pub async fn api_change_password(
    Extension(auth): Extension<SharedAuth>,
    current_user: Option<Extension<CurrentUser>>,
    Json(change): Json<ApiPasswordChange>,
) -> Response {
    let user = match current_user {
        Some(Extension(user)) => user,
        None => return json_error(StatusCode::UNAUTHORIZED, MUST_LOG_IN),
    };
    let target_id = change.userid.unwrap_or(user.user_id);
    if !auth.may_manage(&user, target_id) {
        return json_error(StatusCode::FORBIDDEN, NOT_ALLOWED);
    }
    match change_and_relogin(&auth, target_id, &change.password, &change.newpassword).await {
        Ok((target, signature)) => Json(LoginResponse {
            userid: target.user_id,
            username: target.username,
            sig: signature,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// JSON account deletion; answers `{"deleted": <userid>}`.
pub async fn api_delete_account(
    Extension(auth): Extension<SharedAuth>,
    current_user: Option<Extension<CurrentUser>>,
    Json(deletion): Json<ApiAccountDeletion>,
) -> Response {
    let user = match current_user {
        Some(Extension(user)) => user,
        None => return json_error(StatusCode::UNAUTHORIZED, MUST_LOG_IN),
    };
    let target_id = deletion.userid.unwrap_or(user.user_id);
    if !auth.may_manage(&user, target_id) {
        return json_error(StatusCode::FORBIDDEN, NOT_ALLOWED);
    }
    match auth
        .authority
        .delete_account(target_id, &deletion.password, auth.settings.admin_id)
        .await
    {
        Ok(()) => Json(json!({ "deleted": target_id })).into_response(),
        Err(e) => e.into_response(),
    }
}
