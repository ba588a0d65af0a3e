mod account;
mod authority;
mod carrier;
mod error;
mod login;
mod middleware;
mod password;
mod register;
mod signature;

pub use account::{
    api_change_password, api_delete_account, delete_account, serve_delete_account,
    serve_password, update_password,
};
pub use authority::Authority;
pub use carrier::{
    decode_cookie_value, encode_cookie_value, login_cookie, logout_cookie, parse_cookie_header,
    parse_query, CredentialCarrier, CredentialSource, Credentials, UserRef,
};
pub use error::AuthError;
pub use login::{api_login, check_username_password, logout, serve_login};
pub use middleware::auth as auth_middleware;
pub use password::{hash_password, verify_password, PasswordScheme};
pub use register::{insert_username_password, serve_signup};
pub use signature::{derive_signature, validate_signature, Signature};

use crate::{
    settings,
    store::{SqliteStore, User},
};
use serde::Serialize;
use std::sync::Arc;

/// Authority shared by all request handlers.
pub type SharedAuth = Arc<AuthContext>;

/// The authority together with the transport settings the HTTP layer needs.
pub struct AuthContext {
    /// Credential and session checks.
    pub authority: Authority<SqliteStore>,
    /// Cookie name, administrator id, work factor.
    pub settings: settings::Auth,
}

impl AuthContext {
    /// `Set-Cookie` value carrying a fresh login.
    pub fn login_cookie(&self, user_id: i64, signature: &Signature) -> String {
        login_cookie(
            &self.settings.cookie_name,
            self.settings.secure_cookie,
            user_id,
            signature,
        )
    }

    /// `Set-Cookie` value clearing the login.
    pub fn logout_cookie(&self) -> String {
        logout_cookie(&self.settings.cookie_name)
    }

    /// Only the account owner or the administrator may change or delete an
    /// account.
    pub fn may_manage(&self, acting: &CurrentUser, target_user_id: i64) -> bool {
        acting.user_id == target_user_id || acting.is_admin
    }
}

/// Builds the shared authority over `store`.
pub fn new_shared_auth(store: SqliteStore, settings: &settings::Auth) -> Result<SharedAuth, AuthError> {
    let scheme = PasswordScheme::new(&settings.hashing)?;
    Ok(Arc::new(AuthContext {
        authority: Authority::new(store, scheme),
        settings: settings.clone(),
    }))
}

/// A structure representing the user currently logged in.
#[derive(Clone, Debug, Serialize)]
pub struct CurrentUser {
    /// The user identification number.
    #[serde(rename = "userid")]
    pub user_id: i64,
    /// The user's login handle.
    pub username: String,
    /// A bool representing wether the user is an administrator.
    pub is_admin: bool,
}

impl CurrentUser {
    /// Wraps a resolved user, flagging the administrator.
    pub fn new(user: User, admin_id: i64) -> CurrentUser {
        CurrentUser {
            is_admin: user.user_id == admin_id,
            user_id: user.user_id,
            username: user.username,
        }
    }
}
