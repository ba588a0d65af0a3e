use crate::{
    auth::{password::PasswordScheme, AuthError},
    store::User,
};
use serde::Serialize;
use std::fmt;

const SEPARATOR: char = '_';

/// Stateless session credential: a salted hash of the user's username and
/// current password hash. Nothing is stored server side; a signature stays
/// valid until either of the two inputs changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// The PHC string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Signature {
    fn from(s: String) -> Self {
        Signature(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn signed_input(user: &User) -> String {
    format!("{}{}{}", user.username, SEPARATOR, user.password)
}

/// Each call yields a different string for the same user; compare them with
/// [`validate_signature`], never with `==`.
pub fn derive_signature(scheme: &PasswordScheme, user: &User) -> Result<Signature, AuthError> {
    scheme.hash(&signed_input(user)).map(Signature)
}

/// False once the user's username or password hash differs from the ones
/// the signature was derived from.
pub fn validate_signature(scheme: &PasswordScheme, signature: &str, user: &User) -> bool {
    // The signed input is never empty, so the empty-hash bypass of
    // `PasswordScheme::verify` cannot apply here.
    scheme.verify(signature, &signed_input(user))
}
