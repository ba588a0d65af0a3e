use crate::{auth::AuthError, settings::Hashing};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

// Salt of hashes computed only to spend time; never stored.
const DUMMY_SALT: &str = "ZnJlZWJsb2dkdW1teXNhbHQ";

/// Salted Argon2id hashing with a configurable work factor.
#[derive(Clone)]
pub struct PasswordScheme {
    argon2: Argon2<'static>,
}

impl PasswordScheme {
    /// Argon2id with the configured work factor. Fails on parameters argon2
    /// rejects.
    pub fn new(hashing: &Hashing) -> Result<PasswordScheme, AuthError> {
        let params = Params::new(hashing.m_cost, hashing.t_cost, hashing.p_cost, None)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        Ok(PasswordScheme {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hashes `plaintext` under a fresh random salt, so two calls with the
    /// same input return different strings.
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AuthError::Configuration(e.to_string()))?
            .to_string();
        Ok(password_hash)
    }

    /// Checks `plaintext` against a stored hash. An empty hash only accepts an
    /// empty password; that is how the seeded administrator logs in before a
    /// password is set. Malformed hashes never verify.
    pub fn verify(&self, stored_hash: &str, plaintext: &str) -> bool {
        if stored_hash.is_empty() {
            return plaintext.is_empty();
        }
        match PasswordHash::new(stored_hash) {
            // The cost parameters come from the stored hash, not from `self`.
            Ok(parsed_hash) => self
                .argon2
                .verify_password(plaintext.as_bytes(), &parsed_hash)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Spends the work of one [`verify`](Self::verify) call without checking
    /// anything, so a lookup that found no user costs as much as a wrong
    /// password.
    pub fn verify_dummy(&self, plaintext: &str) {
        if let Ok(salt) = SaltString::new(DUMMY_SALT) {
            let _ = self.argon2.hash_password(plaintext.as_bytes(), &salt);
        }
    }
}

impl Default for PasswordScheme {
    fn default() -> Self {
        PasswordScheme {
            argon2: Argon2::default(),
        }
    }
}

/// Hashes with the default work factor.
pub fn hash_password(plaintext: &str) -> Result<String, AuthError> {
    PasswordScheme::default().hash(plaintext)
}

/// Verifies with [`PasswordScheme::verify`] semantics.
pub fn verify_password(stored_hash: &str, plaintext: &str) -> bool {
    PasswordScheme::default().verify(stored_hash, plaintext)
}

#[cfg(test)]
pub(crate) fn cheap_scheme() -> PasswordScheme {
    PasswordScheme::new(&Hashing {
        m_cost: 64,
        t_cost: 1,
        p_cost: 1,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accept_empty_password_for_empty_hash() {
        assert!(verify_password("", ""));
        assert!(!verify_password("", "anything-nonempty"));
    }

    #[test]
    fn should_verify_hashed_passwords() {
        let hash = hash_password("secret").unwrap();
        assert!(verify_password(&hash, "secret"));
        assert!(!verify_password(&hash, "wrong"));
        assert!(!verify_password(&hash, ""));
    }

    #[test]
    fn should_hash_with_the_dummy_salt() {
        let salt = SaltString::new(DUMMY_SALT).unwrap();
        let scheme = cheap_scheme();
        assert!(scheme.argon2.hash_password(b"secret", &salt).is_ok());
        scheme.verify_dummy("secret");
    }

    #[test]
    fn should_salt_every_hash() {
        let scheme = cheap_scheme();
        let first = scheme.hash("secret").unwrap();
        let second = scheme.hash("secret").unwrap();
        assert_ne!(first, second);
        assert!(scheme.verify(&first, "secret"));
        assert!(scheme.verify(&second, "secret"));
    }

    #[test]
    fn should_reject_malformed_hashes() {
        let scheme = cheap_scheme();
        assert!(!scheme.verify("not-a-phc-string", "not-a-phc-string"));
        assert!(!scheme.verify("$argon2id$v=19$garbage", "secret"));
    }

    #[test]
    fn should_verify_hashes_made_with_another_work_factor() {
        let hash = cheap_scheme().hash("secret").unwrap();
        assert!(PasswordScheme::default().verify(&hash, "secret"));
    }

    #[test]
    fn should_refuse_invalid_work_factor() {
        let err = PasswordScheme::new(&Hashing {
            m_cost: 0,
            t_cost: 0,
            p_cost: 0,
        });
        assert!(matches!(err, Err(AuthError::Configuration(_))));
    }
}
