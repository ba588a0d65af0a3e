use crate::{
    auth::{
        carrier::{CredentialCarrier, UserRef},
        password::PasswordScheme,
        signature::{derive_signature, validate_signature, Signature},
        AuthError,
    },
    store::{is_unique_violation, ContentRepository, User},
};

/// Password checks, session signatures and the account flows that depend on
/// them. Holds no session state: every check re-reads the user row.
pub struct Authority<S> {
    store: S,
    scheme: PasswordScheme,
}

impl<S> Authority<S>
where
    S: ContentRepository,
{
    /// Wraps a store; `scheme` hashes new passwords and signatures.
    pub fn new(store: S, scheme: PasswordScheme) -> Authority<S> {
        Authority { store, scheme }
    }

    /// The user and content store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The password scheme, also used for signatures.
    pub fn scheme(&self) -> &PasswordScheme {
        &self.scheme
    }

    /// Looks a user up by id or by name.
    pub async fn find_user(&self, user: &UserRef) -> sqlx::Result<Option<User>> {
        match user {
            UserRef::Id(id) => self.store.find_by_id(*id).await,
            UserRef::Name(name) => self.store.find_by_username(name).await,
        }
    }

    /// See [`derive_signature`].
    pub fn derive_signature(&self, user: &User) -> Result<Signature, AuthError> {
        derive_signature(&self.scheme, user)
    }

    /// See [`validate_signature`].
    pub fn validate_signature(&self, signature: &str, user: &User) -> bool {
        validate_signature(&self.scheme, signature, user)
    }

    /// Creates an account. The existence check is only a fast path; two
    /// concurrent signups for one name are settled by the unique constraint
    /// on `user.username`.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<User, AuthError> {
        if username.trim().is_empty() {
            return Err(AuthError::InvalidUsername);
        }
        if self.store.exists_by_username(username).await? {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }
        let password_hash = self.scheme.hash(password)?;
        match self.store.insert(username, &password_hash).await {
            Ok(user) => {
                tracing::info!("created user '{}' ({})", user.username, user.user_id);
                Ok(user)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(AuthError::UsernameTaken(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checks a password and returns the user it belongs to. Unknown users
    /// and wrong passwords fail alike, and both pay for one argon2 hash.
    async fn authenticate(&self, user: &UserRef, password: &str) -> Result<User, AuthError> {
        let found = match self.find_user(user).await? {
            Some(found) => found,
            None => {
                self.scheme.verify_dummy(password);
                tracing::warn!("login failed: no user '{}'", user);
                return Err(AuthError::IncorrectCredentials);
            }
        };
        if !self.scheme.verify(&found.password, password) {
            tracing::warn!("login failed: wrong password for '{}'", found.username);
            return Err(AuthError::IncorrectCredentials);
        }
        Ok(found)
    }

    /// Verifies the password and hands out a fresh signature. Storing it in
    /// a cookie or returning it to an API client is up to the caller.
    pub async fn issue_login(
        &self,
        user: &UserRef,
        password: &str,
    ) -> Result<(User, Signature), AuthError> {
        let found = self.authenticate(user, password).await?;
        let signature = self.derive_signature(&found)?;
        tracing::debug!("issued signature for '{}'", found.username);
        Ok((found, signature))
    }

    /// Resolves the user a request is authenticated as, if any.
    ///
    /// Unknown users, bad signatures and storage failures all come back as
    /// `None`; only the log tells them apart.
    pub async fn validate_request_identity(&self, carrier: &CredentialCarrier) -> Option<User> {
        let (credentials, source) = carrier.credentials()?;
        let user = match self.find_user(&credentials.user).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!("{} name unknown user '{}'", source, credentials.user);
                return None;
            }
            Err(e) => {
                tracing::error!("cannot resolve '{}': {}", credentials.user, e);
                return None;
            }
        };
        if !self.validate_signature(&credentials.signature, &user) {
            tracing::warn!("signature not validated for '{}' ({})", user.username, source);
            return None;
        }
        Some(user)
    }

    /// Replaces the password of `user_id` after checking `old_password`.
    ///
    /// Every signature issued before the change stops validating. No new one
    /// is issued here; callers log in again with the new password.
    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        let user = self.authenticate(&UserRef::Id(user_id), old_password).await?;
        let password_hash = self.scheme.hash(new_password)?;
        if !self.store.update_password_hash(user_id, &password_hash).await? {
            return Err(AuthError::NotFound);
        }
        tracing::info!("password changed for '{}'", user.username);
        Ok(())
    }

    /// Deletes `user_id` after checking its password. Its entries and files
    /// go to `fallback_user_id` first.
    pub async fn delete_account(
        &self,
        user_id: i64,
        password: &str,
        fallback_user_id: i64,
    ) -> Result<(), AuthError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        if user_id == fallback_user_id {
            return Err(AuthError::ProtectedAccount);
        }
        let user = self.authenticate(&UserRef::Id(user_id), password).await?;
        if !self
            .store
            .transfer_and_delete(user_id, fallback_user_id)
            .await?
        {
            return Err(AuthError::NotFound);
        }
        tracing::info!(
            "deleted user '{}', content now owned by user {}",
            user.username,
            fallback_user_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{carrier::Credentials, password::cheap_scheme},
        store::{memory_store, EntryQuery, FileQuery, NewEntry, SqliteStore, UserRepository},
    };
    use crate::settings::Hashing;
    use async_trait::async_trait;
    use std::time::{Duration, Instant};

    const ADMIN_ID: i64 = 1;

    async fn authority() -> Authority<SqliteStore> {
        Authority::new(memory_store().await, cheap_scheme())
    }

    fn cookie_carrier(user: UserRef, signature: &Signature) -> CredentialCarrier {
        CredentialCarrier {
            explicit: None,
            cookie: Some(Credentials {
                user,
                signature: signature.to_string(),
            }),
        }
    }

    fn name(username: &str) -> UserRef {
        UserRef::Name(username.to_string())
    }

    #[tokio::test]
    async fn should_sign_up_and_log_in() {
        let auth = authority().await;
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        let (user, sig) = auth.issue_login(&name("alice"), "p1").await.unwrap();
        assert_eq!(user, alice);
        assert!(auth.validate_signature(sig.as_str(), &user));

        let (by_id, _) = auth.issue_login(&UserRef::Id(alice.user_id), "p1").await.unwrap();
        assert_eq!(by_id.username, "alice");
    }

    #[tokio::test]
    async fn should_fail_unknown_user_and_wrong_password_alike() {
        let auth = authority().await;
        auth.sign_up("alice", "p1").await.unwrap();
        let unknown = auth.issue_login(&name("bob"), "p1").await.unwrap_err();
        let wrong = auth.issue_login(&name("alice"), "nope").await.unwrap_err();
        assert!(matches!(unknown, AuthError::IncorrectCredentials));
        assert!(matches!(wrong, AuthError::IncorrectCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn should_log_in_seed_admin_with_empty_password() {
        let auth = authority().await;
        let (admin, sig) = auth.issue_login(&UserRef::Id(ADMIN_ID), "").await.unwrap();
        assert_eq!(admin.username, "admin");
        assert!(auth.issue_login(&UserRef::Id(ADMIN_ID), "x").await.is_err());
        let carrier = cookie_carrier(UserRef::Id(ADMIN_ID), &sig);
        assert_eq!(auth.validate_request_identity(&carrier).await, Some(admin));
    }

    #[tokio::test]
    async fn should_reject_taken_and_empty_usernames() {
        let auth = authority().await;
        auth.sign_up("alice", "p1").await.unwrap();
        assert!(matches!(
            auth.sign_up("alice", "p2").await,
            Err(AuthError::UsernameTaken(name)) if name == "alice"
        ));
        assert!(matches!(
            auth.sign_up("  ", "p2").await,
            Err(AuthError::InvalidUsername)
        ));
    }

    /// Store whose existence check always misses, as when a concurrent signup
    /// inserts between the check and the insert.
    struct StaleExistenceStore(SqliteStore);

    #[async_trait]
    impl UserRepository for StaleExistenceStore {
        async fn find_by_id(&self, user_id: i64) -> sqlx::Result<Option<User>> {
            self.0.find_by_id(user_id).await
        }

        async fn find_by_username(&self, username: &str) -> sqlx::Result<Option<User>> {
            self.0.find_by_username(username).await
        }

        async fn exists_by_username(&self, _username: &str) -> sqlx::Result<bool> {
            Ok(false)
        }

        async fn insert(&self, username: &str, password_hash: &str) -> sqlx::Result<User> {
            self.0.insert(username, password_hash).await
        }

        async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> sqlx::Result<bool> {
            self.0.update_password_hash(user_id, password_hash).await
        }

        async fn delete(&self, user_id: i64) -> sqlx::Result<bool> {
            self.0.delete(user_id).await
        }
    }

    #[async_trait]
    impl ContentRepository for StaleExistenceStore {
        async fn reassign_owner(&self, from_user_id: i64, to_user_id: i64) -> sqlx::Result<u64> {
            self.0.reassign_owner(from_user_id, to_user_id).await
        }
    }

    #[tokio::test]
    async fn should_map_unique_constraint_to_username_taken() {
        let auth = Authority::new(StaleExistenceStore(memory_store().await), cheap_scheme());
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        assert!(matches!(
            auth.sign_up("alice", "p2").await,
            Err(AuthError::UsernameTaken(name)) if name == "alice"
        ));
        // the first account is untouched
        let (user, _) = auth.issue_login(&name("alice"), "p1").await.unwrap();
        assert_eq!(user, alice);
    }

    #[tokio::test]
    async fn should_hash_even_when_user_is_unknown() {
        let scheme = PasswordScheme::new(&Hashing {
            m_cost: 2048,
            t_cost: 2,
            p_cost: 1,
        })
        .unwrap();
        let auth = Authority::new(memory_store().await, scheme);
        auth.sign_up("alice", "p1").await.unwrap();

        let mut wrong_password = Duration::MAX;
        let mut unknown_user = Duration::MAX;
        for _ in 0..3 {
            let start = Instant::now();
            assert!(auth.issue_login(&name("alice"), "nope").await.is_err());
            wrong_password = wrong_password.min(start.elapsed());

            let start = Instant::now();
            assert!(matches!(
                auth.issue_login(&name("bob"), "nope").await,
                Err(AuthError::IncorrectCredentials)
            ));
            unknown_user = unknown_user.min(start.elapsed());
        }
        assert!(
            unknown_user * 3 >= wrong_password,
            "unknown user took {:?}, wrong password {:?}",
            unknown_user,
            wrong_password
        );
    }

    #[tokio::test]
    async fn should_resolve_cookie_and_explicit_credentials() {
        let auth = authority().await;
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        let (_, sig) = auth.issue_login(&name("alice"), "p1").await.unwrap();

        let by_cookie = cookie_carrier(UserRef::Id(alice.user_id), &sig);
        assert_eq!(auth.validate_request_identity(&by_cookie).await, Some(alice.clone()));

        let explicit = CredentialCarrier {
            explicit: Some(Credentials {
                user: name("alice"),
                signature: sig.to_string(),
            }),
            cookie: None,
        };
        assert_eq!(auth.validate_request_identity(&explicit).await, Some(alice));
    }

    #[tokio::test]
    async fn should_not_fall_back_to_cookie_when_explicit_credentials_fail() {
        let auth = authority().await;
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        let (_, sig) = auth.issue_login(&name("alice"), "p1").await.unwrap();
        let carrier = CredentialCarrier {
            explicit: Some(Credentials {
                user: UserRef::Id(alice.user_id),
                signature: "forged".to_string(),
            }),
            cookie: cookie_carrier(UserRef::Id(alice.user_id), &sig).cookie,
        };
        assert_eq!(auth.validate_request_identity(&carrier).await, None);
    }

    #[tokio::test]
    async fn should_collapse_unknown_user_and_bad_signature_to_none() {
        let auth = authority().await;
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        let (_, sig) = auth.issue_login(&name("alice"), "p1").await.unwrap();

        assert_eq!(
            auth.validate_request_identity(&cookie_carrier(UserRef::Id(999), &sig))
                .await,
            None
        );
        // alice's signature does not authenticate the admin
        assert_eq!(
            auth.validate_request_identity(&cookie_carrier(UserRef::Id(ADMIN_ID), &sig))
                .await,
            None
        );
        assert_eq!(
            auth.validate_request_identity(&CredentialCarrier::default()).await,
            None
        );
        assert!(auth.store().find_by_id(alice.user_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_revoke_signatures_on_password_change() {
        let auth = authority().await;
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        let (_, s1) = auth.issue_login(&name("alice"), "p1").await.unwrap();

        assert!(matches!(
            auth.change_password(alice.user_id, "wrong", "p2").await,
            Err(AuthError::IncorrectCredentials)
        ));
        auth.change_password(alice.user_id, "p1", "p2").await.unwrap();

        let carrier = cookie_carrier(UserRef::Id(alice.user_id), &s1);
        assert_eq!(auth.validate_request_identity(&carrier).await, None);
        assert!(auth.issue_login(&name("alice"), "p1").await.is_err());
        let (user, s2) = auth.issue_login(&name("alice"), "p2").await.unwrap();
        let carrier = cookie_carrier(UserRef::Id(alice.user_id), &s2);
        assert_eq!(auth.validate_request_identity(&carrier).await, Some(user));
    }

    #[tokio::test]
    async fn should_report_missing_target_as_not_found() {
        let auth = authority().await;
        assert!(matches!(
            auth.change_password(42, "a", "b").await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            auth.delete_account(42, "a", ADMIN_ID).await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn should_hand_content_to_admin_on_delete() {
        let auth = authority().await;
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        let store = auth.store();
        store
            .create_entry(&NewEntry::new("first", "hello"), alice.user_id)
            .await
            .unwrap();
        store
            .create_file("a.txt", b"a", alice.user_id)
            .await
            .unwrap();

        assert!(matches!(
            auth.delete_account(alice.user_id, "wrong", ADMIN_ID).await,
            Err(AuthError::IncorrectCredentials)
        ));
        assert!(store.find_by_id(alice.user_id).await.unwrap().is_some());

        auth.delete_account(alice.user_id, "p1", ADMIN_ID)
            .await
            .unwrap();
        assert!(store.find_by_id(alice.user_id).await.unwrap().is_none());
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        let entries = store.find_entries(&EntryQuery::default()).await.unwrap();
        assert!(entries.iter().all(|e| e.user_id == ADMIN_ID));
        let files = store.find_files(&FileQuery::default()).await.unwrap();
        assert!(files.iter().all(|f| f.user_id == ADMIN_ID));
    }

    #[tokio::test]
    async fn should_refuse_to_delete_fallback_account() {
        let auth = authority().await;
        assert!(matches!(
            auth.delete_account(ADMIN_ID, "", ADMIN_ID).await,
            Err(AuthError::ProtectedAccount)
        ));
        assert!(auth.store().find_by_id(ADMIN_ID).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_follow_alice_scenario() {
        let auth = authority().await;
        let alice = auth.sign_up("alice", "p1").await.unwrap();
        let (_, s1) = auth.issue_login(&name("alice"), "p1").await.unwrap();
        auth.store()
            .create_entry(&NewEntry::new("alice writes", ""), alice.user_id)
            .await
            .unwrap();

        auth.change_password(alice.user_id, "p1", "p2").await.unwrap();
        let current = auth.store().find_by_id(alice.user_id).await.unwrap().unwrap();
        assert!(!auth.validate_signature(s1.as_str(), &current));
        let (_, s2) = auth.issue_login(&name("alice"), "p2").await.unwrap();
        assert!(auth.validate_signature(s2.as_str(), &current));

        auth.delete_account(alice.user_id, "p2", ADMIN_ID)
            .await
            .unwrap();
        let entries = auth
            .store()
            .find_entries(&EntryQuery::default())
            .await
            .unwrap();
        assert_eq!(entries[0].user_id, ADMIN_ID);
        assert!(auth.store().find_by_username("alice").await.unwrap().is_none());
    }
}
