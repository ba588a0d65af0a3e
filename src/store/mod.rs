//! SQLite persistence for users, entries and files.
//!
//! The credential authority only sees the [`UserRepository`] and
//! [`ContentRepository`] contracts; [`SqliteStore`] is the implementation the
//! server runs with.

mod content;
mod users;

pub use content::{file_url, Entry, EntryQuery, File, FileQuery, NewEntry};

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// A row of the `user` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    /// Stable primary identifier.
    pub user_id: i64,
    /// Unique login handle.
    pub username: String,
    /// Stored password hash. Empty means no password has been set.
    #[serde(skip)]
    pub password: String,
}

/// Lookups and mutations of user rows.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// The user with primary key `user_id`.
    async fn find_by_id(&self, user_id: i64) -> sqlx::Result<Option<User>>;

    /// Usernames match exactly.
    async fn find_by_username(&self, username: &str) -> sqlx::Result<Option<User>>;

    /// True when `username` is taken.
    async fn exists_by_username(&self, username: &str) -> sqlx::Result<bool> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    /// Inserts a new user and returns the stored row.
    async fn insert(&self, username: &str, password_hash: &str) -> sqlx::Result<User>;

    /// Returns false when no row matched `user_id`.
    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> sqlx::Result<bool>;

    /// Returns false when no row matched `user_id`.
    async fn delete(&self, user_id: i64) -> sqlx::Result<bool>;
}

/// Ownership of entries and files.
#[async_trait]
pub trait ContentRepository: UserRepository {
    /// Hands every entry and file owned by `from_user_id` over to
    /// `to_user_id`. Returns the number of rows moved.
    async fn reassign_owner(&self, from_user_id: i64, to_user_id: i64) -> sqlx::Result<u64>;

    /// Reassigns the user's content, then deletes the user row.
    ///
    /// The default runs both steps as separate calls, so a failed delete
    /// leaves the content already reassigned. Stores that can should
    /// override this with a single transaction.
    async fn transfer_and_delete(&self, from_user_id: i64, to_user_id: i64) -> sqlx::Result<bool> {
        self.reassign_owner(from_user_id, to_user_id).await?;
        self.delete(from_user_id).await
    }
}

/// Store backed by an embedded SQLite database file.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wraps an already migrated pool.
    pub fn new(pool: SqlitePool) -> SqliteStore {
        SqliteStore { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Opens a pool on `url`. With `create` unset a missing database file is an
/// error.
pub async fn connect(url: &str, max_connections: u32, create: bool) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(create)
        .foreign_keys(true);
    // An in-memory database lives only as long as its connection.
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Creates the tables and seeds the administrator row.
pub async fn migrate(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::migrate!("database/migrations").run(pool).await?;
    Ok(())
}

/// True when `err` is SQLite refusing a duplicate value in a unique column.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("UNIQUE constraint failed"),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> SqliteStore {
    let pool = connect("sqlite::memory:", 1, true).await.unwrap();
    migrate(&pool).await.unwrap();
    SqliteStore::new(pool)
}
