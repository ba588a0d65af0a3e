use crate::store::{ContentRepository, SqliteStore, User, UserRepository};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnection;

#[async_trait]
impl UserRepository for SqliteStore {
    async fn find_by_id(&self, user_id: i64) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"SELECT user_id, username, password FROM user WHERE user_id = ?"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_username(&self, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"SELECT user_id, username, password FROM user WHERE username = ?"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert(&self, username: &str, password_hash: &str) -> sqlx::Result<User> {
        let user_id = sqlx::query(r#"INSERT INTO user (username, password) VALUES ( ?, ? )"#)
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(User {
            user_id,
            username: username.to_string(),
            password: password_hash.to_string(),
        })
    }

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> sqlx::Result<bool> {
        let result = sqlx::query(r#"UPDATE user SET password = ? WHERE user_id = ?"#)
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, user_id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query(r#"DELETE FROM user WHERE user_id = ?"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Moves every entry and file of `from_user_id` to `to_user_id` on one
/// connection, so it can run on the pool or inside a transaction. Returns the
/// entry and file counts.
async fn reassign_rows(
    conn: &mut SqliteConnection,
    from_user_id: i64,
    to_user_id: i64,
) -> sqlx::Result<(u64, u64)> {
    let entries = sqlx::query(r#"UPDATE entry SET user_id = ? WHERE user_id = ?"#)
        .bind(to_user_id)
        .bind(from_user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let files = sqlx::query(r#"UPDATE file SET user_id = ? WHERE user_id = ?"#)
        .bind(to_user_id)
        .bind(from_user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok((entries, files))
}

#[async_trait]
impl ContentRepository for SqliteStore {
    async fn reassign_owner(&self, from_user_id: i64, to_user_id: i64) -> sqlx::Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let (entries, files) = reassign_rows(&mut conn, from_user_id, to_user_id).await?;
        Ok(entries + files)
    }

    async fn transfer_and_delete(&self, from_user_id: i64, to_user_id: i64) -> sqlx::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let (entries, files) = reassign_rows(&mut tx, from_user_id, to_user_id).await?;
        let deleted = sqlx::query(r#"DELETE FROM user WHERE user_id = ?"#)
            .bind(from_user_id)
            .execute(&mut tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;
        tracing::debug!(
            "moved {} entries and {} files from user {} to user {}",
            entries,
            files,
            from_user_id,
            to_user_id
        );
        Ok(deleted)
    }
}
