use crate::store::SqliteStore;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

// Beyond this many collisions the last candidate is used as is.
const MAX_FILENAME_SUFFIX: u32 = 100;

/// A blog entry joined with its owner's username.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Entry {
    /// Row id.
    #[serde(rename = "entryid")]
    pub entry_id: i64,
    /// Title shown in listings.
    pub title: String,
    /// Markdown source.
    pub body: String,
    /// Creation time, RFC 3339.
    pub createdt: String,
    /// Owner; the administrator once the author deleted their account.
    #[serde(rename = "userid")]
    pub user_id: i64,
    /// Owner's username, empty if the owner row is gone.
    pub username: String,
}

/// Payload accepted when creating an entry.
#[derive(Clone, Debug, Deserialize)]
pub struct NewEntry {
    /// Must not be blank.
    pub title: String,
    /// Markdown source, empty when omitted.
    #[serde(default)]
    pub body: String,
}

impl NewEntry {
    /// An entry with the given title and body.
    pub fn new(title: &str, body: &str) -> NewEntry {
        NewEntry {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

/// Filters of `GET /api/entries`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EntryQuery {
    /// Only entries owned by this user. Next to `sig` without `userid` this
    /// parameter also names the caller.
    pub username: Option<String>,
    /// At most this many rows; zero or negative means all.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

/// An uploaded file, without its bytes.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct File {
    /// Row id.
    #[serde(rename = "fileid")]
    pub file_id: i64,
    /// Unique stored name.
    pub filename: String,
    /// Upload time, RFC 3339.
    pub createdt: String,
    /// Owner.
    #[serde(rename = "userid")]
    pub user_id: i64,
    /// Owner's username, empty if the owner row is gone.
    pub username: String,
}

impl File {
    /// Link the file is downloaded from.
    pub fn url(&self) -> String {
        file_url(&self.filename)
    }
}

/// Download link of the file stored as `filename`.
pub fn file_url(filename: &str) -> String {
    format!("/file/?filename={}", urlencoding::encode(filename))
}

/// Filters of `GET /api/files`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileQuery {
    /// Only files owned by this user; see [`EntryQuery::username`].
    pub username: Option<String>,
    /// Substring of the stored name.
    pub filename: Option<String>,
    /// At most this many rows; zero or negative means all.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

fn now_isodate() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

// SQLite reads a negative LIMIT as "no limit".
fn limit_offset(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.filter(|l| *l > 0).unwrap_or(-1),
        offset.filter(|o| *o > 0).unwrap_or(0),
    )
}

fn numbered_filename(filename: &str, n: u32) -> String {
    match filename.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &filename[..dot], n, &filename[dot..]),
        _ => format!("{} ({})", filename, n),
    }
}

impl SqliteStore {
    /// Inserts an entry owned by `user_id` and returns its id.
    pub async fn create_entry(&self, entry: &NewEntry, user_id: i64) -> sqlx::Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO entry (title, body, createdt, user_id) VALUES ( ?, ?, ?, ? )"#,
        )
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(now_isodate())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// One entry with its owner.
    pub async fn find_entry(&self, entry_id: i64) -> sqlx::Result<Option<Entry>> {
        sqlx::query_as::<_, Entry>(
            r#"SELECT entry_id, title, body, createdt, e.user_id AS user_id,
               IFNULL(u.username, '') AS username
               FROM entry e LEFT OUTER JOIN user u ON u.user_id = e.user_id
               WHERE entry_id = ?"#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Newest first.
    pub async fn find_entries(&self, query: &EntryQuery) -> sqlx::Result<Vec<Entry>> {
        let (limit, offset) = limit_offset(query.limit, query.offset);
        sqlx::query_as::<_, Entry>(
            r#"SELECT entry_id, title, body, createdt, e.user_id AS user_id,
               IFNULL(u.username, '') AS username
               FROM entry e LEFT OUTER JOIN user u ON u.user_id = e.user_id
               WHERE (?1 IS NULL OR u.username = ?1)
               ORDER BY entry_id DESC
               LIMIT ?2 OFFSET ?3"#,
        )
        .bind(query.username.as_deref().filter(|u| !u.is_empty()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Stores a file under a name no other file uses, suffixing ` (n)` before
    /// the extension on collision. Returns the id and the name stored.
    pub async fn create_file(
        &self,
        filename: &str,
        bytes: &[u8],
        user_id: i64,
    ) -> sqlx::Result<(i64, String)> {
        let filename = self.unique_filename(filename).await?;
        let result = sqlx::query(
            r#"INSERT INTO file (filename, bytes, createdt, user_id) VALUES ( ?, ?, ?, ? )"#,
        )
        .bind(&filename)
        .bind(bytes)
        .bind(now_isodate())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok((result.last_insert_rowid(), filename))
    }

    async fn unique_filename(&self, filename: &str) -> sqlx::Result<String> {
        let mut candidate = filename.to_string();
        for n in 1..=MAX_FILENAME_SUFFIX {
            let taken: Option<(i64,)> =
                sqlx::query_as(r#"SELECT file_id FROM file WHERE filename = ?"#)
                    .bind(&candidate)
                    .fetch_optional(&self.pool)
                    .await?;
            if taken.is_none() {
                break;
            }
            candidate = numbered_filename(filename, n);
        }
        Ok(candidate)
    }

    /// Raw content of the file stored as `filename`.
    pub async fn find_file_bytes(&self, filename: &str) -> sqlx::Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as(r#"SELECT bytes FROM file WHERE filename = ?"#)
                .bind(filename)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(bytes,)| bytes))
    }

    /// Newest first. `filename` matches as a substring.
    pub async fn find_files(&self, query: &FileQuery) -> sqlx::Result<Vec<File>> {
        let (limit, offset) = limit_offset(query.limit, query.offset);
        let pattern = query
            .filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(|f| format!("%{}%", f));
        sqlx::query_as::<_, File>(
            r#"SELECT file_id, filename, createdt, f.user_id AS user_id,
               IFNULL(u.username, '') AS username
               FROM file f LEFT OUTER JOIN user u ON u.user_id = f.user_id
               WHERE (?1 IS NULL OR u.username = ?1)
               AND (?2 IS NULL OR filename LIKE ?2)
               ORDER BY file_id DESC
               LIMIT ?3 OFFSET ?4"#,
        )
        .bind(query.username.as_deref().filter(|u| !u.is_empty()))
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}
