use crate::{
    auth::{CurrentUser, SharedAuth},
    json_error,
    store::{file_url, Entry, EntryQuery, File, FileQuery, NewEntry},
};
use axum::{
    body::Bytes,
    extract::Query,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A file listing row with the link it is downloaded from.
#[derive(Serialize, Debug)]
pub struct FileListing {
    /// The stored file, without its bytes.
    #[serde(flatten)]
    pub file: File,
    /// Download link, see [`File::url`].
    pub url: String,
}

impl From<File> for FileListing {
    fn from(file: File) -> Self {
        FileListing {
            url: file.url(),
            file,
        }
    }
}

/// `?filename=` of the file routes.
#[derive(Deserialize, Debug)]
pub struct FileName {
    filename: String,
}

/// `?entryid=` of `GET /api/entry`.
#[derive(Deserialize, Debug)]
pub struct EntryId {
    entryid: i64,
}

fn database_error(e: sqlx::Error) -> Response {
    tracing::error!("database error: {}", e);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server database error")
}

/// Who the request is authenticated as.
pub async fn whoami(current_user: Option<Extension<CurrentUser>>) -> Response {
    match current_user {
        Some(Extension(user)) => Json(user).into_response(),
        None => json_error(StatusCode::UNAUTHORIZED, "Not logged in"),
    }
}

/// Entries, newest first, filtered by `username`, `limit` and `offset`.
pub async fn list_entries(
    Extension(auth): Extension<SharedAuth>,
    Query(query): Query<EntryQuery>,
) -> Result<Json<Vec<Entry>>, Response> {
    let entries = auth
        .authority
        .store()
        .find_entries(&query)
        .await
        .map_err(database_error)?;
    Ok(Json(entries))
}

/// One entry by id.
pub async fn get_entry(
    Extension(auth): Extension<SharedAuth>,
    Query(EntryId { entryid }): Query<EntryId>,
) -> Response {
    match auth.authority.store().find_entry(entryid).await {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Entry not found"),
        Err(e) => database_error(e),
    }
}

/// Creates an entry owned by the caller.
pub async fn create_entry(
    Extension(auth): Extension<SharedAuth>,
    current_user: Option<Extension<CurrentUser>>,
    Json(entry): Json<NewEntry>,
) -> Response {
    let user = match current_user {
        Some(Extension(user)) => user,
        None => return json_error(StatusCode::UNAUTHORIZED, "Must be logged in"),
    };
    if entry.title.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Please enter a title");
    }
    match auth.authority.store().create_entry(&entry, user.user_id).await {
        Ok(entry_id) => {
            tracing::debug!("'{}' created entry {}", user.username, entry_id);
            (StatusCode::CREATED, Json(json!({ "entryid": entry_id }))).into_response()
        }
        Err(e) => database_error(e),
    }
}

/// Files, newest first, filtered by `username`, `filename` (substring),
/// `limit` and `offset`.
pub async fn list_files(
    Extension(auth): Extension<SharedAuth>,
    Query(query): Query<FileQuery>,
) -> Result<Json<Vec<FileListing>>, Response> {
    let files = auth
        .authority
        .store()
        .find_files(&query)
        .await
        .map_err(database_error)?;
    Ok(Json(files.into_iter().map(FileListing::from).collect()))
}

/// Stores the request body as a file owned by the caller. The name comes from
/// `?filename=` and gets a ` (n)` suffix when already taken.
pub async fn upload_file(
    Extension(auth): Extension<SharedAuth>,
    current_user: Option<Extension<CurrentUser>>,
    Query(FileName { filename }): Query<FileName>,
    bytes: Bytes,
) -> Response {
    let user = match current_user {
        Some(Extension(user)) => user,
        None => return json_error(StatusCode::UNAUTHORIZED, "Must be logged in"),
    };
    let filename = filename.trim();
    if filename.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Please enter a filename");
    }
    match auth
        .authority
        .store()
        .create_file(filename, &bytes, user.user_id)
        .await
    {
        Ok((file_id, stored_name)) => {
            tracing::debug!(
                "'{}' uploaded '{}' ({} bytes)",
                user.username,
                stored_name,
                bytes.len()
            );
            let url = file_url(&stored_name);
            let body = json!({ "fileid": file_id, "filename": stored_name, "url": url });
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => database_error(e),
    }
}

/// Serves the bytes of an uploaded file.
pub async fn serve_file(
    Extension(auth): Extension<SharedAuth>,
    Query(FileName { filename }): Query<FileName>,
) -> Response {
    match auth.authority.store().find_file_bytes(&filename).await {
        Ok(Some(bytes)) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "File not found").into_response(),
        Err(e) => database_error(e),
    }
}
