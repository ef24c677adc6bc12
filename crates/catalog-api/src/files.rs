use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use catalog_db::queries::NewAttachment;
use catalog_storage::Storage;
use catalog_types::api::{
    FileDetail, FileDetailResponse, FileListResponse, MessageResponse, MultiUploadResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{AdminUser, CurrentUser, Path};
use crate::state::AppState;

/// 50 MB per file
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;
pub const MAX_FILES: usize = 40;

const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "video/mp4",
    "video/webm",
];

/// A file part read from the request, already checked.
struct Upload {
    filename: String,
    content_type: String,
    data: Bytes,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File too large".into())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

/// Reads every part named `field`, rejecting disallowed types and sizes.
async fn read_uploads(
    multipart: &mut Multipart,
    field: &str,
    max: usize,
) -> Result<Vec<Upload>, ApiError> {
    let mut uploads = Vec::new();
    while let Some(part) = multipart.next_field().await.map_err(multipart_error)? {
        if part.name() != Some(field) {
            continue;
        }
        if uploads.len() == max {
            return Err(ApiError::BadRequest(format!(
                "Too many files, at most {} allowed",
                max
            )));
        }

        let filename = part.file_name().unwrap_or("file").to_string();
        let content_type = part.content_type().unwrap_or_default().to_string();
        if !ALLOWED_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "File type not allowed: {}",
                filename
            )));
        }

        let data = part.bytes().await.map_err(multipart_error)?;
        if data.len() > MAX_FILE_SIZE {
            return Err(ApiError::PayloadTooLarge(format!("File too large: {}", filename)));
        }
        uploads.push(Upload {
            filename,
            content_type,
            data,
        });
    }
    Ok(uploads)
}

/// Writes the objects, then records them in one transaction. Objects
/// written before a failure are removed again.
async fn store_uploads(
    state: &AppState,
    owner: &str,
    uploads: Vec<Upload>,
) -> Result<Vec<catalog_types::models::Attachment>, ApiError> {
    let mut records = Vec::with_capacity(uploads.len());
    let mut written = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let key = Storage::new_key(&upload.filename);
        if let Err(e) = state
            .storage
            .put(&key, &upload.data, &upload.content_type)
            .await {
            state.delete_objects(&written).await;
            return Err(e.into());
        }
        records.push(NewAttachment {
            filename: upload.filename,
            filetype: upload.content_type,
            filesize: upload.data.len() as i64,
            url: state.storage.url_for(&key),
            object_key: key.clone(),
            user_id: Some(owner.to_string()),
        });
        written.push(key);
    }

    let inserted = state
        .db(move |db| Ok(db.insert_attachments(&records)?))
        .await;
    match inserted {
        Ok(attachments) => {
            info!("Stored {} uploaded file(s) for {}", attachments.len(), owner);
            Ok(attachments)
        }
        Err(e) => {
            error!("Recording uploads failed, removing stored objects");
            state.delete_objects(&written).await;
            Err(e)
        }
    }
}

pub async fn upload_file(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let uploads = read_uploads(&mut multipart, "file", 1).await?;
    if uploads.is_empty() {
        return Err(ApiError::BadRequest("No file provided".into()));
    }
    let mut attachments = store_uploads(&state, user.id(), uploads).await?;
    let attachment = attachments
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("upload produced no record")))?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn upload_files(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let uploads = read_uploads(&mut multipart, "files", MAX_FILES).await?;
    if uploads.is_empty() {
        return Err(ApiError::BadRequest("No files provided".into()));
    }
    let files = store_uploads(&state, user.id(), uploads).await?;
    Ok((
        StatusCode::CREATED,
        Json(MultiUploadResponse {
            message: "Files uploaded successfully".into(),
            files,
        }),
    ))
}

pub async fn list_files(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<FileListResponse>, ApiError> {
    let files = state.storage.list().await?;
    Ok(Json(FileListResponse { files }))
}

pub async fn get_file(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FileDetailResponse>, ApiError> {
    let (attachment, key) = state
        .db(move |db| Ok(db.get_attachment_with_key(&id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found("File"))?;
    let object = state.storage.head(&key).await?;
    Ok(Json(FileDetailResponse {
        file: FileDetail { attachment, object },
    }))
}

pub async fn delete_file(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = state
        .db(move |db| Ok(db.delete_attachment(&id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found("File"))?;
    state.delete_objects(&[key]).await;
    Ok(Json(MessageResponse::new("File deleted successfully")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use catalog_db::Database;

    use super::*;
    use crate::mail::Mailer;
    use crate::state::{AppStateInner, AuthConfig, WebhookSecrets};

    async fn state() -> AppState {
        let dir = std::env::temp_dir().join(format!("catalog_files_{}", Uuid::new_v4()));
        Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            storage: Arc::new(Storage::local(dir, "catalog", "http://x").await.unwrap()),
            auth: AuthConfig::new("files-test-secret"),
            webhooks: WebhookSecrets {
                single: "a".into(),
                subscription: "b".into(),
            },
            mailer: Mailer::log("no-reply@test.com").unwrap(),
            app_url: "http://x".into(),
        })
    }

    fn upload(name: &str) -> Upload {
        Upload {
            filename: name.into(),
            content_type: "image/png".into(),
            data: Bytes::from_static(b"png"),
        }
    }

    #[tokio::test]
    async fn failed_insert_removes_stored_objects() {
        let state = state().await;
        // No such user, so the owner foreign key fails the insert.
        let result = store_uploads(
            &state,
            &Uuid::new_v4().to_string(),
            vec![upload("a.png"), upload("b.png")],
        )
        .await;
        assert!(result.is_err());
        assert!(state.storage.list().await.unwrap().is_empty());
    }
}
