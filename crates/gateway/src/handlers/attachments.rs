//! Attachment upload handlers
//!
//! Size and MIME type are checked here, before any bytes reach storage.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::storage::sanitize_file_name;
use crate::AppState;
use achievo_common::{
    config::UploadConfig,
    errors::{AppError, Result},
    lifecycle::{AchievementContent, Attachment},
    metrics::record_attachment,
    store::FileMetadata,
    Actor,
};

/// Multipart field carrying the file
const FILE_FIELD: &str = "file";

struct Upload {
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError, config: &UploadConfig) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            size: config.max_file_size_bytes + 1,
            limit: config.max_file_size_bytes,
        }
    } else {
        AppError::InvalidFormat {
            message: err.body_text(),
        }
    }
}

async fn read_upload(multipart: &mut Multipart, config: &UploadConfig) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, config))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = sanitize_file_name(field.file_name().unwrap_or_default());
        let mime_type = field
            .content_type()
            .map(|m| m.to_ascii_lowercase())
            .unwrap_or_default();

        if !config.accepts_mime(&mime_type) {
            return Err(AppError::UnsupportedMediaType { mime: mime_type });
        }

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, config))?;
        if bytes.len() > config.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge {
                size: bytes.len(),
                limit: config.max_file_size_bytes,
            });
        }

        return Ok(Upload {
            file_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::MissingField {
        field: FILE_FIELD.to_string(),
    })
}

/// Store an uploaded file and attach it to a draft achievement
pub async fn upload(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AchievementContent>)> {
    // Refuse early so nothing is written for a locked achievement
    state.engine.check_mutable(&actor, id).await?;

    let upload = read_upload(&mut multipart, &state.config.uploads).await?;
    let metadata = FileMetadata {
        file_name: upload.file_name.clone(),
        mime_type: upload.mime_type.clone(),
    };
    let file_url = state.files.store(&upload.bytes, &metadata).await?;

    let content = state
        .engine
        .add_attachment(
            &actor,
            id,
            Attachment {
                file_name: upload.file_name,
                file_url,
                file_type: upload.mime_type.clone(),
                uploaded_at: Utc::now(),
            },
        )
        .await?;

    record_attachment(upload.bytes.len(), &upload.mime_type);
    Ok((StatusCode::CREATED, Json(content)))
}

pub async fn remove(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, file_name)): Path<(Uuid, String)>,
) -> Result<Json<AchievementContent>> {
    let content = state
        .engine
        .remove_attachment(&actor, id, &file_name)
        .await?;
    Ok(Json(content))
}
