//! Media download and multipart upload helpers.

use axum::{
    body::Bytes,
    extract::{multipart::Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::errors::AppError;
use crate::storage::{renders_inline, MediaStore, StoredObject};
use crate::AppState;

const MAX_FILES_PER_REQUEST: usize = 10;

/// A file part read from a multipart body.
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Text and file parts of a multipart body, in arrival order.
#[derive(Default)]
pub struct MultipartForm {
    pub texts: Vec<(String, String)>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub async fn read(multipart: &mut Multipart) -> Result<Self, AppError> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    if form.files.len() == MAX_FILES_PER_REQUEST {
                        return Err(AppError::Validation(format!(
                            "At most {} files may be uploaded at once",
                            MAX_FILES_PER_REQUEST
                        )));
                    }
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", file_name, e)))?;
                    form.files.push(UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
                    form.texts.push((name, text));
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == name)
    }
}

/// Store every file or none: on the first failure, already-stored objects are removed.
pub async fn store_all<'a>(
    media: &MediaStore,
    bucket: &str,
    files: impl IntoIterator<Item = &'a UploadedFile>,
) -> Result<Vec<StoredObject>, AppError> {
    let mut stored = Vec::new();

    for file in files {
        match media
            .store(bucket, &file.file_name, file.content_type.as_deref(), &file.bytes)
            .await
        {
            Ok(object) => stored.push(object),
            Err(e) => {
                remove_all(media, &stored).await;
                return Err(e);
            }
        }
    }

    Ok(stored)
}

/// Best-effort cleanup of stored objects.
pub async fn remove_all(media: &MediaStore, objects: &[StoredObject]) {
    for object in objects {
        if let Err(e) = media.remove(&object.bucket, &object.key).await {
            tracing::warn!("Failed to remove {}/{}: {}", object.bucket, object.key, e);
        }
    }
}

/// GET /media/:bucket/:key - Serve a stored object.
pub async fn download_media(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (bytes, content_type) = state.media.read(&bucket, &key).await?;
    let disposition = if renders_inline(&content_type) {
        "inline".to_string()
    } else {
        format!("attachment; filename=\"{}\"", key)
    };
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
