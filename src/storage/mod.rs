//! Local object storage for report media and resolution evidence.
//!
//! Objects live at `<media_path>/<bucket>/<key>` and are served back under
//! `/media/<bucket>/<key>`.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::AppError;

pub const REPORT_MEDIA_BUCKET: &str = "report-media";
pub const EVIDENCE_BUCKET: &str = "evidence";

const BUCKETS: [&str; 2] = [REPORT_MEDIA_BUCKET, EVIDENCE_BUCKET];
const MAX_NAME_LEN: usize = 80;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub async fn open(root: &Path) -> Result<Self, AppError> {
        for bucket in BUCKETS {
            tokio::fs::create_dir_all(root.join(bucket)).await.map_err(|e| {
                AppError::Storage(format!("Failed to create bucket {}: {}", bucket, e))
            })?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Store an upload. The declared content type wins unless it is missing or generic.
    pub async fn store(
        &self,
        bucket: &str,
        file_name: &str,
        declared_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredObject, AppError> {
        check_bucket(bucket)?;

        if bytes.is_empty() {
            return Err(AppError::Validation(format!("File {} is empty", file_name)));
        }

        let content_type = resolve_content_type(file_name, declared_type);
        if !is_allowed_type(&content_type) {
            return Err(AppError::Validation(format!(
                "Unsupported media type {} for {}",
                content_type, file_name
            )));
        }

        let key = format!(
            "{}-{}",
            uuid::Uuid::new_v4(),
            object_name(file_name, &content_type)?
        );
        let path = self.root.join(bucket).join(&key);
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(bucket, key = %key, size = bytes.len(), "Stored media object");

        Ok(StoredObject {
            bucket: bucket.to_string(),
            url: format!("/media/{}/{}", bucket, key),
            key,
            content_type,
            size: bytes.len(),
        })
    }

    /// Read an object back with its content type. Keys carry an extension
    /// matching the type checked at upload; anything else is served as
    /// `application/octet-stream`.
    pub async fn read(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, String), AppError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let content_type = resolve_content_type(key, None);
                if is_allowed_type(&content_type) {
                    Ok((bytes, content_type))
                } else {
                    Ok((bytes, mime_guess::mime::APPLICATION_OCTET_STREAM.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Media {}/{} not found", bucket, key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an object. Missing objects are not an error.
    pub async fn remove(&self, bucket: &str, key: &str) -> Result<(), AppError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, AppError> {
        check_bucket(bucket)?;
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(AppError::BadRequest(format!("Invalid media key {}", key)));
        }
        Ok(self.root.join(bucket).join(key))
    }
}

fn check_bucket(bucket: &str) -> Result<(), AppError> {
    if BUCKETS.contains(&bucket) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Unknown bucket {}", bucket)))
    }
}

fn resolve_content_type(file_name: &str, declared: Option<&str>) -> String {
    let declared = declared.and_then(|t| t.split(';').next()).map(str::trim);
    match declared {
        Some(t) if !t.is_empty() && t != "application/octet-stream" => t.to_ascii_lowercase(),
        _ => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

fn is_allowed_type(content_type: &str) -> bool {
    (renders_inline(content_type) && content_type != "image/svg+xml")
        || content_type == "application/pdf"
}

/// Image, video and audio objects may be displayed in place; everything else
/// is served as a download.
pub fn renders_inline(content_type: &str) -> bool {
    content_type.starts_with("image/")
        || content_type.starts_with("video/")
        || content_type.starts_with("audio/")
}

/// Sanitised file name whose extension maps back to `content_type`.
fn object_name(file_name: &str, content_type: &str) -> Result<String, AppError> {
    let name = sanitize_file_name(file_name);
    if resolve_content_type(&name, None) == content_type {
        return Ok(name);
    }

    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name.as_str(),
    };
    mime_guess::get_mime_extensions_str(content_type)
        .unwrap_or_default()
        .iter()
        .map(|extension| format!("{}.{}", stem, extension))
        .find(|renamed| resolve_content_type(renamed, None) == content_type)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Unsupported media type {} for {}",
                content_type, file_name
            ))
        })
}

/// Reduce a client file name to `[A-Za-z0-9._-]`, keeping the extension.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "upload".to_string();
    }
    if cleaned.len() <= MAX_NAME_LEN {
        return cleaned.to_string();
    }
    cleaned[cleaned.len() - MAX_NAME_LEN..].to_string()
}
