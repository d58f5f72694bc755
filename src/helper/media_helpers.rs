use crate::helper::admin_helpers::Settings;
use crate::models::UploadedImage;
use actix_multipart::Multipart;
use actix_web::web;
use chrono::Utc;
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Image uploads are disabled. No MIME types are configured.")]
    Disabled,
    #[error("Content-Type not available.")]
    MissingContentType,
    #[error("Unsupported file type: '{0}'.")]
    UnsupportedType(String),
    #[error("'{0}' is allowed in settings but is not an image type this server stores.")]
    NoSafeExtension(String),
    #[error("File is too large. Maximum size is {0}MB.")]
    TooLarge(u64),
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sidecar error: {0}")]
    Sidecar(#[from] serde_json::Error),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

/// A batch stops at its first failing file. Files stored before it stay.
#[derive(Error, Debug)]
#[error("Upload of '{filename}' (file {}) failed: {source}. {} earlier file(s) were stored.", .failed_index + 1, .uploaded.len())]
pub struct BatchUploadError {
    pub failed_index: usize,
    pub filename: String,
    pub uploaded: Vec<UploadedImage>,
    #[source]
    pub source: UploadError,
}

/// Maps a validated MIME type to the extension used on disk. Only image
/// types are accepted whatever the allow-list says.
fn image_extension(mime_type: &str) -> Option<&'static str> {
    let map: BTreeMap<&str, &str> = [
        ("image/gif", "gif"),
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
        ("image/webp", "webp"),
    ]
    .iter()
    .cloned()
    .collect();

    map.get(mime_type).cloned()
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub allowed_mime_types: HashSet<String>,
    pub max_bytes: u64,
}

impl UploadPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        UploadPolicy {
            allowed_mime_types: settings.allowed_mime_types().into_iter().collect(),
            max_bytes: settings.max_file_upload_bytes(),
        }
    }

    fn max_mb(&self) -> u64 {
        self.max_bytes / (1024 * 1024)
    }

    /// Checks the declared type and returns the extension to store it under.
    pub fn check_type(&self, content_type: &str) -> Result<&'static str, UploadError> {
        if self.allowed_mime_types.is_empty() {
            return Err(UploadError::Disabled);
        }
        if !self.allowed_mime_types.contains(content_type) {
            return Err(UploadError::UnsupportedType(content_type.to_string()));
        }
        image_extension(content_type).ok_or_else(|| {
            log::error!("Allowed MIME type '{}' has no safe image extension mapping.", content_type);
            UploadError::NoSafeExtension(content_type.to_string())
        })
    }
}

fn shard_dir(media_root: &Path, id: &str) -> PathBuf {
    media_root.join("images").join(&id[0..2]).join(&id[2..4])
}

/// Writes one image and its JSON sidecar under the sharded images tree and
/// returns its public record.
pub fn store_image(
    media_root: &Path,
    policy: &UploadPolicy,
    content_type: &str,
    original_filename: &str,
    bytes: &[u8],
) -> Result<UploadedImage, UploadError> {
    let ext = policy.check_type(content_type)?;
    if bytes.len() as u64 > policy.max_bytes {
        return Err(UploadError::TooLarge(policy.max_mb()));
    }

    let id = Uuid::new_v4().to_string();
    let dir = shard_dir(media_root, &id);
    fs::create_dir_all(&dir)?;

    let file_path = dir.join(format!("{}.{}", id, ext));
    fs::write(&file_path, bytes)?;

    let image = UploadedImage {
        url: format!("/media/images/{}/{}/{}.{}", &id[0..2], &id[2..4], id, ext),
        id,
        file_format: ext.to_string(),
        original_filename: original_filename.to_string(),
        file_size: bytes.len() as i64,
        uploaded_at: Utc::now(),
    };
    let sidecar = serde_json::to_string_pretty(&image)?;
    if let Err(e) = fs::write(file_path.with_extension("json"), sidecar) {
        let _ = fs::remove_file(&file_path);
        return Err(e.into());
    }
    log::info!("Stored image {} ({} bytes)", image.url, image.file_size);
    Ok(image)
}

/// Reads one multipart file field, enforcing the type before and the size
/// limit while reading.
async fn read_file_field(
    field: &mut actix_multipart::Field,
    policy: &UploadPolicy,
) -> Result<(String, Vec<u8>), UploadError> {
    let content_type = field
        .content_type()
        .map(|mime| mime.essence_str().to_string())
        .ok_or(UploadError::MissingContentType)?;
    policy.check_type(&content_type)?;

    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
        if (data.len() + chunk.len()) as u64 > policy.max_bytes {
            return Err(UploadError::TooLarge(policy.max_mb()));
        }
        data.extend_from_slice(&chunk);
    }
    Ok((content_type, data))
}

/// Stores every `file` field of the payload in order. The first failure
/// aborts the rest of the batch and reports what was already stored.
pub async fn upload_image_batch(
    media_root: PathBuf,
    policy: UploadPolicy,
    mut payload: Multipart,
) -> Result<Vec<UploadedImage>, BatchUploadError> {
    let mut uploaded: Vec<UploadedImage> = Vec::new();
    let mut index = 0;

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) => {
                return Err(BatchUploadError {
                    failed_index: index,
                    filename: String::new(),
                    uploaded,
                    source: UploadError::Multipart(e.to_string()),
                })
            }
        };
        let field_name = field.content_disposition().get_name().unwrap_or_default().to_string();
        if field_name != "file" && field_name != "files" {
            continue;
        }
        let filename = field
            .content_disposition()
            .get_filename()
            .unwrap_or("upload")
            .to_string();

        let stored = match read_file_field(&mut field, &policy).await {
            Ok((content_type, data)) => {
                let root = media_root.clone();
                let policy = policy.clone();
                let name = filename.clone();
                web::block(move || store_image(&root, &policy, &content_type, &name, &data))
                    .await
                    .map_err(UploadError::from)
                    .and_then(|result| result)
            }
            Err(e) => Err(e),
        };

        match stored {
            Ok(image) => uploaded.push(image),
            Err(source) => {
                log::warn!("Image batch aborted at file {} ('{}'): {}", index, filename, source);
                return Err(BatchUploadError { failed_index: index, filename, uploaded, source });
            }
        }
        index += 1;
    }
    Ok(uploaded)
}
