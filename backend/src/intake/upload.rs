use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::web;
use futures::TryStreamExt;
use log::{debug, warn};
use std::path::PathBuf;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

pub const IMAGE_FIELD: &str = "image";
pub const USER_ID_FIELD: &str = "userId";
const MAX_USER_ID_BYTES: usize = 256;

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub upload_dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("No image file provided")]
    MissingImage,
    #[error("Only image files are allowed")]
    NotAnImage,
    #[error("Only one image can be analysed per request")]
    MultipleImages,
    #[error("Image exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },
    #[error("userId must be UTF-8 text of at most 256 bytes")]
    InvalidUserId,
    #[error("Malformed multipart body: {0}")]
    Multipart(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MultipartError> for IntakeError {
    fn from(err: MultipartError) -> Self {
        IntakeError::Multipart(err.to_string())
    }
}

/// An accepted image spooled to a temporary file. The file is removed when this
/// value is dropped, which covers success, error and cancelled requests alike.
#[derive(Debug)]
pub struct ImageUpload {
    path: TempPath,
    media_type: String,
    size: usize,
}

impl ImageUpload {
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Reads the image into memory; the temporary file is gone once this returns.
    pub async fn into_bytes(self) -> Result<Vec<u8>, IntakeError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(bytes)
    }
}

#[derive(Debug)]
pub struct DetectUpload {
    pub image: ImageUpload,
    pub user_id: Option<String>,
}

/// Pulls exactly one `image` field and an optional `userId` out of a multipart body.
pub async fn read_upload(
    mut payload: Multipart,
    config: &IntakeConfig,
) -> Result<DetectUpload, IntakeError> {
    let mut image: Option<ImageUpload> = None;
    let mut user_id = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            IMAGE_FIELD => {
                if image.is_some() {
                    return Err(IntakeError::MultipleImages);
                }
                image = Some(spool_image(&mut field, config).await?);
            }
            USER_ID_FIELD => user_id = read_user_id(&mut field).await?,
            _ => {
                debug!("Ignoring multipart field '{}'", name);
                while field.try_next().await?.is_some() {}
            }
        }
    }

    let image = image.ok_or(IntakeError::MissingImage)?;
    debug!(
        "Accepted {} upload of {} bytes (user: {:?})",
        image.media_type(),
        image.size(),
        user_id
    );
    Ok(DetectUpload { image, user_id })
}

async fn spool_image(field: &mut Field, config: &IntakeConfig) -> Result<ImageUpload, IntakeError> {
    let media_type = field
        .content_type()
        .map(|mime| mime.essence_str().to_ascii_lowercase());
    let media_type = match media_type {
        Some(media_type) if media_type.starts_with("image/") => media_type,
        other => {
            warn!("Rejected upload with content type {:?}", other);
            return Err(IntakeError::NotAnImage);
        }
    };

    let upload_dir = config.upload_dir.clone();
    let spooled = web::block(move || {
        tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(upload_dir)
    })
    .await
    .map_err(|e| IntakeError::Io(std::io::Error::other(e.to_string())))??;
    let (file, path) = spooled.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut size = 0usize;
    while let Some(chunk) = field.try_next().await? {
        size += chunk.len();
        if size > config.max_bytes {
            warn!("Rejected upload larger than {} bytes", config.max_bytes);
            return Err(IntakeError::TooLarge {
                limit: config.max_bytes,
            });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    if size == 0 {
        return Err(IntakeError::MissingImage);
    }
    Ok(ImageUpload {
        path,
        media_type,
        size,
    })
}

async fn read_user_id(field: &mut Field) -> Result<Option<String>, IntakeError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > MAX_USER_ID_BYTES {
            return Err(IntakeError::InvalidUserId);
        }
        bytes.extend_from_slice(&chunk);
    }
    let text = String::from_utf8(bytes).map_err(|_| IntakeError::InvalidUserId)?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}
