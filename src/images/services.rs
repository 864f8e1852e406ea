use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// An image received as a base64 data URI, decoded and ready to upload.
#[derive(Debug)]
pub struct DecodedImage {
    pub body: Bytes,
    pub content_type: String,
}

/// Parse `data:<mime>;base64,<payload>`.
pub fn decode_data_uri(uri: &str) -> Result<DecodedImage, AppError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| AppError::Validation("image: expected a base64 data URI".into()))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| AppError::Validation("image: expected a base64 data URI".into()))?;

    let mime = mime.to_ascii_lowercase();
    if ext_from_mime(&mime).is_none() {
        return Err(AppError::Validation(format!(
            "image: unsupported content type {mime}"
        )));
    }

    let body = STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::Validation("image: invalid base64".into()))?;
    if body.is_empty() {
        return Err(AppError::Validation("image: empty file".into()));
    }
    if body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::Validation("image: file too large".into()));
    }

    Ok(DecodedImage {
        body: Bytes::from(body),
        content_type: mime,
    })
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Upload a recipe image and return its object key.
pub async fn store_recipe_image(st: &AppState, image: DecodedImage) -> anyhow::Result<String> {
    let ext = ext_from_mime(&image.content_type).unwrap_or("bin");
    let key = format!("recipes/images/{}.{}", Uuid::new_v4(), ext);
    st.images
        .put(&key, image)
        .await
        .with_context(|| format!("store recipe image {key}"))?;
    Ok(key)
}

/// Presigned URL for a stored image. A presign failure degrades to `None`.
pub async fn image_url(st: &AppState, key: Option<&str>) -> Option<String> {
    let key = key?;
    match st.images.url(key).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, key, "presign failed");
            None
        }
    }
}

/// Best-effort delete of an image that is no longer referenced.
pub async fn discard_image(st: &AppState, key: Option<String>) {
    discard_images(st, key).await;
}

pub async fn discard_images(st: &AppState, keys: impl IntoIterator<Item = String>) {
    for key in keys {
        if let Err(e) = st.images.remove(&key).await {
            warn!(error = %e, key = %key, "failed to delete recipe image");
        }
    }
}
