//! One dispatcher per detection kind. Each owns its request shape, its endpoint and the
//! normalization of the backend's answer.

mod image;
mod rumor;
mod system;
mod video;

use std::path::Path;

use reqwest::multipart::Part;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DispatchError, DETECTION_FAILED};
use crate::model::{DetectionResponse, ResultPayload};
use crate::util::guess_mime;

pub use image::{AiImageDispatcher, AiImageRequest};
pub use rumor::{RumorDispatcher, RumorRequest};
pub use system::SystemDispatcher;
pub use video::{VideoDispatcher, VideoModule, VideoRequest};

/// An uploaded media blob with the name and type it is sent under.
#[derive(Debug, Clone)]
pub struct MediaFile {
    file_name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl MediaFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name.into();
        let mime = guess_mime(&file_name).to_owned();
        Self {
            file_name,
            mime,
            bytes: bytes.into(),
        }
    }

    pub async fn read(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_owned());
        Ok(Self::new(file_name, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn into_part(self) -> Result<Part, DispatchError> {
        Ok(Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime)?)
    }
}

fn require_media(file: &MediaFile, field: &str) -> Result<(), DispatchError> {
    if file.is_empty() {
        return Err(DispatchError::InvalidRequest(format!(
            "{field} `{}` is empty",
            file.file_name()
        )));
    }
    Ok(())
}

/// Percent-encodes a detection id for use as one path segment.
fn path_segment(id: &str) -> Result<String, DispatchError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(DispatchError::InvalidRequest(
            "detection id must not be empty".to_owned(),
        ));
    }
    Ok(urlencoding::encode(id).into_owned())
}

/// Decodes a proxied detection response, applying the failure policy to non-2xx answers.
async fn read_detection<P>(response: Response) -> Result<DetectionResponse<P>, DispatchError>
where
    P: DeserializeOwned + ResultPayload,
{
    let status = response.status();
    let url = response.url().clone();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let body = serde_json::from_slice::<Value>(&bytes).ok();
        tracing::warn!(%url, status = status.as_u16(), "detection backend rejected the request");
        return Err(DispatchError::detection_failure(status, body, DETECTION_FAILED));
    }

    into_detection(serde_json::from_slice(&bytes)?)
}

fn into_detection<P>(body: Value) -> Result<DetectionResponse<P>, DispatchError>
where
    P: DeserializeOwned + ResultPayload,
{
    let response = DetectionResponse::from_value(body)?;
    if let Some(reason) = response.reported_failure() {
        tracing::warn!("backend answered success=false: {reason}");
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_file_guesses_type() {
        let file = MediaFile::new("frame.png", vec![1, 2, 3]);
        assert_eq!(file.mime(), "image/png");
        assert_eq!(file.len(), 3);
        assert_eq!(MediaFile::new("clip.MOV", vec![0]).mime(), "video/quicktime");
    }

    #[test]
    fn empty_media_is_rejected() {
        let file = MediaFile::new("empty.jpg", Vec::new());
        assert!(matches!(
            require_media(&file, "image"),
            Err(DispatchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn detection_ids_are_encoded() {
        assert_eq!(path_segment("abc123").unwrap(), "abc123");
        assert_eq!(path_segment("a/b").unwrap(), "a%2Fb");
        assert_eq!(path_segment("a b").unwrap(), "a%20b");
        assert_eq!(path_segment("x?y#z").unwrap(), "x%3Fy%23z");
        assert!(path_segment("  ").is_err());
    }

    #[tokio::test]
    async fn reads_media_from_disk() {
        let path = std::env::temp_dir().join(format!("detect-dispatch-{}.jpg", std::process::id()));
        tokio::fs::write(&path, b"jpeg-bytes").await.unwrap();
        let file = MediaFile::read(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(file.mime(), "image/jpeg");
        assert_eq!(file.len(), 10);
        assert!(file.file_name().ends_with(".jpg"));
    }
}
