use reqwest::multipart::Form;

use crate::error::DispatchError;
use crate::fetch::ProxyFetch;
use crate::model::RumorDetection;

use super::{read_detection, require_media, MediaFile};

const DETECT_PATH: &str = "/rumor/detect";

/// Text plus image rumor check. Both parts are mandatory.
#[derive(Debug, Clone)]
pub struct RumorRequest {
    text: String,
    image: MediaFile,
}

impl RumorRequest {
    pub fn new(text: impl Into<String>, image: MediaFile) -> Result<Self, DispatchError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "rumor detection needs non-empty text".to_owned(),
            ));
        }
        require_media(&image, "image")?;
        Ok(Self { text, image })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    // The backend reads the text from a field named `content`.
    fn into_form(self) -> Result<Form, DispatchError> {
        Ok(Form::new()
            .text("content", self.text)
            .part("image", self.image.into_part()?))
    }
}

/// Image-text rumor detection through the `/rumor` proxy.
#[derive(Debug, Clone)]
pub struct RumorDispatcher {
    fetch: ProxyFetch,
}

impl RumorDispatcher {
    pub fn new(fetch: ProxyFetch) -> Self {
        Self { fetch }
    }

    pub async fn analyze(&self, request: RumorRequest) -> Result<RumorDetection, DispatchError> {
        tracing::info!(
            chars = request.text().chars().count(),
            image = request.image.file_name(),
            "submitting text and image for rumor detection"
        );
        let response = self.fetch.post_form(DETECT_PATH, request.into_form()?).await?;
        read_detection(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DETECTION_FAILED;
    use crate::model::RumorVerdict;
    use crate::session::ClientConfig;
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use serde_json::json;

    fn dispatcher(server: &MockServer) -> RumorDispatcher {
        RumorDispatcher::new(ProxyFetch::new(&ClientConfig::new(server.base_url())).unwrap())
    }

    fn image() -> MediaFile {
        MediaFile::new("post.jpg", b"jpeg-bytes".to_vec())
    }

    #[test]
    fn both_fields_are_required() {
        assert_matches!(
            RumorRequest::new("   ", image()),
            Err(DispatchError::InvalidRequest(_))
        );
        assert_matches!(
            RumorRequest::new("Breaking: the dam has collapsed", MediaFile::new("post.jpg", Vec::new())),
            Err(DispatchError::InvalidRequest(_))
        );
        let request = RumorRequest::new("Breaking: the dam has collapsed", image()).unwrap();
        assert_eq!(request.text(), "Breaking: the dam has collapsed");
    }

    #[tokio::test]
    async fn sends_content_and_image_fields() {
        let server = MockServer::start_async().await;
        let body = json!({
            "success": true,
            "is_rumor": true,
            "confidence": 0.74,
            "result": {
                "is_rumor": true,
                "confidence": 0.74,
                "probability": 0.74,
                "reasoning": ["image predates the event"],
                "keywords": [],
                "sources_checked": ["model database"],
                "risk_level": "high"
            },
            "message": "detection complete"
        });
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rumor/detect")
                    .body_contains("name=\"content\"")
                    .body_contains("Breaking: the dam has collapsed")
                    .body_contains("name=\"image\"");
                then.status(200).json_body(body.clone());
            })
            .await;

        let request = RumorRequest::new("Breaking: the dam has collapsed", image()).unwrap();
        let response = dispatcher(&server).analyze(request).await.unwrap();
        mock.assert_async().await;

        assert_eq!(response.success(), Some(true));
        assert_eq!(serde_json::to_value(&response).unwrap(), body);
        let verdict: RumorVerdict = serde_json::from_value(body["result"].clone()).unwrap();
        assert!(verdict.is_rumor);
        assert_eq!(verdict.reasons, vec!["image predates the event".to_owned()]);
    }

    #[tokio::test]
    async fn typed_detection_body_is_validated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rumor/detect");
                then.status(200).json_body(json!({
                    "success": true,
                    "detection_id": "r-1",
                    "detection_type": "rumor",
                    "status": "completed",
                    "confidence": 0.74,
                    "result": { "is_rumor": false, "probability": 0.26, "reasons": [] }
                }));
            })
            .await;

        let request = RumorRequest::new("Breaking: the dam has collapsed", image()).unwrap();
        let response = dispatcher(&server).analyze(request).await.unwrap();
        let detection = response.detection().expect("typed view");
        assert_eq!(detection.detection_id, "r-1");
        assert!(!detection.result.as_ref().expect("completed carries result").is_rumor);
    }

    #[tokio::test]
    async fn in_band_failure_is_passed_through() {
        let server = MockServer::start_async().await;
        let body = json!({
            "success": false,
            "is_rumor": false,
            "confidence": 0.0,
            "result": null,
            "message": "detection failed: model not loaded"
        });
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rumor/detect");
                then.status(200).json_body(body.clone());
            })
            .await;

        let request = RumorRequest::new("some claim to check", image()).unwrap();
        let response = dispatcher(&server).analyze(request).await.unwrap();
        assert_eq!(
            response.reported_failure(),
            Some("detection failed: model not loaded")
        );
        assert_eq!(serde_json::to_value(&response).unwrap(), body);
    }

    #[tokio::test]
    async fn never_sends_a_text_field() {
        let server = MockServer::start_async().await;
        let wrong = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rumor/detect")
                    .body_contains("name=\"text\"");
                then.status(500);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rumor/detect");
                then.status(200).json_body(json!({
                    "detection_id": "r-2",
                    "status": "pending"
                }));
            })
            .await;

        let request = RumorRequest::new("some claim to check", image()).unwrap();
        dispatcher(&server).analyze(request).await.unwrap();
        assert_eq!(wrong.hits_async().await, 0);
    }

    #[tokio::test]
    async fn validation_failure_from_backend() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rumor/detect");
                then.status(400).json_body(json!({
                    "success": false,
                    "message": "text too short",
                    "error": "parameter validation failed"
                }));
            })
            .await;

        let request = RumorRequest::new("hi", image()).unwrap();
        let err = dispatcher(&server).analyze(request).await.unwrap_err();
        assert_eq!(err.to_string(), "parameter validation failed");
    }

    #[tokio::test]
    async fn empty_error_body_uses_fallback() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rumor/detect");
                then.status(500);
            })
            .await;

        let request = RumorRequest::new("some claim to check", image()).unwrap();
        let err = dispatcher(&server).analyze(request).await.unwrap_err();
        assert_eq!(err.to_string(), DETECTION_FAILED);
    }
}
