use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client, ClientBuilder, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{error_field, DispatchError};
use crate::util::csrf_token_from_html;

pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_VIDEO_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const API_BASE_PATH: &str = "api/v1/";
const CSRF_HEADER: &str = "X-CSRFToken";

/// Connection settings shared by the transport client and the fetch adapter.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin the page is served from; `/api/v1` and the proxy prefixes hang off it.
    pub origin: String,
    pub timeout: Duration,
    /// Applied per request to video uploads.
    pub video_timeout: Duration,
    pub probe_timeout: Duration,
    pub csrf_token: Option<String>,
}

impl ClientConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            timeout: DEFAULT_TIMEOUT,
            video_timeout: DEFAULT_VIDEO_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            csrf_token: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

/// Body attached to a transport client request.
#[derive(Debug)]
pub enum RequestBody {
    Json(Value),
    Multipart(Form),
}

impl RequestBody {
    fn describe(&self) -> String {
        match self {
            RequestBody::Json(value) => value.to_string(),
            RequestBody::Multipart(_) => "<multipart/form-data>".to_owned(),
        }
    }
}

/// Same-origin JSON client for the `/api/v1` surface.
///
/// Every request is logged before it is sent and after the response arrives, carries the
/// CSRF token when one is known, and turns any non-2xx answer into [`DispatchError::Http`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    origin: Url,
    base: Url,
    csrf_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, DispatchError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = ClientBuilder::new()
            .cookie_store(true)
            .default_headers(default_headers)
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        let origin = parse_origin(&config.origin)?;
        let base = origin.join(API_BASE_PATH)?;

        Ok(Self {
            client,
            origin,
            base,
            csrf_token: config.csrf_token.clone(),
        })
    }

    /// Looks for a `csrf-token` meta tag on the origin's index page and adopts it.
    /// A missing tag or an unreachable page keeps whatever token was configured.
    pub async fn discover_csrf_token(&mut self) -> Option<&str> {
        match self.fetch_index_page().await {
            Ok(html) => match csrf_token_from_html(&html) {
                Some(token) => {
                    tracing::debug!("adopted csrf token from page metadata");
                    self.csrf_token = Some(token);
                }
                None => tracing::debug!("page carries no csrf-token meta tag"),
            },
            Err(err) => tracing::debug!("could not read page metadata: {err}"),
        }
        self.csrf_token.as_deref()
    }

    async fn fetch_index_page(&self) -> Result<String, DispatchError> {
        let response = self
            .client
            .get(self.origin.clone())
            .header(ACCEPT, "text/html")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Resolves an API path such as `/modules/status/` against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, DispatchError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    /// Sends one request and returns the decoded JSON payload.
    ///
    /// `timeout` overrides the client-wide timeout for this call only.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        timeout: Option<Duration>,
    ) -> Result<Value, DispatchError> {
        let url = self.endpoint(path)?;
        let payload = body.as_ref().map(RequestBody::describe);
        tracing::debug!(%method, %url, payload = ?payload, "api request");

        let mut builder = self.client.request(method.clone(), url.clone());
        if let Some(token) = &self.csrf_token {
            builder = builder.header(CSRF_HEADER, token);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder = match body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Multipart(form)) => builder.multipart(form),
            None => builder,
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(%method, %url, "api transport error: {err}");
                return Err(err.into());
            }
        };

        let status = response.status();
        let bytes = response.bytes().await?;
        let data = parse_payload(&bytes);

        if status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), payload = ?data, "api response");
            return Ok(data.unwrap_or(Value::Null));
        }

        tracing::error!(%url, status = status.as_u16(), payload = ?data, "api error response");
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(%url, "authentication required, sign in again");
        }

        let message = error_field(data.as_ref())
            .or_else(|| message_field(data.as_ref()))
            .unwrap_or_else(|| format!("request failed with status code {}", status.as_u16()));

        Err(DispatchError::Http {
            status,
            message,
            body: data,
        })
    }

    /// Plain JSON GET decoded into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DispatchError> {
        let value = self.request(Method::GET, path, None, None).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Parses an origin URL and makes sure relative joins keep its path.
pub fn parse_origin(origin: &str) -> Result<Url, DispatchError> {
    let mut url = Url::parse(origin)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// JSON when the body parses as JSON, the raw text otherwise, nothing for an empty body.
fn parse_payload(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes)
        .ok()
        .or_else(|| Some(Value::String(String::from_utf8_lossy(bytes).into_owned())))
}

fn message_field(body: Option<&Value>) -> Option<String> {
    body.and_then(|value| value.get("message"))
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&ClientConfig::new(server.base_url())).expect("client builds")
    }

    #[test]
    fn endpoint_joins_under_api_base() {
        let client = ApiClient::new(&ClientConfig::new("http://example.test")).unwrap();
        assert_eq!(
            client.endpoint("/modules/status/").unwrap().as_str(),
            "http://example.test/api/v1/modules/status/"
        );

        let nested = ApiClient::new(&ClientConfig::new("http://example.test/app")).unwrap();
        assert_eq!(
            nested.endpoint("result/abc/").unwrap().as_str(),
            "http://example.test/app/api/v1/result/abc/"
        );
    }

    #[test]
    fn payload_parsing_variants() {
        assert_eq!(parse_payload(b""), None);
        assert_eq!(parse_payload(br#"{"a":1}"#), Some(json!({ "a": 1 })));
        assert_eq!(parse_payload(b"oops"), Some(json!("oops")));
    }

    #[tokio::test]
    async fn attaches_csrf_token_when_configured() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/modules/status/")
                    .header("X-CSRFToken", "tok-1");
                then.status(200).json_body(json!({ "success": true, "data": [] }));
            })
            .await;

        let mut config = ClientConfig::new(server.base_url());
        config.csrf_token = Some("tok-1".into());
        let client = ApiClient::new(&config).unwrap();

        let value = client
            .request(reqwest::Method::GET, "/modules/status/", None, None)
            .await
            .unwrap();
        assert_eq!(value["success"], json!(true));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sends_json_bodies_as_json() {
        let server = MockServer::start_async().await;
        let body = json!({ "detection_ids": ["abc123", "r-1"], "include_result": true });
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/result/batch/")
                    .header("content-type", "application/json")
                    .json_body(body.clone());
                then.status(201).json_body(json!({ "success": true, "data": [] }));
            })
            .await;

        let value = client_for(&server)
            .request(
                reqwest::Method::POST,
                "/result/batch/",
                Some(RequestBody::Json(body.clone())),
                None,
            )
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(value, json!({ "success": true, "data": [] }));
    }

    #[tokio::test]
    async fn unauthorized_is_propagated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/result/x/");
                then.status(401).json_body(json!({ "error": "login required" }));
            })
            .await;

        let err = client_for(&server)
            .request(reqwest::Method::GET, "/result/x/", None, None)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            DispatchError::Http { status, ref message, .. }
                if status == StatusCode::UNAUTHORIZED && message == "login required"
        );
    }

    #[tokio::test]
    async fn non_json_error_keeps_raw_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/result/x/");
                then.status(500).body("oops");
            })
            .await;

        let err = client_for(&server)
            .request(reqwest::Method::GET, "/result/x/", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request failed with status code 500");
        assert_matches!(err, DispatchError::Http { body: Some(Value::String(ref raw)), .. } if raw == "oops");
    }

    #[tokio::test]
    async fn unreachable_origin_is_transport_failure() {
        let client = ApiClient::new(&ClientConfig::new("http://127.0.0.1:1")).unwrap();
        let err = client
            .request(reqwest::Method::GET, "/modules/status/", None, None)
            .await
            .unwrap_err();
        assert_matches!(err, DispatchError::Transport(_));
    }

    #[tokio::test]
    async fn discovers_csrf_token_from_index_page() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200)
                    .header("content-type", "text/html")
                    .body(r#"<html><head><meta name="csrf-token" content="page-tok"></head></html>"#);
            })
            .await;

        let mut client = client_for(&server);
        assert_eq!(client.discover_csrf_token().await, Some("page-tok"));
        assert_eq!(client.csrf_token.as_deref(), Some("page-tok"));
    }

    #[tokio::test]
    async fn discovery_failure_keeps_configured_token() {
        let mut config = ClientConfig::new("http://127.0.0.1:1");
        config.csrf_token = Some("cli-tok".into());
        let mut client = ApiClient::new(&config).unwrap();
        assert_eq!(client.discover_csrf_token().await, Some("cli-tok"));
    }
}
