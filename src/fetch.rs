use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Client, ClientBuilder, Response, Url};

use crate::error::DispatchError;
use crate::session::{parse_origin, ClientConfig};

/// Direct fetch against proxied services (`/ai-detect/...`, `/rumor/...`).
///
/// Unlike [`crate::session::ApiClient`] this carries no default content type, no CSRF
/// header and no request logging. A response with any status is handed back as-is; only
/// network failures are errors.
#[derive(Debug, Clone)]
pub struct ProxyFetch {
    client: Client,
    origin: Url,
}

impl ProxyFetch {
    pub fn new(config: &ClientConfig) -> Result<Self, DispatchError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            origin: parse_origin(&config.origin)?,
        })
    }

    pub fn url(&self, path: &str) -> Result<Url, DispatchError> {
        Ok(self.origin.join(path.trim_start_matches('/'))?)
    }

    pub async fn post_form(&self, path: &str, form: Form) -> Result<Response, DispatchError> {
        let url = self.url(path)?;
        Ok(self.client.post(url).multipart(form).send().await?)
    }

    pub async fn get(&self, path: &str, timeout: Option<Duration>) -> Result<Response, DispatchError> {
        let url = self.url(path)?;
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?)
    }
}
