//! Composite health of the detection backends.
//!
//! [`HealthAggregator::collect`] never fails: a probe that cannot be completed marks its
//! service unhealthy, and when no probe answers at all the whole document falls back to
//! the unreachable default.

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;

use crate::error::DispatchError;
use crate::fetch::ProxyFetch;
use crate::model::{AiDetectionServiceStatus, HealthState, ServiceInfo, ServiceKey, Services};

pub const MODEL_VERSION: &str = "SAFE-v2.1.0";
const HEALTHY: &str = "healthy";

/// Where a backend lives and, when probing is enabled, which proxied path answers for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
    pub probe: Option<String>,
}

impl ServiceEndpoint {
    fn new(name: &str, url: &str, probe: Option<&str>) -> Self {
        Self {
            name: name.to_owned(),
            url: url.to_owned(),
            probe: probe.map(str::to_owned),
        }
    }
}

/// Deployment table of the four backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTable {
    ai_image_detection: ServiceEndpoint,
    rumor_detection: ServiceEndpoint,
    video_analysis_module1: ServiceEndpoint,
    video_analysis_module2: ServiceEndpoint,
}

impl Default for ServiceTable {
    fn default() -> Self {
        Self {
            ai_image_detection: ServiceEndpoint::new(
                "AI Image Detection Service",
                "http://localhost:8002",
                Some("/ai-detect/health"),
            ),
            rumor_detection: ServiceEndpoint::new(
                "Image-Text Rumor Detection Service",
                "http://localhost:8010",
                None,
            ),
            video_analysis_module1: ServiceEndpoint::new(
                "Video Analysis Module 1",
                "http://localhost:8003",
                None,
            ),
            video_analysis_module2: ServiceEndpoint::new(
                "Video Analysis Module 2",
                "http://localhost:8004",
                None,
            ),
        }
    }
}

impl ServiceTable {
    pub fn endpoint(&self, key: ServiceKey) -> &ServiceEndpoint {
        match key {
            ServiceKey::AiImageDetection => &self.ai_image_detection,
            ServiceKey::RumorDetection => &self.rumor_detection,
            ServiceKey::VideoAnalysisModule1 => &self.video_analysis_module1,
            ServiceKey::VideoAnalysisModule2 => &self.video_analysis_module2,
        }
    }

    pub fn endpoint_mut(&mut self, key: ServiceKey) -> &mut ServiceEndpoint {
        match key {
            ServiceKey::AiImageDetection => &mut self.ai_image_detection,
            ServiceKey::RumorDetection => &mut self.rumor_detection,
            ServiceKey::VideoAnalysisModule1 => &mut self.video_analysis_module1,
            ServiceKey::VideoAnalysisModule2 => &mut self.video_analysis_module2,
        }
    }

    /// Enables (`Some(path)`) or disables (`None`) the live probe for one service.
    pub fn set_probe(&mut self, key: ServiceKey, path: Option<String>) {
        self.endpoint_mut(key).probe = path;
    }

    fn all_unhealthy(&self) -> Services {
        let info = |key: ServiceKey| {
            let endpoint = self.endpoint(key);
            ServiceInfo {
                name: endpoint.name.clone(),
                status: HealthState::Unhealthy,
                url: endpoint.url.clone(),
            }
        };
        Services {
            ai_image_detection: info(ServiceKey::AiImageDetection),
            rumor_detection: info(ServiceKey::RumorDetection),
            video_analysis_module1: info(ServiceKey::VideoAnalysisModule1),
            video_analysis_module2: info(ServiceKey::VideoAnalysisModule2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthAggregator {
    fetch: ProxyFetch,
    table: ServiceTable,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(fetch: ProxyFetch, table: ServiceTable, probe_timeout: Duration) -> Self {
        Self {
            fetch,
            table,
            probe_timeout,
        }
    }

    /// Probes every enabled service and folds the answers into one document.
    pub async fn collect(&self) -> AiDetectionServiceStatus {
        self.try_collect().await.unwrap_or_else(|err| {
            tracing::warn!("service health unavailable, reporting every service unhealthy: {err}");
            self.unreachable()
        })
    }

    /// Document reported when no backend could be reached.
    pub fn unreachable(&self) -> AiDetectionServiceStatus {
        AiDetectionServiceStatus {
            services: self.table.all_unhealthy(),
            completed_detections_24h: Some(0),
            success_rate: Some(0.0),
            model_version: Some(MODEL_VERSION.to_owned()),
        }
    }

    /// Fails only when no probe produced an answer.
    async fn try_collect(&self) -> Result<AiDetectionServiceStatus, DispatchError> {
        let table = &self.table;
        let probes = ServiceKey::ALL.into_iter().filter_map(move |key| {
            table
                .endpoint(key)
                .probe
                .as_deref()
                .map(move |path| async move { (key, self.probe(path).await) })
        });
        let outcomes = join_all(probes).await;

        let mut services = self.table.all_unhealthy();
        let mut answered = false;
        let mut last_error = None;

        for (key, outcome) in outcomes {
            match outcome {
                Ok(state) => {
                    tracing::debug!(service = %key, ?state, "health probe answered");
                    services.get_mut(key).status = state;
                    answered = true;
                }
                Err(err) => {
                    tracing::debug!(service = %key, "health probe failed: {err}");
                    last_error = Some(err);
                }
            }
        }

        if !answered {
            return Err(last_error.unwrap_or_else(|| {
                DispatchError::InvalidRequest("no service has a health probe enabled".to_owned())
            }));
        }

        Ok(AiDetectionServiceStatus {
            services,
            completed_detections_24h: Some(0),
            success_rate: Some(100.0),
            model_version: Some(MODEL_VERSION.to_owned()),
        })
    }

    async fn probe(&self, path: &str) -> Result<HealthState, DispatchError> {
        let response = self.fetch.get(path, Some(self.probe_timeout)).await?;
        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        Ok(health_state(&body))
    }
}

/// Reads a probe body: `status` at the top level or inside a `data` envelope must equal
/// `"healthy"`.
pub fn health_state(body: &Value) -> HealthState {
    let reported = body
        .get("status")
        .or_else(|| body.get("data").and_then(|data| data.get("status")))
        .and_then(Value::as_str);
    match reported {
        Some(HEALTHY) => HealthState::Healthy,
        _ => HealthState::Unhealthy,
    }
}
