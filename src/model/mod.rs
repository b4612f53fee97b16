//! Data contracts shared by the dispatchers, the health aggregator and whatever renders
//! their output.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::DispatchError;

/// Lifecycle of a detection job as reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DetectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionStatus::Pending => "pending",
            DetectionStatus::Processing => "processing",
            DetectionStatus::Completed => "completed",
            DetectionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    AiImage,
    Rumor,
    VideoAnalysis,
}

impl DetectionKind {
    /// Maps a backend `detection_type` value onto a kind.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "ai_image" | "ai_image_detection" => Some(DetectionKind::AiImage),
            "rumor" | "rumor_detection" => Some(DetectionKind::Rumor),
            other if other.starts_with("video") => Some(DetectionKind::VideoAnalysis),
            _ => None,
        }
    }
}

/// Kind-specific payload carried in a detection's `result` field.
pub trait ResultPayload {
    fn check(&self) -> Result<(), String>;
}

/// Common envelope of every detection answer; `P` is the kind's result payload.
///
/// Fields the contract does not name are kept in `extra` so a backend document passes
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection<P> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(alias = "task_id")]
    pub detection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_type: Option<String>,
    pub status: DetectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default = "no_result", skip_serializing_if = "Option::is_none")]
    pub result: Option<P>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn no_result<P>() -> Option<P> {
    None
}

impl<P: ResultPayload> Detection<P> {
    /// Checks the result contract: completed carries a result, failed carries an error,
    /// confidences lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(confidence) = self.confidence {
            check_unit("confidence", confidence)?;
        }
        match self.status {
            DetectionStatus::Completed if self.result.is_none() => {
                return Err(format!(
                    "detection {} is completed but has no result",
                    self.detection_id
                ));
            }
            DetectionStatus::Failed if !has_text(self.error.as_deref()) => {
                return Err(format!(
                    "detection {} failed without an error message",
                    self.detection_id
                ));
            }
            _ => {}
        }
        match &self.result {
            Some(result) => result.check(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePrediction {
    Real,
    AiGenerated,
    Fake,
}

impl ImagePrediction {
    /// `fake` is the label the detection service itself emits.
    pub fn is_ai_generated(self) -> bool {
        !matches!(self, ImagePrediction::Real)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiImageVerdict {
    pub prediction: ImagePrediction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_text: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_info: Option<ImageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultPayload for AiImageVerdict {
    fn check(&self) -> Result<(), String> {
        check_unit("result.confidence", self.confidence)?;
        if let Some(probability) = self.ai_probability {
            check_unit("result.ai_probability", probability)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RumorVerdict {
    pub is_rumor: bool,
    pub probability: f64,
    #[serde(default, alias = "reasoning")]
    pub reasons: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultPayload for RumorVerdict {
    fn check(&self) -> Result<(), String> {
        check_unit("result.probability", self.probability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetrics {
    pub duration: String,
    pub quality_score: f64,
    #[serde(default)]
    pub content_tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub analysis_type: String,
    pub summary: String,
    pub metrics: VideoMetrics,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultPayload for VideoSummary {
    fn check(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("result.summary is empty".to_owned());
        }
        Ok(())
    }
}

/// A backend answer kept exactly as it arrived, plus the typed detection read from it.
///
/// The detection document is either the body itself or its `data` envelope. Bodies that do
/// not carry one (a status id and a lifecycle status) stay untyped and are still returned;
/// a typed detection that breaks the result contract is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResponse<P> {
    raw: Value,
    detection: Option<Detection<P>>,
}

impl<P: DeserializeOwned + ResultPayload> DetectionResponse<P> {
    pub fn from_value(raw: Value) -> Result<Self, DispatchError> {
        let detection = match detection_document(&raw) {
            Some(document) => match serde_json::from_value::<Detection<P>>(document.clone()) {
                Ok(detection) => {
                    detection.validate().map_err(DispatchError::Contract)?;
                    Some(detection)
                }
                Err(err) => {
                    tracing::debug!("keeping detection untyped: {err}");
                    None
                }
            },
            None => None,
        };
        Ok(Self { raw, detection })
    }
}

impl<P> DetectionResponse<P> {
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn detection(&self) -> Option<&Detection<P>> {
        self.detection.as_ref()
    }

    pub fn success(&self) -> Option<bool> {
        self.raw.get("success").and_then(Value::as_bool)
    }

    /// The reason a backend gave for a `success: false` answer sent with a 2xx status.
    pub fn reported_failure(&self) -> Option<&str> {
        if self.success() != Some(false) {
            return None;
        }
        let reason = ["error", "message"]
            .into_iter()
            .find_map(|field| self.raw.get(field).and_then(Value::as_str));
        Some(reason.unwrap_or("backend reported failure"))
    }
}

impl<P> Serialize for DetectionResponse<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de, P: DeserializeOwned + ResultPayload> Deserialize<'de> for DetectionResponse<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(raw).map_err(de::Error::custom)
    }
}

fn detection_document(raw: &Value) -> Option<&Value> {
    if carries_detection(raw) {
        return Some(raw);
    }
    raw.get("data").filter(|data| carries_detection(data))
}

fn carries_detection(value: &Value) -> bool {
    let id = value.get("detection_id").or_else(|| value.get("task_id"));
    id.is_some_and(Value::is_string) && value.get("status").is_some_and(Value::is_string)
}

pub type AiImageDetection = DetectionResponse<AiImageVerdict>;
pub type RumorDetection = DetectionResponse<RumorVerdict>;
pub type VideoAnalysis = DetectionResponse<VideoSummary>;

/// A detection of any kind, tagged by the kind that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detection", rename_all = "snake_case")]
pub enum DetectionResult {
    AiImage(AiImageDetection),
    Rumor(RumorDetection),
    VideoAnalysis(VideoAnalysis),
}

impl DetectionResult {
    pub fn kind(&self) -> DetectionKind {
        match self {
            DetectionResult::AiImage(_) => DetectionKind::AiImage,
            DetectionResult::Rumor(_) => DetectionKind::Rumor,
            DetectionResult::VideoAnalysis(_) => DetectionKind::VideoAnalysis,
        }
    }

    pub fn detection_id(&self) -> Option<&str> {
        match self {
            DetectionResult::AiImage(r) => r.detection().map(|d| d.detection_id.as_str()),
            DetectionResult::Rumor(r) => r.detection().map(|d| d.detection_id.as_str()),
            DetectionResult::VideoAnalysis(r) => r.detection().map(|d| d.detection_id.as_str()),
        }
    }

    pub fn status(&self) -> Option<DetectionStatus> {
        match self {
            DetectionResult::AiImage(r) => r.detection().map(|d| d.status),
            DetectionResult::Rumor(r) => r.detection().map(|d| d.status),
            DetectionResult::VideoAnalysis(r) => r.detection().map(|d| d.status),
        }
    }

    fn raw(&self) -> &Value {
        match self {
            DetectionResult::AiImage(r) => r.raw(),
            DetectionResult::Rumor(r) => r.raw(),
            DetectionResult::VideoAnalysis(r) => r.raw(),
        }
    }

    /// One-line human summary of the outcome.
    pub fn headline(&self) -> String {
        let outcome = match self {
            DetectionResult::AiImage(r) => {
                r.detection().and_then(|d| d.result.as_ref()).map(|verdict| {
                    image_outcome(verdict.prediction.is_ai_generated(), verdict.confidence)
                })
            }
            DetectionResult::Rumor(r) => r
                .detection()
                .and_then(|d| d.result.as_ref())
                .map(|verdict| rumor_outcome(verdict.is_rumor, verdict.probability)),
            DetectionResult::VideoAnalysis(r) => r
                .detection()
                .and_then(|d| d.result.as_ref())
                .map(|summary| summary.summary.clone()),
        };

        match (self.detection_id(), self.status()) {
            (Some(id), Some(status)) => match outcome {
                Some(outcome) => format!("{id} [{}]: {outcome}", status.as_str()),
                None => format!("{id} [{}]", status.as_str()),
            },
            _ => self.untyped_headline(),
        }
    }

    // Backends that answer without a detection document still carry a verdict at the top.
    fn untyped_headline(&self) -> String {
        let raw = self.raw();
        let confidence = raw.get("confidence").and_then(Value::as_f64);
        let verdict = match self {
            DetectionResult::AiImage(_) => raw
                .get("prediction")
                .and_then(|p| serde_json::from_value::<ImagePrediction>(p.clone()).ok())
                .zip(confidence)
                .map(|(prediction, confidence)| {
                    image_outcome(prediction.is_ai_generated(), confidence)
                }),
            DetectionResult::Rumor(_) => raw
                .get("is_rumor")
                .and_then(Value::as_bool)
                .zip(confidence)
                .map(|(is_rumor, confidence)| rumor_outcome(is_rumor, confidence)),
            DetectionResult::VideoAnalysis(_) => None,
        };
        let message = raw.get("message").and_then(Value::as_str);
        match (verdict, message) {
            (Some(verdict), _) => verdict,
            (None, Some(message)) => message.to_owned(),
            (None, None) => "response received".to_owned(),
        }
    }
}

fn image_outcome(ai_generated: bool, confidence: f64) -> String {
    let label = if ai_generated { "AI-generated image" } else { "real image" };
    format!("{label} (confidence {confidence:.2})")
}

fn rumor_outcome(is_rumor: bool, probability: f64) -> String {
    let verdict = if is_rumor { "rumor" } else { "not a rumor" };
    format!("{verdict} (probability {probability:.2})")
}

/// Generic stored detection returned by `/result/{id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub detection_id: String,
    pub detection_type: String,
    pub status: DetectionStatus,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DetectionRecord {
    /// Reinterprets the record as the kind named by its `detection_type`.
    pub fn into_typed(self) -> Result<DetectionResult, DispatchError> {
        let kind = DetectionKind::from_type_name(&self.detection_type).ok_or_else(|| {
            DispatchError::Contract(format!(
                "unknown detection type `{}`",
                self.detection_type
            ))
        })?;
        let value = serde_json::to_value(&self)?;
        let typed = match kind {
            DetectionKind::AiImage => DetectionResult::AiImage(DetectionResponse::from_value(value)?),
            DetectionKind::Rumor => DetectionResult::Rumor(DetectionResponse::from_value(value)?),
            DetectionKind::VideoAnalysis => {
                DetectionResult::VideoAnalysis(DetectionResponse::from_value(value)?)
            }
        };
        Ok(typed)
    }
}

/// Stored AI-image detection as returned by `/ai-image/result/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiImageDetectionRecord {
    pub id: String,
    pub status: DetectionStatus,
    #[serde(default)]
    pub prediction: Option<ImagePrediction>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub confidence_percentage: Option<f64>,
    #[serde(default)]
    pub ai_probability: Option<f64>,
    #[serde(default)]
    pub result_text: String,
    #[serde(default)]
    pub model_version: String,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
    #[serde(default)]
    pub image_format: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl AiImageDetectionRecord {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(confidence) = self.confidence {
            check_unit("confidence", confidence)?;
        }
        if let Some(probability) = self.ai_probability {
            check_unit("ai_probability", probability)?;
        }
        match self.status {
            DetectionStatus::Completed if self.prediction.is_none() => Err(format!(
                "record {} is completed but has no prediction",
                self.id
            )),
            DetectionStatus::Failed if !has_text(Some(&self.error_message)) => Err(format!(
                "record {} failed without an error message",
                self.id
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Online,
    Offline,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub module_name: String,
    pub status: ModuleState,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub version: String,
}

/// Payload of `/modules/status/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<ModuleStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Fixed identifiers of the four detection backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKey {
    #[serde(rename = "ai_image_detection")]
    AiImageDetection,
    #[serde(rename = "rumor_detection")]
    RumorDetection,
    #[serde(rename = "video_analysis_module1")]
    VideoAnalysisModule1,
    #[serde(rename = "video_analysis_module2")]
    VideoAnalysisModule2,
}

impl ServiceKey {
    pub const ALL: [ServiceKey; 4] = [
        ServiceKey::AiImageDetection,
        ServiceKey::RumorDetection,
        ServiceKey::VideoAnalysisModule1,
        ServiceKey::VideoAnalysisModule2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKey::AiImageDetection => "ai_image_detection",
            ServiceKey::RumorDetection => "rumor_detection",
            ServiceKey::VideoAnalysisModule1 => "video_analysis_module1",
            ServiceKey::VideoAnalysisModule2 => "video_analysis_module2",
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown service key `{s}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: HealthState,
    pub url: String,
}

/// Per-service health, one named field per fixed key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Services {
    pub ai_image_detection: ServiceInfo,
    pub rumor_detection: ServiceInfo,
    pub video_analysis_module1: ServiceInfo,
    pub video_analysis_module2: ServiceInfo,
}

impl Services {
    pub fn get(&self, key: ServiceKey) -> &ServiceInfo {
        match key {
            ServiceKey::AiImageDetection => &self.ai_image_detection,
            ServiceKey::RumorDetection => &self.rumor_detection,
            ServiceKey::VideoAnalysisModule1 => &self.video_analysis_module1,
            ServiceKey::VideoAnalysisModule2 => &self.video_analysis_module2,
        }
    }

    pub fn get_mut(&mut self, key: ServiceKey) -> &mut ServiceInfo {
        match key {
            ServiceKey::AiImageDetection => &mut self.ai_image_detection,
            ServiceKey::RumorDetection => &mut self.rumor_detection,
            ServiceKey::VideoAnalysisModule1 => &mut self.video_analysis_module1,
            ServiceKey::VideoAnalysisModule2 => &mut self.video_analysis_module2,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceKey, &ServiceInfo)> + '_ {
        ServiceKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }
}

/// Composite health document covering every detection backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDetectionServiceStatus {
    pub services: Services,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_detections_24h: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

fn check_unit(field: &str, value: f64) -> Result<(), String> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{field} {value} is outside [0, 1]"))
    }
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|text| !text.trim().is_empty())
}
