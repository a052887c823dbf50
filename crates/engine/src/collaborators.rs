// External collaborator contracts.
//
// The AI assistant and the export pipeline are consumed through these
// narrow shapes; their internals (model calls, rendering) live outside
// the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Request to the AI editing assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// 1-based inclusive line range the request refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Assistant reply. `confidence` is clamped to [0, 1] by implementations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistReply {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_change: Option<String>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
}

#[async_trait]
pub trait AssistService: Send + Sync {
    async fn assist(&self, request: AssistRequest) -> Result<AssistReply, EngineError>;
}

/// Export target format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Pdf,
    Html,
    Docx,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExportOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRequest {
    pub filename: String,
    pub format: ExportFormat,
    #[serde(default)]
    pub options: ExportOptions,
}

/// Time-limited location of a rendered export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportLocation {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ExportService: Send + Sync {
    async fn export(&self, request: ExportRequest) -> Result<ExportLocation, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assist_request_omits_absent_fields() {
        let request = AssistRequest {
            message: "tighten this paragraph".into(),
            filename: None,
            line_range: None,
            action: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("filename").is_none());
        assert!(value.get("line_range").is_none());
    }

    #[test]
    fn export_format_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ExportFormat::Pdf).unwrap(), "\"pdf\"");
    }
}
