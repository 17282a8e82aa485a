//! # Analysis Payload Types
//!
//! Typed mirrors of the JSON exchanged with the upstream analysis service.
//!
//! ## Pass-through fidelity:
//! `AnalysisResult` flattens unrecognized fields into `extra`, so a successful
//! upstream body survives the decode/encode round trip unchanged even when the
//! upstream adds fields this relay doesn't know about.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Risk classification produced by the upstream analyzer.
///
/// Closed enum: anything outside these three values fails to decode at the
/// boundary instead of flowing through as a stringly-typed surprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "SAFE")]
    Safe,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "DANGER")]
    Danger,
}

/// Body of `POST /api/analyze-message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub message: String,
    pub user_id: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Body of `POST /api/preview-message`: the analyze request plus an optional
/// set of policy names to check against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
    #[serde(flatten)]
    pub message: MessageRequest,
    #[serde(default)]
    pub policies: Option<Vec<String>>,
}

/// Analysis result as produced by the upstream service.
///
/// The relay never mutates a successful result; the only value it ever
/// constructs itself is the fixed fallback from [`AnalysisResult::fallback`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub risk_level: RiskLevel,
    pub confidence: f64,
    #[serde(default)]
    pub detected_issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub flagged_content: Vec<String>,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub compliance_notes: String,
    #[serde(default)]
    pub detailed_analysis: serde_json::Value,
    /// Fields the upstream sends that this relay doesn't model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnalysisResult {
    /// The fixed payload substituted when the upstream analysis call fails.
    ///
    /// ## Policy:
    /// Deliberately low-confidence and SAFE so an upstream outage never blocks
    /// a user from sending a message. The substitution is logged and counted
    /// by the caller; the canned suggestion tells the user the backend was
    /// unreachable.
    pub fn fallback() -> Self {
        let mut extra = serde_json::Map::new();
        extra.insert("status".to_string(), json!("fallback"));

        Self {
            risk_level: RiskLevel::Safe,
            confidence: 0.5,
            detected_issues: Vec::new(),
            suggestions: vec!["バックエンドに接続できませんでした".to_string()],
            flagged_content: Vec::new(),
            processing_time_ms: 100,
            compliance_notes: String::new(),
            detailed_analysis: json!({"harassment": {}, "confidential": {}}),
            extra,
        }
    }

    /// Whether the analyzer flagged anything worth warning about.
    pub fn has_risk_indicators(&self) -> bool {
        self.risk_level != RiskLevel::Safe || !self.detected_issues.is_empty()
    }
}

/// Result of the upstream policy check, as returned by the policy agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCompliance {
    pub compliant: bool,
    #[serde(default)]
    pub violation_detected: bool,
    #[serde(default)]
    pub violation_type: String,
    #[serde(default)]
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_wire_format() {
        assert_eq!(serde_json::to_string(&RiskLevel::Safe).unwrap(), "\"SAFE\"");
        assert_eq!(
            serde_json::from_str::<RiskLevel>("\"DANGER\"").unwrap(),
            RiskLevel::Danger
        );
        // Closed enum: unknown values must not decode
        assert!(serde_json::from_str::<RiskLevel>("\"CRITICAL\"").is_err());
    }

    #[test]
    fn test_fallback_values() {
        let fallback = AnalysisResult::fallback();
        assert_eq!(fallback.risk_level, RiskLevel::Safe);
        assert_eq!(fallback.confidence, 0.5);
        assert_eq!(
            fallback.suggestions,
            vec!["バックエンドに接続できませんでした".to_string()]
        );
        assert_eq!(fallback.extra["status"], "fallback");
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let upstream_body = serde_json::json!({
            "risk_level": "WARNING",
            "confidence": 0.82,
            "detected_issues": ["harassment"],
            "suggestions": [],
            "flagged_content": [],
            "processing_time_ms": 412,
            "compliance_notes": "",
            "detailed_analysis": {},
            "sentiment": "negative",
            "emotion": "angry"
        });

        let result: AnalysisResult = serde_json::from_value(upstream_body.clone()).unwrap();
        assert_eq!(result.risk_level, RiskLevel::Warning);
        assert_eq!(result.extra["sentiment"], "negative");

        let round_tripped = serde_json::to_value(&result).unwrap();
        assert_eq!(round_tripped, upstream_body);
    }

    #[test]
    fn test_preview_request_flattens_message() {
        let body = r#"{"message": "hi", "user_id": "1", "policies": ["pii"]}"#;
        let req: PreviewRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.message.message, "hi");
        assert_eq!(req.message.user_id, "1");
        assert_eq!(req.policies, Some(vec!["pii".to_string()]));
    }
}
