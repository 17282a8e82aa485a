//! # Preview Merge
//!
//! The preview relay fans out to two upstream calls — a policy check and a
//! message analysis — and merges whatever came back into one response.
//!
//! ## Concurrency model:
//! Plain parallel fan-out/join (`tokio::join!`). No cancellation, no partial
//! retry: a failed leg simply leaves its section absent from the merged
//! object.
//!
//! ## Precedence rules:
//! - policy violation present ⇒ overall DANGER
//! - else analysis shows risk indicators ⇒ overall WARNING
//! - else ⇒ SAFE

use crate::analysis::client::AnalysisClient;
use crate::analysis::types::{AnalysisResult, PolicyCompliance, PreviewRequest, RiskLevel};
use serde::Serialize;
use tracing::warn;

/// Merged preview/compliance response.
///
/// Sections are optional: a failed upstream leg is absent, not errored.
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_compliance: Option<PolicyCompliance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    pub timestamp: String,
}

/// Run the two upstream calls concurrently and merge the results.
///
/// Each leg's failure is absorbed here (logged, turned into `None`); the
/// caller is responsible for upstream-failure accounting.
pub async fn run_preview(client: &AnalysisClient, request: &PreviewRequest) -> PreviewResponse {
    let policies = request.policies.clone().unwrap_or_default();

    let (policy_result, analysis_result) = tokio::join!(
        client.check_policy(&request.message, &policies),
        client.analyze(&request.message),
    );

    let policy = match policy_result {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(error = %e, "Policy check leg failed, omitting from preview");
            None
        }
    };

    let analysis = match analysis_result {
        Ok(a) => Some(a),
        Err(e) => {
            warn!(error = %e, "Analysis leg failed, omitting from preview");
            None
        }
    };

    merge(policy, analysis)
}

/// Merge the two optional sections under the precedence rules.
pub fn merge(
    policy: Option<PolicyCompliance>,
    analysis: Option<AnalysisResult>,
) -> PreviewResponse {
    let violation = policy
        .as_ref()
        .map(|p| p.violation_detected || !p.compliant)
        .unwrap_or(false);

    let risk_indicators = analysis
        .as_ref()
        .map(|a| a.has_risk_indicators())
        .unwrap_or(false);

    let risk_level = if violation {
        RiskLevel::Danger
    } else if risk_indicators {
        RiskLevel::Warning
    } else {
        RiskLevel::Safe
    };

    PreviewResponse {
        risk_level,
        policy_compliance: policy,
        analysis,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compliant() -> PolicyCompliance {
        PolicyCompliance {
            compliant: true,
            violation_detected: false,
            violation_type: String::new(),
            reasoning: String::new(),
        }
    }

    fn violation() -> PolicyCompliance {
        PolicyCompliance {
            compliant: false,
            violation_detected: true,
            violation_type: "confidential".to_string(),
            reasoning: "sales data mentioned".to_string(),
        }
    }

    fn safe_analysis() -> AnalysisResult {
        AnalysisResult::fallback() // SAFE, no detected issues
    }

    fn risky_analysis() -> AnalysisResult {
        let mut result = AnalysisResult::fallback();
        result.risk_level = RiskLevel::Warning;
        result.detected_issues = vec!["harassment".to_string()];
        result
    }

    #[test]
    fn test_violation_wins_over_everything() {
        let merged = merge(Some(violation()), Some(risky_analysis()));
        assert_eq!(merged.risk_level, RiskLevel::Danger);

        // Violation dominates even when analysis looks clean
        let merged = merge(Some(violation()), Some(safe_analysis()));
        assert_eq!(merged.risk_level, RiskLevel::Danger);
    }

    #[test]
    fn test_risk_indicators_give_warning() {
        let merged = merge(Some(compliant()), Some(risky_analysis()));
        assert_eq!(merged.risk_level, RiskLevel::Warning);
    }

    #[test]
    fn test_clean_message_is_safe() {
        let merged = merge(Some(compliant()), Some(safe_analysis()));
        assert_eq!(merged.risk_level, RiskLevel::Safe);
    }

    #[test]
    fn test_failed_legs_are_absent_not_errors() {
        let merged = merge(None, Some(safe_analysis()));
        assert!(merged.policy_compliance.is_none());
        assert!(merged.analysis.is_some());
        assert_eq!(merged.risk_level, RiskLevel::Safe);

        // Both legs down still produces a response
        let merged = merge(None, None);
        assert!(merged.policy_compliance.is_none());
        assert!(merged.analysis.is_none());
        assert_eq!(merged.risk_level, RiskLevel::Safe);

        let json = serde_json::to_value(&merged).unwrap();
        assert!(json.get("policy_compliance").is_none());
        assert!(json.get("analysis").is_none());
    }
}
