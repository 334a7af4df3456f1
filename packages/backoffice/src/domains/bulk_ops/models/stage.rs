use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::directory::models::BusinessRecord;

// ============================================================================
// Stage configuration (typed - illegal configurations unrepresentable)
// ============================================================================

/// Fields a validation rule can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Phone,
    Email,
    Website,
    Suburb,
    Category,
}

impl RequiredField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Website => "website",
            Self::Suburb => "suburb",
            Self::Category => "category",
        }
    }
}

/// A single validation rule evaluated against one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    RequiredField { field: RequiredField },
    MinQualityScore { min: f64 },
    AbnPresent,
    NotMarkedDuplicate,
}

impl ValidationRule {
    /// Stable label used in failure reports.
    pub fn label(&self) -> String {
        match self {
            Self::RequiredField { field } => format!("required_field:{}", field.as_str()),
            Self::MinQualityScore { min } => format!("min_quality_score:{min}"),
            Self::AbnPresent => "abn_present".to_string(),
            Self::NotMarkedDuplicate => "not_marked_duplicate".to_string(),
        }
    }

    pub fn passes(&self, record: &BusinessRecord) -> bool {
        let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        match self {
            Self::RequiredField { field } => match field {
                RequiredField::Phone => has(&record.phone),
                RequiredField::Email => has(&record.email),
                RequiredField::Website => has(&record.website),
                RequiredField::Suburb => has(&record.suburb),
                RequiredField::Category => has(&record.category),
            },
            Self::MinQualityScore { min } => record.quality_score >= *min,
            Self::AbnPresent => has(&record.abn),
            Self::NotMarkedDuplicate => !record.is_marked_duplicate(),
        }
    }
}

/// Conditions gating auto-approval and conditional stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalConditions {
    pub quality_score_min: Option<f64>,
    #[serde(default)]
    pub abn_required: bool,
    #[serde(default)]
    pub ownership_verified: bool,
}

impl ApprovalConditions {
    /// The first unmet condition, as a skip message. None when all hold.
    pub fn first_unmet(&self, record: &BusinessRecord) -> Option<String> {
        if let Some(min) = self.quality_score_min {
            if record.quality_score < min {
                return Some(format!(
                    "quality score {:.1} below required {:.1}",
                    record.quality_score, min
                ));
            }
        }
        if self.abn_required && record.abn.as_deref().map_or(true, |a| a.trim().is_empty()) {
            return Some("abn required but missing".to_string());
        }
        if self.ownership_verified && !record.ownership_verified {
            return Some("ownership not verified".to_string());
        }
        None
    }
}

/// Typed per-stage configuration, keyed by stage type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageConfig {
    Validation {
        rules: Vec<ValidationRule>,
    },
    AutoApprove {
        conditions: ApprovalConditions,
    },
    ManualReview {},
    Conditional {
        conditions: ApprovalConditions,
    },
    Checkpoint {
        message: String,
        /// When set, the operation pauses cooperatively the first time a
        /// record reaches this stage; later records wait for RESUME.
        pause_for_review: bool,
    },
}

impl StageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::AutoApprove { .. } => "auto_approve",
            Self::ManualReview {} => "manual_review",
            Self::Conditional { .. } => "conditional",
            Self::Checkpoint { .. } => "checkpoint",
        }
    }
}

// ============================================================================
// Stage state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Running per-stage totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResults {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// One stage of an operation's workflow, owned exclusively by its operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: Uuid,
    pub name: String,
    pub config: StageConfig,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default)]
    pub results: StageResults,
}

impl WorkflowStage {
    pub fn new(name: &str, config: StageConfig) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.to_string(),
            config,
            status: StageStatus::default(),
            results: StageResults::default(),
        }
    }
}

/// Decision returned by an approval channel for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Declined { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_quality(quality: f64) -> BusinessRecord {
        BusinessRecord::builder()
            .name("Test Business")
            .quality_score(quality)
            .build()
    }

    #[test]
    fn test_required_field_rule() {
        let mut record = record_with_quality(50.0);
        let rule = ValidationRule::RequiredField {
            field: RequiredField::Phone,
        };
        assert!(!rule.passes(&record));

        record.phone = Some("0400000000".to_string());
        assert!(rule.passes(&record));

        record.phone = Some("   ".to_string());
        assert!(!rule.passes(&record));
    }

    #[test]
    fn test_conditions_report_first_unmet() {
        let conditions = ApprovalConditions {
            quality_score_min: Some(60.0),
            abn_required: true,
            ownership_verified: false,
        };
        let record = record_with_quality(40.0);
        let unmet = conditions.first_unmet(&record).unwrap();
        assert!(unmet.contains("quality score"));

        let record = record_with_quality(70.0);
        let unmet = conditions.first_unmet(&record).unwrap();
        assert!(unmet.contains("abn"));
    }

    #[test]
    fn test_conditions_all_met() {
        let conditions = ApprovalConditions {
            quality_score_min: Some(60.0),
            abn_required: false,
            ownership_verified: false,
        };
        assert_eq!(conditions.first_unmet(&record_with_quality(60.0)), None);
    }
}
