use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Overall outcome of schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    /// Some checks could not run because the body was not comparable with its schema.
    Partial,
}

/// A single rule violation at a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// e.g. `query.limit`, `body.items[2].sku`.
    pub field_path: String,
    /// Rule that failed: `type`, `enum`, `minimum`, `pattern`, `parse`, ...
    pub rule: String,
    pub message: String,
}

/// Structured diagnostic report. Always produced, never an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    #[serde(default)]
    pub field_errors: Vec<FieldError>,
    #[serde(default)]
    pub missing_required: BTreeSet<String>,
}

impl ValidationReport {
    /// Build a report whose status is derived from its findings.
    ///
    /// `valid` iff both collections are empty; `partial` wins over `invalid`
    /// when the body could not be compared with its schema.
    pub fn from_findings(
        field_errors: Vec<FieldError>,
        missing_required: BTreeSet<String>,
        body_unparseable: bool,
    ) -> Self {
        let status = if body_unparseable {
            ValidationStatus::Partial
        } else if field_errors.is_empty() && missing_required.is_empty() {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        };
        Self {
            status,
            field_errors,
            missing_required,
        }
    }

    pub fn valid() -> Self {
        Self::from_findings(Vec::new(), BTreeSet::new(), false)
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }

    pub fn error_count(&self) -> usize {
        self.field_errors.len() + self.missing_required.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_findings_are_valid() {
        let report = ValidationReport::valid();
        assert!(report.is_valid());
        assert_eq!(report.error_count(), 0);
    }

    #[test]
    fn missing_required_makes_invalid() {
        let missing = BTreeSet::from(["headers.Authorization".to_string()]);
        let report = ValidationReport::from_findings(Vec::new(), missing, false);
        assert_eq!(report.status, ValidationStatus::Invalid);
    }

    #[test]
    fn unparseable_body_is_partial() {
        let errors = vec![FieldError {
            field_path: "body".into(),
            rule: "parse".into(),
            message: "body is not JSON".into(),
        }];
        let report = ValidationReport::from_findings(errors, BTreeSet::new(), true);
        assert_eq!(report.status, ValidationStatus::Partial);
        assert!(!report.is_valid());
    }

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&ValidationStatus::Partial).unwrap(),
            r#""partial""#
        );
    }
}
