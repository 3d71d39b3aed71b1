use serde::{Deserialize, Serialize};

/// FHIR OperationOutcome resource for error reporting
/// See: https://www.hl7.org/fhir/operationoutcome.html
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// The subset of the issue-type value set this server reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    Login,
    NotSupported,
    NotFound,
    Exception,
    Timeout,
}

impl OperationOutcome {
    /// Create a new OperationOutcome with a single issue
    pub fn new(severity: IssueSeverity, code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OperationOutcomeIssue {
                severity,
                code,
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }

    /// Create an error OperationOutcome
    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, diagnostics)
    }

    /// Create a not found error
    pub fn not_found(resource_type: &str, id: &str) -> Self {
        Self::error(
            IssueType::NotFound,
            format!("Resource not found: {}/{}", resource_type, id),
        )
    }

    /// Resource type this server does not serve
    pub fn unsupported_type(resource_type: &str) -> Self {
        Self::error(
            IssueType::NotSupported,
            format!("Resource type '{}' is not supported", resource_type),
        )
    }

    /// Failure while executing one entry of a transaction
    pub fn exception(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Exception, diagnostics)
    }

    /// Upstream rejected the forwarded credentials
    pub fn unauthorized(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Login, diagnostics)
    }

    /// First diagnostics string, if any
    pub fn diagnostics(&self) -> Option<&str> {
        self.issue.first().and_then(|i| i.diagnostics.as_deref())
    }
}
